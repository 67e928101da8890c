use engine::assets::{AssetKind, TargetHint};
use engine::compiler::MusicInput;
use engine::render::{generate_render_commands, EncodeProfile};
use engine::scene::Scene;
use engine::subtitles::pace_subtitles;
use engine::timeline::{ticks_to_secs, Resolution, VisualKind, VisualSource};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{Aspect, ProviderMode, Settings};
use crate::error::{PipelineError, ProviderError};
use crate::media::ffmpeg::{MediaProbe, Renderer};
use crate::media::fonts::TypefaceLocator;
use crate::media::move_file;
use crate::planner::{plan_scenes, PromptBuilder, ScenePlanner, MAX_SEARCH_CHARS};
use crate::providers::{AssetQuery, ChainStep, ProviderSet};
use crate::resolver::resolve_slot;
use crate::tts::NarrationSynthesizer;

mod compose;
pub mod workspace;

use workspace::Workspace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    Planning,
    Resolving,
    Composing,
    Rendering,
    Finalizing,
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, phase: JobPhase, progress: f64);
}

pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _phase: JobPhase, _progress: f64) {}
}

#[derive(Debug, Clone)]
pub struct JobRequest {
    pub prompt: String,
    pub duration_secs: f64,
    pub scene_count: usize,
    pub aspect: Option<Aspect>,
    pub provider: Option<ProviderMode>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RenderOutcome {
    pub video_id: Uuid,
    pub output_path: PathBuf,
    pub scene_count: usize,
    pub duration_secs: f64,
    pub has_music: bool,
}

/// Long-lived collaborators shared by every job.
#[derive(Clone)]
pub struct Collaborators {
    pub planner: Arc<dyn ScenePlanner>,
    pub providers: ProviderSet,
    pub narrator: Arc<dyn NarrationSynthesizer>,
    pub probe: Arc<dyn MediaProbe>,
    pub renderer: Arc<dyn Renderer>,
    pub fonts: Arc<dyn TypefaceLocator>,
}

/// A scene whose mandatory assets are on disk and measured.
pub(crate) struct PreparedScene {
    pub index: usize,
    pub scene: Scene,
    pub visual: VisualSource,
    pub narration_ticks: i64,
}

struct JobContext<'a> {
    request: &'a JobRequest,
    workspace: &'a Workspace,
    aspect: Aspect,
    frame: Resolution,
}

pub struct Orchestrator {
    settings: Arc<Settings>,
    prompts: PromptBuilder,
    collaborators: Collaborators,
}

impl Orchestrator {
    pub fn new(settings: Arc<Settings>, collaborators: Collaborators) -> Self {
        Orchestrator {
            prompts: PromptBuilder::new(settings.image_style.clone()),
            settings,
            collaborators,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Runs one job to completion, cancellation, or timeout. The workspace
    /// is released on every path; dropping the job future aborts in-flight
    /// fetches and kills any running encoder.
    pub async fn run(
        &self,
        request: JobRequest,
        cancel: CancellationToken,
        progress: &dyn ProgressReporter,
    ) -> Result<RenderOutcome, PipelineError> {
        let workspace = Workspace::create(&self.settings.scratch_dir).await?;
        let limit = self.settings.job_timeout;

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(PipelineError::Cancelled),
            outcome = tokio::time::timeout(limit, self.execute(&request, &workspace, progress)) => {
                outcome.unwrap_or(Err(PipelineError::TimedOut(limit)))
            }
        };

        workspace.release().await;
        if let Err(e) = &result {
            warn!(kind = e.kind(), error = %e, "job failed");
        }
        result
    }

    async fn execute(
        &self,
        request: &JobRequest,
        workspace: &Workspace,
        progress: &dyn ProgressReporter,
    ) -> Result<RenderOutcome, PipelineError> {
        let aspect = request.aspect.unwrap_or(self.settings.default_aspect);
        let mode = request.provider.unwrap_or(self.settings.default_provider);
        let visual_chain = self.collaborators.providers.visual_chain(mode)?;
        let job = JobContext {
            request,
            workspace,
            aspect,
            frame: self.settings.frame_size(aspect),
        };
        info!(%aspect, %mode, prompt = %request.prompt, "starting job");

        progress.report(JobPhase::Planning, 0.05);
        let scenes = plan_scenes(
            self.collaborators.planner.as_ref(),
            &request.prompt,
            request.duration_secs,
            request.scene_count,
        )
        .await?;

        progress.report(JobPhase::Resolving, 0.2);
        let music_keywords = scenes.iter().find_map(|s| s.music_keywords.clone());
        let planned_secs: f64 = scenes.iter().map(|s| s.duration_secs).sum();
        let scene_tasks = scenes
            .into_iter()
            .enumerate()
            .map(|(index, scene)| self.prepare_scene(&job, &visual_chain, index, scene));
        // A failed scene drops the music lookup instead of waiting on it.
        let (music, prepared) = tokio::try_join!(
            async {
                let music = self.resolve_music(&job, music_keywords, planned_secs).await;
                Ok::<_, PipelineError>(music)
            },
            try_join_all(scene_tasks)
        )?;
        let scene_count = prepared.len();

        progress.report(JobPhase::Composing, 0.7);
        let timeline = compose::build_timeline(
            prepared,
            music,
            &self.settings,
            aspect,
            self.collaborators.fonts.as_ref(),
        )
        .await?;
        let has_music = timeline.music.is_some();
        let duration_secs = ticks_to_secs(timeline.duration_ticks());

        progress.report(JobPhase::Rendering, 0.8);
        let video_id = Uuid::new_v4();
        let staged = workspace.file(&format!("{video_id}.mp4"));
        let command = generate_render_commands(&timeline, staged.clone(), &EncodeProfile::default())?;
        self.collaborators
            .renderer
            .render(&command)
            .await
            .map_err(|e| PipelineError::Render(format!("{e:#}")))?;
        if !tokio::fs::try_exists(&staged).await.unwrap_or(false) {
            return Err(PipelineError::Render("encoder produced no output file".to_string()));
        }

        progress.report(JobPhase::Finalizing, 0.95);
        let output_path = self.settings.output_dir.join(format!("{video_id}.mp4"));
        move_file(&staged, &output_path).await?;
        info!(%video_id, duration_secs, scenes = scene_count, has_music, "job finished");

        Ok(RenderOutcome {
            video_id,
            output_path,
            scene_count,
            duration_secs,
            has_music,
        })
    }

    async fn prepare_scene(
        &self,
        job: &JobContext<'_>,
        visual_chain: &[ChainStep],
        index: usize,
        mut scene: Scene,
    ) -> Result<PreparedScene, PipelineError> {
        let query = AssetQuery {
            search: self.prompts.search_term(&scene, &job.request.prompt),
            prompt: self.prompts.build(&scene),
            aspect: job.aspect,
            target: TargetHint {
                frame: job.frame,
                duration_secs: Some(scene.duration_secs),
            },
        };

        let slot = format!("scene {index} visual");
        let visual = resolve_slot(&slot, visual_chain, &query, &job.workspace.scene_stem(index, "")).await?;
        let size = self
            .collaborators
            .probe
            .probe(&visual.path)
            .await
            .map_err(|e| ProviderError::malformed(&visual.candidate.source, format!("unreadable {}: {e:#}", visual.kind)))?
            .size()
            .ok_or_else(|| ProviderError::malformed(&visual.candidate.source, format!("{} has no frame size", visual.kind)))?;
        let kind = match visual.kind {
            AssetKind::Video => {
                scene.assets.video = Some(visual.path.clone());
                VisualKind::Video
            }
            _ => {
                scene.assets.image = Some(visual.path.clone());
                VisualKind::Image
            }
        };

        let narration_path = job.workspace.scene_stem(index, "narration").with_extension("mp3");
        self.collaborators
            .narrator
            .synthesize(&scene.narration, &self.settings.tts_lang, &narration_path)
            .await
            .map_err(|e| PipelineError::Narration(format!("scene {index}: {e:#}")))?;
        let narration_ticks = self
            .collaborators
            .probe
            .probe(&narration_path)
            .await
            .map_err(|e| PipelineError::Narration(format!("scene {index}: {e:#}")))?
            .duration_ticks;
        if narration_ticks <= 0 {
            return Err(PipelineError::Narration(format!(
                "scene {index}: narration audio has no duration"
            )));
        }
        scene.assets.narration_audio = Some(narration_path);
        scene.narration_secs = Some(ticks_to_secs(narration_ticks));

        if let Some(keywords) = scene.sfx_keywords.clone() {
            scene.assets.sound_effect = self.resolve_sound_effect(job, index, &keywords).await;
        }

        if scene.subtitle.is_none() {
            scene.subtitle = Some(scene.narration.clone());
        }
        if self.settings.subtitles_enabled {
            scene.subtitles = pace_subtitles(scene.subtitle_text(), narration_ticks);
        }
        debug!(
            scene = index,
            kind = %visual.kind,
            narration_secs = ticks_to_secs(narration_ticks),
            segments = scene.subtitles.len(),
            "scene prepared"
        );

        Ok(PreparedScene {
            index,
            scene,
            visual: VisualSource {
                kind,
                path: visual.path,
                size,
            },
            narration_ticks,
        })
    }

    async fn resolve_sound_effect(
        &self,
        job: &JobContext<'_>,
        index: usize,
        keywords: &str,
    ) -> Option<PathBuf> {
        let chain = self.collaborators.providers.sound_effect_chain();
        if chain.is_empty() {
            debug!(scene = index, "no sound effect provider configured");
            return None;
        }
        let query = keyword_query(keywords, job, None);
        let slot = format!("scene {index} sound effect");
        match resolve_slot(&slot, &chain, &query, &job.workspace.scene_stem(index, "sfx")).await {
            Ok(asset) => Some(asset.path),
            Err(e) => {
                warn!(scene = index, error = %e, "continuing without sound effect");
                None
            }
        }
    }

    async fn resolve_music(
        &self,
        job: &JobContext<'_>,
        keywords: Option<String>,
        planned_secs: f64,
    ) -> Option<MusicInput> {
        let Some(keywords) = keywords else {
            info!("no music keywords planned, skipping background music");
            return None;
        };
        let chain = self.collaborators.providers.music_chain();
        if chain.is_empty() {
            info!("no music provider configured, skipping background music");
            return None;
        }

        let query = keyword_query(&keywords, job, Some(planned_secs));
        let asset = match resolve_slot("background music", &chain, &query, &job.workspace.file("background_music")).await {
            Ok(asset) => asset,
            Err(e) => {
                warn!(error = %e, "continuing without background music");
                return None;
            }
        };

        match self.collaborators.probe.probe(&asset.path).await {
            Ok(info) if info.duration_ticks > 0 => Some(MusicInput {
                path: asset.path,
                source_ticks: info.duration_ticks,
            }),
            Ok(_) => {
                warn!("background music has no duration, skipping");
                None
            }
            Err(e) => {
                warn!(error = %format!("{e:#}"), "could not probe background music, skipping");
                None
            }
        }
    }
}

fn keyword_query(keywords: &str, job: &JobContext<'_>, duration_secs: Option<f64>) -> AssetQuery {
    let search: String = keywords.trim().chars().take(MAX_SEARCH_CHARS).collect();
    AssetQuery {
        prompt: search.clone(),
        search,
        aspect: job.aspect,
        target: TargetHint {
            frame: job.frame,
            duration_secs,
        },
    }
}
