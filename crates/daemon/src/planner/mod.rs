use anyhow::Result;
use async_trait::async_trait;
use engine::normalize::{normalize_durations, MIN_SCENE_SECS};
use engine::scene::Scene;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use crate::error::PipelineError;
use crate::llm::GeminiClient;

/// Longest stock search term sent to a provider.
pub const MAX_SEARCH_CHARS: usize = 100;

/// Turns a topic into draft scenes with raw duration estimates.
#[async_trait]
pub trait ScenePlanner: Send + Sync {
    async fn plan(
        &self,
        prompt: &str,
        total_duration_secs: f64,
        scene_count: usize,
    ) -> Result<Vec<Scene>>;
}

/// Plans scenes and normalizes their durations to the requested total.
pub async fn plan_scenes(
    planner: &dyn ScenePlanner,
    prompt: &str,
    total_duration_secs: f64,
    scene_count: usize,
) -> Result<Vec<Scene>, PipelineError> {
    let drafts = planner
        .plan(prompt, total_duration_secs, scene_count)
        .await
        .map_err(|e| PipelineError::Planning(format!("{e:#}")))?;
    let planned = drafts.len();
    let scenes = normalize_durations(drafts, total_duration_secs, scene_count)?;
    info!(
        planned,
        kept = scenes.len(),
        total_secs = scenes.iter().map(|s| s.duration_secs).sum::<f64>(),
        "planned scenes"
    );
    Ok(scenes)
}

#[derive(Debug, Deserialize)]
struct PlanResponse {
    #[serde(default)]
    scenes: Vec<PlannedScene>,
}

#[derive(Debug, Deserialize)]
struct PlannedScene {
    title: String,
    narration: String,
    visual_prompt: String,
    #[serde(default)]
    search_query: Option<String>,
    #[serde(default)]
    music_keywords: Option<String>,
    #[serde(default)]
    sfx_keywords: Option<String>,
    #[serde(default)]
    duration_sec: Option<f64>,
}

impl PlannedScene {
    fn into_scene(self) -> Scene {
        let raw = self.duration_sec.unwrap_or(MIN_SCENE_SECS);
        let mut scene = Scene::draft(
            self.title,
            self.narration,
            self.visual_prompt,
            raw.max(MIN_SCENE_SECS),
        );
        scene.search_query = non_empty(self.search_query);
        scene.music_keywords = non_empty(self.music_keywords);
        scene.sfx_keywords = non_empty(self.sfx_keywords);
        scene
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

pub struct GeminiScenePlanner {
    gemini: Arc<GeminiClient>,
    model: String,
}

impl GeminiScenePlanner {
    pub fn new(gemini: Arc<GeminiClient>, model: String) -> Self {
        Self { gemini, model }
    }

    fn instruction(prompt: &str, total_duration_secs: f64, scene_count: usize) -> String {
        format!(
            "You are a film director. Break the topic into short scenes. \
             Return JSON with a 'scenes' array only. Each scene needs: \
             title, narration (2-3 sentences), visual_prompt, a short stock-footage \
             search_query, music_keywords describing the background mood, \
             sfx_keywords for one ambient sound, and duration_sec \
             (so total is close to {total_duration_secs} seconds).\n\n\
             Topic: {prompt}\nTarget scenes: {scene_count}"
        )
    }

    fn schema() -> serde_json::Value {
        json!({
            "type": "OBJECT",
            "properties": {
                "scenes": {
                    "type": "ARRAY",
                    "items": {
                        "type": "OBJECT",
                        "properties": {
                            "title": { "type": "STRING" },
                            "narration": { "type": "STRING" },
                            "visual_prompt": { "type": "STRING" },
                            "search_query": { "type": "STRING" },
                            "music_keywords": { "type": "STRING" },
                            "sfx_keywords": { "type": "STRING" },
                            "duration_sec": { "type": "NUMBER" }
                        },
                        "required": ["title", "narration", "visual_prompt", "duration_sec"]
                    }
                }
            },
            "required": ["scenes"]
        })
    }
}

#[async_trait]
impl ScenePlanner for GeminiScenePlanner {
    async fn plan(
        &self,
        prompt: &str,
        total_duration_secs: f64,
        scene_count: usize,
    ) -> Result<Vec<Scene>> {
        let body = self
            .gemini
            .generate_json(
                &self.model,
                &Self::instruction(prompt, total_duration_secs, scene_count),
                Self::schema(),
            )
            .await?;
        let response: PlanResponse = serde_json::from_value(body)?;
        if response.scenes.is_empty() {
            anyhow::bail!("LLM returned no scenes");
        }
        Ok(response
            .scenes
            .into_iter()
            .map(PlannedScene::into_scene)
            .collect())
    }
}

/// Derives provider queries from a scene.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    style: String,
}

impl PromptBuilder {
    pub fn new(style: impl Into<String>) -> Self {
        Self { style: style.into() }
    }

    /// Prompt for generative image providers.
    pub fn build(&self, scene: &Scene) -> String {
        format!(
            "{}. Shot composition: cinematic, gentle camera movement. Style: {}.",
            scene.visual_prompt.trim_end_matches('.'),
            self.style
        )
    }

    /// Search text for stock providers: the scene's search query, else its
    /// visual prompt, else the job prompt.
    pub fn search_term(&self, scene: &Scene, job_prompt: &str) -> String {
        let source = [
            scene.search_query.as_deref(),
            Some(scene.visual_prompt.as_str()),
            Some(job_prompt),
        ]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .unwrap_or_default();
        source.chars().take(MAX_SEARCH_CHARS).collect()
    }
}
