use anyhow::Result;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use bytes::Bytes;
use engine::assets::{AssetCandidate, AssetKind};
use engine::render::RenderCommand;
use engine::scene::Scene;
use engine::timeline::secs_to_ticks;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use storyreel::api::{self, AppState};
use storyreel::config::{ProviderMode, Settings};
use storyreel::error::{PipelineError, ProviderError};
use storyreel::jobs::JobManager;
use storyreel::media::ffmpeg::{MediaInfo, MediaProbe, Renderer};
use storyreel::media::fonts::{FontError, TypefaceLocator};
use storyreel::orchestrator::{Collaborators, JobRequest, NoProgress, Orchestrator};
use storyreel::planner::ScenePlanner;
use storyreel::providers::{AssetProvider, AssetQuery, Payload, ProviderSet};
use storyreel::tts::NarrationSynthesizer;

struct BeachPlanner;

#[async_trait]
impl ScenePlanner for BeachPlanner {
    async fn plan(&self, _prompt: &str, _total: f64, _count: usize) -> Result<Vec<Scene>> {
        let mut shore = Scene::draft("Shore", "The tide rolls in over warm sand.", "a calm shore", 10.0);
        shore.music_keywords = Some("calm ocean ambient".into());
        let mut gulls = Scene::draft("Gulls", "Gulls circle above.", "gulls in flight", 10.0);
        gulls.sfx_keywords = Some("seagulls".into());
        let dusk = Scene::draft("Dusk", "The sun sinks low.", "beach at dusk", 10.0);
        Ok(vec![shore, gulls, dusk])
    }
}

struct StockImages;

#[async_trait]
impl AssetProvider for StockImages {
    fn name(&self) -> &str {
        "stock"
    }

    async fn candidates(
        &self,
        _kind: AssetKind,
        query: &AssetQuery,
    ) -> Result<Vec<AssetCandidate>, ProviderError> {
        Ok(vec![AssetCandidate::new("stock", query.search.clone()).with_size(1024, 768)])
    }

    async fn download(&self, _candidate: &AssetCandidate) -> Result<Payload, ProviderError> {
        let mut png = b"\x89PNG\r\n\x1a\n".to_vec();
        png.resize(4096, 0);
        Ok(Payload {
            bytes: Bytes::from(png),
            content_type: Some("image/png".into()),
        })
    }
}

struct Offline;

#[async_trait]
impl AssetProvider for Offline {
    fn name(&self) -> &str {
        "offline"
    }

    async fn candidates(
        &self,
        _kind: AssetKind,
        _query: &AssetQuery,
    ) -> Result<Vec<AssetCandidate>, ProviderError> {
        Err(ProviderError::Status {
            provider: "offline".into(),
            status: 503,
            body: "unavailable".into(),
        })
    }

    async fn download(&self, _candidate: &AssetCandidate) -> Result<Payload, ProviderError> {
        unreachable!("no candidates are ever offered")
    }
}

/// Music search that never answers within a test's lifetime.
struct HangingMusic;

#[async_trait]
impl AssetProvider for HangingMusic {
    fn name(&self) -> &str {
        "hanging"
    }

    async fn candidates(
        &self,
        _kind: AssetKind,
        _query: &AssetQuery,
    ) -> Result<Vec<AssetCandidate>, ProviderError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(Vec::new())
    }

    async fn download(&self, _candidate: &AssetCandidate) -> Result<Payload, ProviderError> {
        unreachable!("no candidates are ever offered")
    }
}

struct SilentNarrator;

#[async_trait]
impl NarrationSynthesizer for SilentNarrator {
    async fn synthesize(&self, _text: &str, _language: &str, dest: &Path) -> Result<()> {
        tokio::fs::write(dest, b"ID3\x04\x00\x00\x00\x00\x00\x00").await?;
        Ok(())
    }
}

/// Images are 1024x768; every audio file lasts four seconds.
struct ExtensionProbe;

#[async_trait]
impl MediaProbe for ExtensionProbe {
    async fn probe(&self, path: &Path) -> Result<MediaInfo> {
        let is_image = path.extension().is_some_and(|e| e == "png");
        Ok(MediaInfo {
            duration_ticks: if is_image { 0 } else { secs_to_ticks(4.0) },
            width: if is_image { 1024 } else { 0 },
            height: if is_image { 768 } else { 0 },
            has_audio: !is_image,
            has_video: is_image,
        })
    }
}

#[derive(Default)]
struct RecordingRenderer {
    commands: Mutex<Vec<RenderCommand>>,
}

#[async_trait]
impl Renderer for RecordingRenderer {
    async fn render(&self, command: &RenderCommand) -> Result<()> {
        self.commands.lock().unwrap().push(command.clone());
        tokio::fs::write(&command.output_path, b"\x00\x00\x00\x18ftypmp42").await?;
        Ok(())
    }
}

struct BrokenRenderer;

#[async_trait]
impl Renderer for BrokenRenderer {
    async fn render(&self, _command: &RenderCommand) -> Result<()> {
        anyhow::bail!("ffmpeg exited with status 1")
    }
}

struct StalledRenderer;

#[async_trait]
impl Renderer for StalledRenderer {
    async fn render(&self, _command: &RenderCommand) -> Result<()> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(())
    }
}

struct AnyFont;

impl TypefaceLocator for AnyFont {
    fn locate(&self, _typeface: &str) -> Result<PathBuf, FontError> {
        Ok(PathBuf::from("/fonts/DejaVuSans.ttf"))
    }
}

struct Harness {
    _root: tempfile::TempDir,
    settings: Arc<Settings>,
}

impl Harness {
    fn new(job_timeout: Duration) -> Self {
        let root = tempfile::tempdir().unwrap();
        let settings = Settings {
            scratch_dir: root.path().join("scratch"),
            output_dir: root.path().join("renders"),
            default_provider: ProviderMode::Mixed,
            job_timeout,
            ..Settings::default()
        };
        std::fs::create_dir_all(&settings.output_dir).unwrap();
        Harness {
            _root: root,
            settings: Arc::new(settings),
        }
    }

    fn orchestrator(&self, providers: ProviderSet, renderer: Arc<dyn Renderer>) -> Orchestrator {
        Orchestrator::new(
            self.settings.clone(),
            Collaborators {
                planner: Arc::new(BeachPlanner),
                providers,
                narrator: Arc::new(SilentNarrator),
                probe: Arc::new(ExtensionProbe),
                renderer,
                fonts: Arc::new(AnyFont),
            },
        )
    }

    fn scratch_entries(&self) -> usize {
        std::fs::read_dir(&self.settings.scratch_dir)
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}

fn stock_only_without_music() -> ProviderSet {
    ProviderSet {
        stock_image: Some(Arc::new(StockImages)),
        music: vec![Arc::new(Offline) as Arc<dyn AssetProvider>],
        ..ProviderSet::default()
    }
}

fn beach_request() -> JobRequest {
    JobRequest {
        prompt: "a day at the beach".into(),
        duration_secs: 30.0,
        scene_count: 3,
        aspect: None,
        provider: None,
    }
}

#[tokio::test]
async fn renders_without_music_when_every_music_provider_fails() {
    let harness = Harness::new(Duration::from_secs(60));
    let renderer = Arc::new(RecordingRenderer::default());
    let orchestrator = harness.orchestrator(stock_only_without_music(), renderer.clone());

    let outcome = orchestrator
        .run(beach_request(), CancellationToken::new(), &NoProgress)
        .await
        .unwrap();

    assert!(outcome.output_path.is_file());
    assert_eq!(
        outcome.output_path,
        harness.settings.output_dir.join(format!("{}.mp4", outcome.video_id))
    );
    assert_eq!(outcome.scene_count, 3);
    assert!(!outcome.has_music);
    assert!((outcome.duration_secs - 28.8).abs() < 1e-6);
    assert_eq!(harness.scratch_entries(), 0);

    let commands = renderer.commands.lock().unwrap();
    assert_eq!(commands.len(), 1);
    let video_pass = commands[0].video_pass.join(" ");
    assert!(video_pass.contains("xfade"));
    assert!(video_pass.contains("drawtext"));
    assert!(commands[0].narration_only_audio_pass.is_none());
}

#[tokio::test]
async fn render_failure_still_cleans_the_workspace() {
    let harness = Harness::new(Duration::from_secs(60));
    let orchestrator = harness.orchestrator(stock_only_without_music(), Arc::new(BrokenRenderer));

    let err = orchestrator
        .run(beach_request(), CancellationToken::new(), &NoProgress)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "render_error");
    assert_eq!(harness.scratch_entries(), 0);
    assert_eq!(std::fs::read_dir(&harness.settings.output_dir).unwrap().count(), 0);
}

#[tokio::test]
async fn unconfigured_mode_is_a_configuration_error() {
    let harness = Harness::new(Duration::from_secs(60));
    let orchestrator = harness.orchestrator(stock_only_without_music(), Arc::new(BrokenRenderer));

    let mut request = beach_request();
    request.provider = Some(ProviderMode::Generative);
    let err = orchestrator
        .run(request, CancellationToken::new(), &NoProgress)
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Configuration(_)));
    assert!(err.to_string().contains("GOOGLE_API_KEY"));
}

#[tokio::test]
async fn exhausted_visual_chain_fails_the_job() {
    let harness = Harness::new(Duration::from_secs(60));
    let providers = ProviderSet {
        stock_video: Some(Arc::new(Offline)),
        stock_image: Some(Arc::new(Offline)),
        ..ProviderSet::default()
    };
    let orchestrator = harness.orchestrator(providers, Arc::new(RecordingRenderer::default()));

    let mut request = beach_request();
    request.provider = Some(ProviderMode::Stock);
    let err = orchestrator
        .run(request, CancellationToken::new(), &NoProgress)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "provider_error");
    assert!(err.to_string().contains("visual"));
    assert_eq!(harness.scratch_entries(), 0);
}

#[tokio::test]
async fn failed_scene_does_not_wait_for_slow_music() {
    let harness = Harness::new(Duration::from_secs(60));
    let providers = ProviderSet {
        stock_image: Some(Arc::new(Offline)),
        music: vec![Arc::new(HangingMusic) as Arc<dyn AssetProvider>],
        ..ProviderSet::default()
    };
    let orchestrator = harness.orchestrator(providers, Arc::new(RecordingRenderer::default()));

    let mut request = beach_request();
    request.provider = Some(ProviderMode::Stock);
    let err = tokio::time::timeout(
        Duration::from_secs(5),
        orchestrator.run(request, CancellationToken::new(), &NoProgress),
    )
    .await
    .expect("job should fail without waiting for music")
    .unwrap_err();

    assert_eq!(err.kind(), "provider_error");
    assert!(err.to_string().contains("visual"));
    assert_eq!(harness.scratch_entries(), 0);
}

#[tokio::test]
async fn cancelled_job_reports_cancelled() {
    let harness = Harness::new(Duration::from_secs(60));
    let orchestrator = harness.orchestrator(stock_only_without_music(), Arc::new(StalledRenderer));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = orchestrator
        .run(beach_request(), cancel, &NoProgress)
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Cancelled));
    assert_eq!(harness.scratch_entries(), 0);
}

#[tokio::test]
async fn stalled_job_times_out() {
    let harness = Harness::new(Duration::from_millis(100));
    let orchestrator = harness.orchestrator(stock_only_without_music(), Arc::new(StalledRenderer));

    let err = orchestrator
        .run(beach_request(), CancellationToken::new(), &NoProgress)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "timed_out");
    assert_eq!(harness.scratch_entries(), 0);
}

fn app_state(harness: &Harness) -> AppState {
    AppState {
        orchestrator: Arc::new(
            harness.orchestrator(stock_only_without_music(), Arc::new(RecordingRenderer::default())),
        ),
        jobs: Arc::new(JobManager::new()),
        settings: harness.settings.clone(),
    }
}

#[tokio::test]
async fn health_and_missing_download() {
    let harness = Harness::new(Duration::from_secs(60));
    let app = api::app(app_state(&harness));

    let health = app
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(health.status(), StatusCode::OK);

    let missing = app
        .oneshot(
            Request::get(format!("/api/download/{}", uuid::Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn render_endpoint_returns_a_download_url() {
    let harness = Harness::new(Duration::from_secs(60));
    let app = api::app(app_state(&harness));

    let response = app
        .clone()
        .oneshot(
            Request::post("/api/render")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"prompt":"a day at the beach","duration":30,"scenes":3}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "success");
    let url = json["download_url"].as_str().unwrap().to_string();

    let download = app
        .oneshot(
            Request::get(url.as_str())
                .header("range", "bytes=0-3")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(download.status(), StatusCode::PARTIAL_CONTENT);
    let bytes = axum::body::to_bytes(download.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"\x00\x00\x00\x18");
}

#[tokio::test]
async fn invalid_render_request_is_rejected() {
    let harness = Harness::new(Duration::from_secs(60));
    let response = api::app(app_state(&harness))
        .oneshot(
            Request::post("/api/render")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"prompt":"beach","aspect":"square"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
