use anyhow::Context;
use std::{net::SocketAddr, sync::Arc};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use storyreel::api::{self, AppState};
use storyreel::config::Settings;
use storyreel::jobs::JobManager;
use storyreel::llm::GeminiClient;
use storyreel::media::ffmpeg::{FfmpegRenderer, FfprobeProbe};
use storyreel::media::fonts::FontDirectoryLocator;
use storyreel::orchestrator::{Collaborators, Orchestrator};
use storyreel::planner::GeminiScenePlanner;
use storyreel::providers::ProviderSet;
use storyreel::tts::GoogleTranslateTts;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = Arc::new(Settings::from_env());
    let api_key = settings
        .google_api_key
        .clone()
        .context("GOOGLE_API_KEY must be set for scene planning")?;

    let client = reqwest::Client::builder()
        .user_agent(concat!("storyreel/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("building http client")?;

    let gemini = Arc::new(GeminiClient::new(api_key, client.clone()));
    let fonts = FontDirectoryLocator::scan_in_background(settings.font_dirs.clone()).await;
    if fonts.is_empty() {
        tracing::warn!("no font files found, subtitles will be dropped");
    }

    let collaborators = Collaborators {
        planner: Arc::new(GeminiScenePlanner::new(
            gemini,
            settings.gemini_text_model.clone(),
        )),
        providers: ProviderSet::from_settings(&settings, client.clone()),
        narrator: Arc::new(GoogleTranslateTts::new(client)),
        probe: Arc::new(FfprobeProbe),
        renderer: Arc::new(FfmpegRenderer),
        fonts: Arc::new(fonts),
    };

    std::fs::create_dir_all(&settings.output_dir)
        .with_context(|| format!("creating {}", settings.output_dir.display()))?;
    info!(
        output_dir = %settings.output_dir.display(),
        provider = %settings.default_provider,
        aspect = %settings.default_aspect,
        "configuration loaded"
    );

    let state = AppState {
        orchestrator: Arc::new(Orchestrator::new(settings.clone(), collaborators)),
        jobs: Arc::new(JobManager::with_retention(settings.job_retention)),
        settings: settings.clone(),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let app = api::app(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(cors),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    info!("Starting render server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
