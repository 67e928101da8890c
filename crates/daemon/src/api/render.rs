use axum::{extract::State, response::Json, routing::post, Router};
use serde::Serialize;
use tracing::{info_span, Instrument};
use uuid::Uuid;

use super::{download_url, ApiError, AppState, RenderRequest};

#[derive(Serialize)]
pub struct RenderResponse {
    status: &'static str,
    job_id: Uuid,
    video_id: Uuid,
    download_url: String,
    duration_secs: f64,
    scenes: usize,
    has_music: bool,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/render", post(render))
        .with_state(state)
}

/// Renders within the request. The job is still registered, so it can be
/// watched and cancelled through `/jobs/:id`; a client disconnect drops it.
async fn render(
    State(state): State<AppState>,
    Json(req): Json<RenderRequest>,
) -> Result<Json<RenderResponse>, ApiError> {
    let request = req.into_job()?;
    let (job_id, cancel) = state.jobs.create_job(&request.prompt);
    state.jobs.mark_running(job_id);
    let tracker = state.jobs.tracker(job_id);

    let result = state
        .orchestrator
        .run(request, cancel, &tracker)
        .instrument(info_span!("job", %job_id))
        .await;
    let outcome = match result {
        Ok(outcome) => {
            state.jobs.complete(job_id, &outcome);
            outcome
        }
        Err(e) => {
            state.jobs.fail(job_id, &e);
            return Err(e.into());
        }
    };

    Ok(Json(RenderResponse {
        status: "success",
        job_id,
        video_id: outcome.video_id,
        download_url: download_url(outcome.video_id),
        duration_secs: outcome.duration_secs,
        scenes: outcome.scene_count,
        has_music: outcome.has_music,
    }))
}
