use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use super::{download_url, ApiError, AppState, RenderRequest};
use crate::jobs::{Job, JobStatus};

#[derive(Serialize)]
pub struct JobCreated {
    job_id: Uuid,
    status: JobStatus,
}

#[derive(Serialize)]
pub struct JobResponse {
    #[serde(flatten)]
    job: Job,
    download_url: Option<String>,
}

#[derive(Serialize)]
pub struct CancelResponse {
    job_id: Uuid,
    cancelled: bool,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", post(create_job))
        .route("/:id", get(get_job))
        .route("/:id/cancel", post(cancel_job))
        .with_state(state)
}

async fn create_job(
    State(state): State<AppState>,
    Json(req): Json<RenderRequest>,
) -> Result<(StatusCode, Json<JobCreated>), ApiError> {
    let request = req.into_job()?;
    let (job_id, cancel) = state.jobs.create_job(&request.prompt);

    let AppState {
        orchestrator, jobs, ..
    } = state;
    tokio::spawn(
        async move {
            jobs.mark_running(job_id);
            let tracker = jobs.tracker(job_id);
            match orchestrator.run(request, cancel, &tracker).await {
                Ok(outcome) => jobs.complete(job_id, &outcome),
                Err(e) => jobs.fail(job_id, &e),
            }
        }
        .instrument(info_span!("job", %job_id)),
    );
    info!(%job_id, "queued render job");

    Ok((
        StatusCode::ACCEPTED,
        Json(JobCreated {
            job_id,
            status: JobStatus::Pending,
        }),
    ))
}

async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobResponse>, ApiError> {
    let job = state
        .jobs
        .get_job(id)
        .ok_or_else(|| ApiError::not_found(format!("no job {id}")))?;
    let download_url = job.video_id.map(download_url);
    Ok(Json(JobResponse { job, download_url }))
}

async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CancelResponse>, ApiError> {
    if state.jobs.get_job(id).is_none() {
        return Err(ApiError::not_found(format!("no job {id}")));
    }
    let cancelled = state.jobs.cancel_job(id);
    Ok(Json(CancelResponse {
        job_id: id,
        cancelled,
    }))
}
