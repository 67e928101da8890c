use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use crate::config::{Aspect, ProviderMode, Settings};
use crate::error::PipelineError;
use crate::jobs::JobManager;
use crate::orchestrator::{JobRequest, Orchestrator};

pub mod download;
pub mod jobs;
pub mod render;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub jobs: Arc<JobManager>,
    pub settings: Arc<Settings>,
}

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api", router(state))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(render::router(state.clone()))
        .merge(download::router(state.clone()))
        .nest("/jobs", jobs::router(state))
}

/// Body shared by the synchronous and background render endpoints.
#[derive(Debug, Deserialize)]
pub struct RenderRequest {
    pub prompt: String,
    #[serde(default = "default_duration")]
    pub duration: f64,
    #[serde(default = "default_scenes")]
    pub scenes: usize,
    pub aspect: Option<String>,
    pub provider: Option<String>,
}

fn default_duration() -> f64 {
    60.0
}

fn default_scenes() -> usize {
    5
}

impl RenderRequest {
    pub fn into_job(self) -> Result<JobRequest, ApiError> {
        let prompt = self.prompt.trim().to_string();
        if prompt.is_empty() {
            return Err(ApiError::invalid("prompt must not be empty"));
        }
        if !self.duration.is_finite() || self.duration <= 0.0 {
            return Err(ApiError::invalid("duration must be a positive number of seconds"));
        }
        if self.scenes == 0 {
            return Err(ApiError::invalid("scenes must be at least 1"));
        }
        let aspect = self
            .aspect
            .as_deref()
            .map(str::parse::<Aspect>)
            .transpose()
            .map_err(ApiError::invalid)?;
        let provider = self
            .provider
            .as_deref()
            .map(str::parse::<ProviderMode>)
            .transpose()
            .map_err(ApiError::invalid)?;

        Ok(JobRequest {
            prompt,
            duration_secs: self.duration,
            scene_count: self.scenes,
            aspect,
            provider,
        })
    }
}

pub fn download_url(video_id: uuid::Uuid) -> String {
    format!("/api/download/{video_id}")
}

/// Error response with a stable `kind` code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
}

impl ApiError {
    pub fn invalid(message: impl Into<String>) -> Self {
        ApiError {
            status: StatusCode::BAD_REQUEST,
            kind: "invalid_request",
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError {
            status: StatusCode::NOT_FOUND,
            kind: "not_found",
            message: message.into(),
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        let status = match &err {
            PipelineError::Planning(_)
            | PipelineError::Provider(_)
            | PipelineError::Validation(_)
            | PipelineError::Narration(_) => StatusCode::BAD_GATEWAY,
            PipelineError::Render(_) | PipelineError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            PipelineError::Configuration(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PipelineError::Cancelled => StatusCode::CONFLICT,
            PipelineError::TimedOut(_) => StatusCode::GATEWAY_TIMEOUT,
        };
        ApiError {
            status,
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({ "error": { "kind": self.kind, "message": self.message } });
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(json: serde_json::Value) -> RenderRequest {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn defaults_fill_missing_fields() {
        let job = request(json!({ "prompt": " a beach at dawn " })).into_job().unwrap();
        assert_eq!(job.prompt, "a beach at dawn");
        assert_eq!(job.duration_secs, 60.0);
        assert_eq!(job.scene_count, 5);
        assert!(job.aspect.is_none());
    }

    #[test]
    fn rejects_bad_input() {
        assert!(request(json!({ "prompt": "  " })).into_job().is_err());
        assert!(request(json!({ "prompt": "x", "duration": 0 })).into_job().is_err());
        assert!(request(json!({ "prompt": "x", "scenes": 0 })).into_job().is_err());
        let err = request(json!({ "prompt": "x", "aspect": "square" }))
            .into_job()
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn pipeline_errors_map_to_statuses() {
        let cases = [
            (PipelineError::Configuration("no key".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (PipelineError::Cancelled, StatusCode::CONFLICT),
            (
                PipelineError::TimedOut(std::time::Duration::from_secs(5)),
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (PipelineError::Render("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (PipelineError::Narration("x".into()), StatusCode::BAD_GATEWAY),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status, status);
        }
    }
}
