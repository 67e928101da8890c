use engine::assets::{AssetKind, ValidationError};
use engine::compiler::CompileError;
use engine::normalize::NormalizeError;
use std::time::Duration;
use thiserror::Error;

/// Failure of a single provider call or candidate.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider} request failed: {source}")]
    Request {
        provider: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{provider} returned HTTP {status}: {body}")]
    Status {
        provider: String,
        status: u16,
        body: String,
    },
    #[error("{provider} found nothing for `{query}`")]
    NoResults { provider: String, query: String },
    #[error("{provider} response malformed: {reason}")]
    Malformed { provider: String, reason: String },
    #[error("{provider} does not supply {kind}")]
    Unsupported { provider: String, kind: AssetKind },
    #[error("payload rejected: {0}")]
    Validation(#[from] ValidationError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Every candidate of every provider in a chain failed.
    #[error("{slot} unavailable after {attempts} attempts: {summary}")]
    Exhausted {
        slot: String,
        attempts: usize,
        summary: String,
    },
}

impl ProviderError {
    pub fn request(provider: &str, source: reqwest::Error) -> Self {
        ProviderError::Request {
            provider: provider.to_string(),
            source,
        }
    }

    pub fn malformed(provider: &str, reason: impl Into<String>) -> Self {
        ProviderError::Malformed {
            provider: provider.to_string(),
            reason: reason.into(),
        }
    }
}

/// Job-level failure. Every variant is fatal to the job.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("planning failed: {0}")]
    Planning(String),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("asset rejected: {0}")]
    Validation(#[from] ValidationError),
    #[error("narration failed: {0}")]
    Narration(String),
    #[error("render failed: {0}")]
    Render(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("job cancelled")]
    Cancelled,
    #[error("job timed out after {}s", .0.as_secs())]
    TimedOut(Duration),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Stable code for structured error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Planning(_) => "planning_error",
            PipelineError::Provider(_) => "provider_error",
            PipelineError::Validation(_) => "validation_error",
            PipelineError::Narration(_) => "narration_error",
            PipelineError::Render(_) => "render_error",
            PipelineError::Configuration(_) => "configuration_error",
            PipelineError::Cancelled => "cancelled",
            PipelineError::TimedOut(_) => "timed_out",
            PipelineError::Io(_) => "io_error",
        }
    }
}

impl From<NormalizeError> for PipelineError {
    fn from(err: NormalizeError) -> Self {
        PipelineError::Planning(err.to_string())
    }
}

impl From<CompileError> for PipelineError {
    fn from(err: CompileError) -> Self {
        PipelineError::Render(err.to_string())
    }
}
