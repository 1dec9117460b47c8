//! Per-attempt failure taxonomy for the completion chain.

use std::time::Duration;

use thiserror::Error;

/// Error codes some OpenAI-compatible gateways return with a 400 instead of a 404 when a
/// model is unknown or retired.
const UNAVAILABLE_CODES: [&str; 3] = ["model_not_found", "model_decommissioned", "model_not_available"];

/// What the chain does after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptDisposition {
    /// Configuration mismatch for this model only: move on without recording anything.
    Skip,
    /// Remember the error as the latest failure and move on.
    RecordAndAdvance,
    /// Stop the chain for this request.
    Abort,
}

#[derive(Debug, Clone, Error)]
pub enum AttemptError {
    #[error("model {model} not available: {message}")]
    ModelUnavailable { model: String, message: String },
    #[error("429 - {message}")]
    RateLimited {
        message: String,
        retry_after: Option<u64>,
    },
    #[error("{status} - {message}")]
    Http { status: u16, message: String },
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("empty completion text")]
    EmptyCompletion,
    #[error("network error: {0}")]
    Transport(String),
    #[error("attempt timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("request cancelled")]
    Cancelled,
}

impl AttemptError {
    /// Classifies a non-success HTTP response.
    pub fn from_status(model: &str, status: u16, code: Option<&str>, message: String) -> Self {
        let unavailable_code = code
            .map(|c| UNAVAILABLE_CODES.contains(&c))
            .unwrap_or(false);
        if status == 404 || unavailable_code {
            return Self::ModelUnavailable {
                model: model.to_string(),
                message,
            };
        }
        if status == 429 {
            return Self::RateLimited {
                message,
                retry_after: None,
            };
        }
        Self::Http { status, message }
    }

    /// Seconds the provider asked us to wait, when it said so.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    pub fn disposition(&self) -> AttemptDisposition {
        match self {
            Self::ModelUnavailable { .. } => AttemptDisposition::Skip,
            Self::Cancelled => AttemptDisposition::Abort,
            Self::RateLimited { .. }
            | Self::Http { .. }
            | Self::Malformed(_)
            | Self::EmptyCompletion
            | Self::Transport(_)
            | Self::Timeout(_) => AttemptDisposition::RecordAndAdvance,
        }
    }
}

impl From<reqwest::Error> for AttemptError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return Self::Malformed(err.to_string());
        }
        Self::Transport(err.without_url().to_string())
    }
}
