use std::time::Duration;

use decor_llm::ConfigError;
use thiserror::Error;

/// Failures on the retrieval path. They are logged and degraded to an empty passage list;
/// the conversation never sees them.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("embedding failed: {0}")]
    Embedding(String),
    #[error("vector store query failed: {0}")]
    Store(String),
    #[error("retrieval task failed: {0}")]
    Join(String),
    #[error("retrieval timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
    #[error("retrieval cancelled")]
    Cancelled,
}

impl From<tokio::task::JoinError> for RetrievalError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Join(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("Konfigurasi asisten belum lengkap: {0}")]
    Configuration(#[from] ConfigError),
    #[error("Permintaan tidak valid: {0}")]
    InvalidTask(String),
    #[error("Gagal terhubung ke layanan AI. Detail Error: {last_error}")]
    Completion { last_error: String },
}

impl AssistantError {
    pub fn is_configuration(&self) -> bool {
        matches!(self, AssistantError::Configuration(_))
    }
}
