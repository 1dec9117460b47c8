mod backend;
mod config;
mod error;
mod fallback;
mod request;

pub use backend::{CompletionBackend, HttpCompletionBackend};
pub use config::{
    default_models, parse_model_list, resolve_credentials, resolve_credentials_with,
    CompletionSettings, ConfigError, CredentialSource, Credentials, EnvCredentials,
    StaticCredentials, CREDENTIAL_VARS, DEFAULT_COMPLETION_URL,
};
pub use error::{AttemptDisposition, AttemptError};
pub use fallback::{AttemptCounter, FallbackChain, NO_MODEL_AVAILABLE};
pub use request::{ChatMessage, CompletionRequest, CompletionResult};
