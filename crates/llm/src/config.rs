use std::env;
use std::fmt;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

pub const DEFAULT_COMPLETION_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
pub const CREDENTIAL_VARS: [&str; 2] = ["GROQ_API_KEY", "DECOR_API_KEY"];
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 1000;

/// Preference order: most capable first.
pub fn default_models() -> Vec<String> {
    [
        "llama-3.3-70b-versatile",
        "llama-3.1-8b-instant",
        "mixtral-8x7b-32768",
        "gemma2-9b-it",
    ]
    .iter()
    .map(|m| m.to_string())
    .collect()
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("API key not found: set one of {}", .searched.join(", "))]
    MissingCredentials { searched: Vec<String> },
    #[error("no candidate models configured")]
    NoCandidateModels,
    #[error("invalid setting {key}: {message}")]
    InvalidSetting { key: String, message: String },
}

/// Bearer credential for the completion endpoint. Debug output never shows the key.
#[derive(Clone)]
pub struct Credentials {
    api_key: SecretString,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::new(api_key.into()),
        }
    }

    pub fn expose(&self) -> &str {
        self.api_key.expose_secret()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

/// Where a request obtains its credentials. Resolved once per request before any
/// retrieval or completion work.
pub trait CredentialSource: Send + Sync {
    fn resolve(&self) -> Result<Credentials, ConfigError>;
}

#[derive(Debug, Clone)]
pub struct EnvCredentials {
    vars: Vec<String>,
}

impl Default for EnvCredentials {
    fn default() -> Self {
        Self {
            vars: CREDENTIAL_VARS.iter().map(|v| v.to_string()).collect(),
        }
    }
}

impl CredentialSource for EnvCredentials {
    fn resolve(&self) -> Result<Credentials, ConfigError> {
        resolve_credentials_with(&self.vars, |var| env::var(var).ok())
    }
}

/// Fixed credentials, for embedding callers that already hold a key.
#[derive(Debug, Clone)]
pub struct StaticCredentials(pub Option<Credentials>);

impl CredentialSource for StaticCredentials {
    fn resolve(&self) -> Result<Credentials, ConfigError> {
        self.0
            .clone()
            .ok_or_else(|| ConfigError::MissingCredentials {
                searched: vec!["api_key".to_string()],
            })
    }
}

pub fn resolve_credentials() -> Result<Credentials, ConfigError> {
    EnvCredentials::default().resolve()
}

/// First non-blank value among `vars`, in order.
pub fn resolve_credentials_with(
    vars: &[String],
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Credentials, ConfigError> {
    vars.iter()
        .filter_map(|var| lookup(var))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
        .map(Credentials::new)
        .ok_or_else(|| ConfigError::MissingCredentials {
            searched: vars.to_vec(),
        })
}

#[derive(Debug, Clone)]
pub struct CompletionSettings {
    pub endpoint: String,
    pub models: Vec<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub attempt_timeout: Duration,
    pub max_context_tokens: Option<usize>,
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_COMPLETION_URL.to_string(),
            models: default_models(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            attempt_timeout: Duration::from_secs(30),
            max_context_tokens: None,
        }
    }
}

impl CompletionSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.models.iter().all(|m| m.trim().is_empty()) {
            return Err(ConfigError::NoCandidateModels);
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::InvalidSetting {
                key: "temperature".to_string(),
                message: format!("{} is outside 0.0..=2.0", self.temperature),
            });
        }
        if self.attempt_timeout.is_zero() {
            return Err(ConfigError::InvalidSetting {
                key: "attempt_timeout".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Parses a comma-separated model list, keeping order and dropping blanks.
pub fn parse_model_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|m| m.trim())
        .filter(|m| !m.is_empty())
        .map(|m| m.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars() -> Vec<String> {
        CREDENTIAL_VARS.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn first_present_variable_wins() {
        let env: HashMap<&str, &str> = [("DECOR_API_KEY", "gsk-second")].into_iter().collect();
        let creds = resolve_credentials_with(&vars(), |k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(creds.expose(), "gsk-second");

        let env: HashMap<&str, &str> = [("GROQ_API_KEY", "gsk-first"), ("DECOR_API_KEY", "x")]
            .into_iter()
            .collect();
        let creds = resolve_credentials_with(&vars(), |k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(creds.expose(), "gsk-first");
    }

    #[test]
    fn blank_values_count_as_missing() {
        let err = resolve_credentials_with(&vars(), |_| Some("   ".to_string())).unwrap_err();
        assert!(matches!(err, ConfigError::MissingCredentials { .. }));
        assert!(err.to_string().contains("GROQ_API_KEY"));
    }

    #[test]
    fn debug_redacts_key() {
        let creds = Credentials::new("gsk-secret-value");
        assert!(!format!("{creds:?}").contains("gsk-secret-value"));
    }

    #[test]
    fn model_list_keeps_order() {
        assert_eq!(
            parse_model_list(" a, ,b,c "),
            vec!["a".to_string(), "b".to_string(), "c".to_string()]
        );
    }

    #[test]
    fn empty_model_list_is_rejected() {
        let settings = CompletionSettings {
            models: Vec::new(),
            ..Default::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::NoCandidateModels)
        ));
        assert!(CompletionSettings::default().validate().is_ok());
    }
}
