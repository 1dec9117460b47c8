use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use decor_core::{default_supplementary, DEFAULT_DIMENSIONS};
use decor_llm::{
    default_models, parse_model_list, CompletionSettings, ConfigError, DEFAULT_COMPLETION_URL,
};
use secrecy::SecretString;
use serde::Deserialize;

pub const DEFAULT_CONFIG_FILE: &str = "decor.toml";
pub const DEFAULT_PERSONA_PATH: &str = "rag_data/ai_behavior_rules.txt";
pub const DEFAULT_RAG_DB: &str = "rag.sqlite";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";

/// Everything a running assistant needs besides credentials. Every field has a default, so
/// an absent or partial `decor.toml` is fine; environment variables override the file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    pub rag_db: PathBuf,
    pub persona_path: PathBuf,
    pub bind_addr: String,
    pub history_turns: usize,
    pub retrieval_limit: usize,
    pub retrieval_timeout_ms: u64,
    pub request_timeout_secs: u64,
    pub supplementary: Vec<String>,
    pub include_catalog: bool,
    pub completion: CompletionSection,
    pub embedding: EmbeddingSettings,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            rag_db: PathBuf::from(DEFAULT_RAG_DB),
            persona_path: PathBuf::from(DEFAULT_PERSONA_PATH),
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            history_turns: 5,
            retrieval_limit: 5,
            retrieval_timeout_ms: 5_000,
            request_timeout_secs: 120,
            supplementary: default_supplementary(),
            include_catalog: false,
            completion: CompletionSection::default(),
            embedding: EmbeddingSettings::default(),
        }
    }
}

impl AssistantConfig {
    /// Reads `path` if it exists; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        toml::from_str(&contents).map_err(|e| anyhow!("invalid config {}: {e}", path.display()))
    }

    /// File from `explicit`, else `DECOR_CONFIG`, else `decor.toml`; then process environment.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| env::var("DECOR_CONFIG").ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        let mut config = Self::load(&path)?;
        config.apply_env(|key| env::var(key).ok())?;
        Ok(config)
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        if let Some(value) = get("RAG_DB") {
            self.rag_db = PathBuf::from(value);
        }
        if let Some(value) = get("DECOR_PERSONA_PATH") {
            self.persona_path = PathBuf::from(value);
        }
        if let Some(value) = get("BIND_ADDR") {
            self.bind_addr = value;
        }
        if let Some(value) = get("DECOR_MODELS") {
            self.completion.models = parse_model_list(&value);
        }
        if let Some(value) = get("DECOR_COMPLETION_URL") {
            self.completion.endpoint = value;
        }
        if let Some(value) = get("EMBEDDING_PROVIDER") {
            self.embedding.provider = EmbeddingProviderKind::parse(&value)?;
        }
        if let Some(value) = get("EMBEDDING_MODEL") {
            self.embedding.model = value;
        }
        if let Some(value) = get("EMBEDDING_BASE_URL") {
            self.embedding.base_url = value;
        }
        if let Some(value) = get("HASH_EMBED_DIMENSIONS") {
            self.embedding.dimensions =
                value
                    .parse::<usize>()
                    .map_err(|e| ConfigError::InvalidSetting {
                        key: "HASH_EMBED_DIMENSIONS".to_string(),
                        message: e.to_string(),
                    })?;
        }
        if let Some(value) = get("EMBEDDING_API_KEY") {
            self.embedding.api_key = Some(SecretString::new(value));
        }
        Ok(())
    }

    pub fn completion_settings(&self) -> CompletionSettings {
        self.completion.to_settings()
    }

    pub fn retrieval_timeout(&self) -> Duration {
        Duration::from_millis(self.retrieval_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.completion_settings().validate()?;
        if self.embedding.dimensions == 0 {
            return Err(ConfigError::InvalidSetting {
                key: "embedding.dimensions".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidSetting {
                key: "request_timeout_secs".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CompletionSection {
    pub endpoint: String,
    pub models: Vec<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub attempt_timeout_secs: u64,
    pub max_context_tokens: Option<usize>,
}

impl Default for CompletionSection {
    fn default() -> Self {
        let defaults = CompletionSettings::default();
        Self {
            endpoint: DEFAULT_COMPLETION_URL.to_string(),
            models: default_models(),
            temperature: defaults.temperature,
            max_tokens: defaults.max_tokens,
            attempt_timeout_secs: defaults.attempt_timeout.as_secs(),
            max_context_tokens: None,
        }
    }
}

impl CompletionSection {
    pub fn to_settings(&self) -> CompletionSettings {
        CompletionSettings {
            endpoint: self.endpoint.clone(),
            models: self.models.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            attempt_timeout: Duration::from_secs(self.attempt_timeout_secs),
            max_context_tokens: self.max_context_tokens,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    Hash,
    #[serde(alias = "openai")]
    Remote,
}

impl EmbeddingProviderKind {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.to_lowercase().as_str() {
            "hash" => Ok(Self::Hash),
            "remote" | "openai" => Ok(Self::Remote),
            other => Err(ConfigError::InvalidSetting {
                key: "EMBEDDING_PROVIDER".to_string(),
                message: format!("unknown provider {other}"),
            }),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider: EmbeddingProviderKind,
    pub model: String,
    pub base_url: String,
    pub dimensions: usize,
    #[serde(skip)]
    pub api_key: Option<SecretString>,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::Hash,
            model: "text-embedding-3-small".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            dimensions: DEFAULT_DIMENSIONS,
            api_key: None,
        }
    }
}

impl EmbeddingSettings {
    pub fn api_key(&self) -> Option<SecretString> {
        self.api_key.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn partial_file_keeps_defaults() {
        let config: AssistantConfig = toml::from_str(
            r#"
            retrieval_limit = 3
            [completion]
            models = ["llama-3.1-8b-instant"]
            "#,
        )
        .unwrap();
        assert_eq!(config.retrieval_limit, 3);
        assert_eq!(config.history_turns, 5);
        assert_eq!(config.completion.models, vec!["llama-3.1-8b-instant"]);
        assert_eq!(config.completion.endpoint, DEFAULT_COMPLETION_URL);
        assert_eq!(config.embedding.dimensions, 384);
    }

    #[test]
    fn missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = AssistantConfig::load(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config.persona_path, PathBuf::from(DEFAULT_PERSONA_PATH));
    }

    #[test]
    fn environment_overrides_file() {
        let env: HashMap<&str, &str> = [
            ("DECOR_MODELS", "b, a"),
            ("RAG_DB", "/tmp/other.sqlite"),
            ("EMBEDDING_PROVIDER", "openai"),
            ("HASH_EMBED_DIMENSIONS", "64"),
        ]
        .into_iter()
        .collect();
        let mut config = AssistantConfig::default();
        config
            .apply_env(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.completion.models, vec!["b", "a"]);
        assert_eq!(config.rag_db, PathBuf::from("/tmp/other.sqlite"));
        assert_eq!(config.embedding.provider, EmbeddingProviderKind::Remote);
        assert_eq!(config.embedding.dimensions, 64);
    }

    #[test]
    fn bad_numbers_are_reported() {
        let mut config = AssistantConfig::default();
        let err = config
            .apply_env(|k| (k == "HASH_EMBED_DIMENSIONS").then(|| "many".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("HASH_EMBED_DIMENSIONS"));
    }
}
