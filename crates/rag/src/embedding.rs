use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use decor_core::{HashEmbedder, HashEmbedderConfig};
use reqwest::blocking::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::config::{EmbeddingProviderKind, EmbeddingSettings};
use crate::error::RetrievalError;

/// Text to fixed-length vector. Implementations are synchronous and deterministic for a given
/// model; callers on the async path run them on the blocking pool.
pub trait EmbeddingProvider: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>>;
    fn dimensions(&self) -> usize;
}

#[derive(Clone)]
pub enum EmbeddingBackend {
    Hash(HashEmbedder),
    Remote(RemoteEmbeddingClient),
}

#[derive(Clone)]
pub struct EmbeddingClient {
    backend: EmbeddingBackend,
}

impl EmbeddingClient {
    pub fn from_settings(settings: &EmbeddingSettings) -> Result<Self> {
        let backend = match settings.provider {
            EmbeddingProviderKind::Remote => {
                EmbeddingBackend::Remote(RemoteEmbeddingClient::new(settings)?)
            }
            EmbeddingProviderKind::Hash => EmbeddingBackend::Hash(HashEmbedder::new(
                HashEmbedderConfig {
                    dimensions: settings.dimensions,
                    ..Default::default()
                },
            )),
        };
        Ok(Self { backend })
    }

    pub fn hash() -> Self {
        Self {
            backend: EmbeddingBackend::Hash(HashEmbedder::new(HashEmbedderConfig::default())),
        }
    }

    pub fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        match &self.backend {
            EmbeddingBackend::Hash(embedder) => Ok(inputs
                .iter()
                .map(|text| embedder.embed_text(text))
                .collect()),
            EmbeddingBackend::Remote(client) => client.embed_batch(inputs),
        }
    }
}

impl EmbeddingProvider for EmbeddingClient {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let inputs = vec![text.to_string()];
        let mut output = self.embed_batch(&inputs)?;
        output
            .pop()
            .ok_or_else(|| anyhow!("embedding provider returned no vector"))
    }

    fn dimensions(&self) -> usize {
        match &self.backend {
            EmbeddingBackend::Hash(embedder) => embedder.dimensions(),
            EmbeddingBackend::Remote(client) => client.dimensions,
        }
    }
}

/// OpenAI-compatible `/embeddings` endpoint.
#[derive(Clone)]
pub struct RemoteEmbeddingClient {
    http: Client,
    url: String,
    model: String,
    api_key: SecretString,
    dimensions: usize,
}

impl RemoteEmbeddingClient {
    pub fn new(settings: &EmbeddingSettings) -> Result<Self> {
        let api_key = settings
            .api_key()
            .ok_or_else(|| anyhow!("EMBEDDING_API_KEY is required for remote embeddings"))?;
        Ok(Self {
            http: Client::new(),
            url: format!("{}/embeddings", settings.base_url.trim_end_matches('/')),
            model: settings.model.clone(),
            api_key,
            dimensions: settings.dimensions,
        })
    }

    pub fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        let payload = serde_json::json!({
            "model": self.model,
            "input": inputs,
        });
        let response = self
            .http
            .post(&self.url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&payload)
            .send()
            .context("embedding request failed")?;
        if !response.status().is_success() {
            return Err(anyhow!("embedding request failed: {}", response.status()));
        }
        let parsed: EmbeddingResponse = response.json()?;
        let mut data = parsed.data;
        data.sort_by_key(|d| d.index);
        let vectors: Vec<Vec<f32>> = data.into_iter().map(|d| d.embedding).collect();
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimensions) {
            return Err(anyhow!(
                "embedding has {} dimensions, expected {}",
                bad.len(),
                self.dimensions
            ));
        }
        Ok(vectors)
    }
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

type ProviderFactory = dyn Fn() -> Result<Arc<dyn EmbeddingProvider>> + Send + Sync;

/// Process-wide embedder handle, built on first use. Concurrent first callers wait on the
/// same initialisation; a failed initialisation leaves the cell empty for the next caller.
pub struct SharedEmbedder {
    cell: OnceCell<Arc<dyn EmbeddingProvider>>,
    factory: Arc<ProviderFactory>,
    initializations: AtomicUsize,
}

impl SharedEmbedder {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn EmbeddingProvider>> + Send + Sync + 'static,
    {
        Self {
            cell: OnceCell::new(),
            factory: Arc::new(factory),
            initializations: AtomicUsize::new(0),
        }
    }

    pub fn from_settings(settings: EmbeddingSettings) -> Self {
        Self::new(move || {
            let client = EmbeddingClient::from_settings(&settings)?;
            Ok(Arc::new(client) as Arc<dyn EmbeddingProvider>)
        })
    }

    pub async fn get(&self) -> Result<Arc<dyn EmbeddingProvider>, RetrievalError> {
        let provider = self
            .cell
            .get_or_try_init(|| async {
                let factory = Arc::clone(&self.factory);
                let built = match tokio::task::spawn_blocking(move || factory()).await {
                    Ok(built) => built,
                    Err(err) => return Err(RetrievalError::from(err)),
                };
                match built {
                    Ok(provider) => {
                        self.initializations.fetch_add(1, Ordering::SeqCst);
                        info!(dimensions = provider.dimensions(), "embedding provider ready");
                        Ok(provider)
                    }
                    Err(err) => {
                        warn!(error = %err, "embedding provider initialisation failed");
                        Err(RetrievalError::Embedding(format!("{err:#}")))
                    }
                }
            })
            .await?;
        Ok(Arc::clone(provider))
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.initialized()
    }

    /// Successful initialisations so far; at most one over the handle's lifetime.
    pub fn initializations(&self) -> usize {
        self.initializations.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_client_is_deterministic() {
        let client = EmbeddingClient::hash();
        let a = client.embed("Kitchen Set Aluminium").unwrap();
        let b = client.embed("Kitchen Set Aluminium").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), client.dimensions());
        assert!(client.embed("").is_ok());
    }

    #[test]
    fn remote_client_needs_a_key() {
        let settings = EmbeddingSettings {
            provider: EmbeddingProviderKind::Remote,
            api_key: None,
            ..Default::default()
        };
        assert!(EmbeddingClient::from_settings(&settings).is_err());
    }

    #[tokio::test]
    async fn failed_init_is_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&attempts);
        let shared = SharedEmbedder::new(move || {
            if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(anyhow!("model download interrupted"));
            }
            Ok(Arc::new(EmbeddingClient::hash()) as Arc<dyn EmbeddingProvider>)
        });
        assert!(shared.get().await.is_err());
        assert!(!shared.is_initialized());
        assert!(shared.get().await.is_ok());
        assert_eq!(shared.initializations(), 1);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }
}
