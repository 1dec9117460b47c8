use std::sync::Arc;
use std::time::Duration;

use decor_core::RetrievedPassage;
use parking_lot::Mutex;
use rusqlite::InterruptHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::embedding::SharedEmbedder;
use crate::error::RetrievalError;
use crate::store::VectorStore;
use crate::vector::to_vector_literal;

#[derive(Default)]
struct InterruptSlot {
    handle: Option<InterruptHandle>,
    abandoned: bool,
}

/// Semantic search over the passage table. Best effort: any failure comes back as an empty
/// list and a `warn` event.
#[derive(Clone)]
pub struct VectorStoreGateway {
    store: VectorStore,
    embedder: Arc<SharedEmbedder>,
    query_timeout: Duration,
}

impl VectorStoreGateway {
    pub fn new(store: VectorStore, embedder: Arc<SharedEmbedder>, query_timeout: Duration) -> Self {
        Self {
            store,
            embedder,
            query_timeout,
        }
    }

    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    pub fn embedder(&self) -> &Arc<SharedEmbedder> {
        &self.embedder
    }

    /// Up to `limit` passages, nearest first. A zero limit is treated as one.
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
        cancel: &CancellationToken,
    ) -> Vec<RetrievedPassage> {
        match self.try_search(query, limit, cancel).await {
            Ok(passages) => passages,
            Err(err) => {
                warn!(error = %err, "pricing retrieval failed; continuing without database context");
                Vec::new()
            }
        }
    }

    pub async fn try_search(
        &self,
        query: &str,
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<RetrievedPassage>, RetrievalError> {
        let limit = limit.max(1);
        if cancel.is_cancelled() {
            return Err(RetrievalError::Cancelled);
        }
        // One deadline covers embedder start-up, embedding and the query.
        let deadline = Instant::now() + self.query_timeout;
        let vector = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RetrievalError::Cancelled),
            embedded = self.embed_query(query) => embedded?,
            _ = tokio::time::sleep_until(deadline) => {
                return Err(RetrievalError::Timeout(self.query_timeout));
            }
        };
        let literal = to_vector_literal(&vector);

        let store = self.store.clone();
        let slot = Arc::new(Mutex::new(InterruptSlot::default()));
        let task_slot = Arc::clone(&slot);
        let mut task = tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<RetrievedPassage>> {
            let conn = store.connect()?;
            {
                let mut slot = task_slot.lock();
                if slot.abandoned {
                    return Ok(Vec::new());
                }
                slot.handle = Some(conn.interrupt_handle());
            }
            conn.nearest(&literal, limit)
        });

        let stopped = tokio::select! {
            biased;
            _ = cancel.cancelled() => RetrievalError::Cancelled,
            joined = &mut task => {
                let passages = joined?.map_err(|e| RetrievalError::Store(format!("{e:#}")))?;
                debug!(returned = passages.len(), limit, "retrieval finished");
                return Ok(passages);
            }
            _ = tokio::time::sleep_until(deadline) => RetrievalError::Timeout(self.query_timeout),
        };

        {
            let mut slot = slot.lock();
            slot.abandoned = true;
            if let Some(handle) = slot.handle.as_ref() {
                handle.interrupt();
            }
        }
        // The blocking task owns the connection; wait for it so the connection is closed
        // before this call returns.
        let _ = task.await;
        Err(stopped)
    }

    /// An abandoned embedding keeps its blocking thread until the provider returns; it
    /// holds no store connection.
    async fn embed_query(&self, query: &str) -> Result<Vec<f32>, RetrievalError> {
        let embedder = self.embedder.get().await?;
        let text = query.to_string();
        tokio::task::spawn_blocking(move || embedder.embed(&text))
            .await?
            .map_err(|e| RetrievalError::Embedding(format!("{e:#}")))
    }
}
