use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::CompletionBackend;
use crate::config::Credentials;
use crate::error::{AttemptDisposition, AttemptError};
use crate::request::{ChatMessage, CompletionRequest, CompletionResult};

pub const NO_MODEL_AVAILABLE: &str = "no candidate model was available";

/// Request-scoped count of recorded failures, shared with the presentation layer so it can
/// show "trying an alternate server (n)".
#[derive(Debug, Clone, Default)]
pub struct AttemptCounter(Arc<AtomicU32>);

impl AttemptCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> u32 {
        self.0.load(Ordering::Relaxed)
    }

    fn reset(&self) {
        self.0.store(0, Ordering::Relaxed);
    }

    fn increment(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug)]
enum ChainState {
    Pending,
    Attempting(usize),
    NextModel(usize),
    Succeeded { text: String, model: String },
    Exhausted,
    Aborted,
}

/// Walks the candidate models of a request in order, one attempt each, until one answers.
pub struct FallbackChain<B> {
    backend: B,
    attempt_timeout: Duration,
    max_context_tokens: Option<usize>,
}

impl<B: CompletionBackend> FallbackChain<B> {
    pub fn new(backend: B, attempt_timeout: Duration) -> Self {
        Self {
            backend,
            attempt_timeout,
            max_context_tokens: None,
        }
    }

    pub fn with_context_budget(mut self, max_context_tokens: Option<usize>) -> Self {
        self.max_context_tokens = max_context_tokens;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Drives one pass through the chain. Attempts never overlap and the result is always
    /// terminal; the counter is zeroed before the first attempt.
    pub async fn run(
        &self,
        credentials: &Credentials,
        request: &CompletionRequest,
        counter: &AttemptCounter,
        cancel: &CancellationToken,
    ) -> CompletionResult {
        counter.reset();
        let models = request.candidate_models();
        let messages = request.to_messages(self.max_context_tokens);
        let mut last_error: Option<String> = None;
        let mut state = ChainState::Pending;
        loop {
            state = match state {
                ChainState::Pending => ChainState::Attempting(0),
                ChainState::Attempting(idx) => {
                    let model = &models[idx];
                    debug!(model = %model, position = idx, "attempting completion");
                    match self.attempt(credentials, model, &messages, cancel).await {
                        Ok(text) => ChainState::Succeeded {
                            text,
                            model: model.clone(),
                        },
                        Err(err) => match err.disposition() {
                            AttemptDisposition::Skip => {
                                warn!(model = %model, error = %err, "model unavailable; skipping");
                                ChainState::NextModel(idx)
                            }
                            AttemptDisposition::RecordAndAdvance => {
                                warn!(
                                    model = %model,
                                    error = %err,
                                    retry_after = ?err.retry_after(),
                                    "completion attempt failed"
                                );
                                last_error = Some(err.to_string());
                                counter.increment();
                                ChainState::NextModel(idx)
                            }
                            AttemptDisposition::Abort => {
                                info!(model = %model, error = %err, "completion chain aborted");
                                last_error = Some(err.to_string());
                                ChainState::Aborted
                            }
                        },
                    }
                }
                ChainState::NextModel(idx) if idx + 1 < models.len() => {
                    ChainState::Attempting(idx + 1)
                }
                ChainState::NextModel(_) => ChainState::Exhausted,
                ChainState::Succeeded { text, model } => {
                    info!(model = %model, "completion succeeded");
                    return CompletionResult::Success { text, model };
                }
                ChainState::Exhausted | ChainState::Aborted => {
                    return CompletionResult::Failure {
                        last_error: last_error.unwrap_or_else(|| NO_MODEL_AVAILABLE.to_string()),
                    };
                }
            };
        }
    }

    async fn attempt(
        &self,
        credentials: &Credentials,
        model: &str,
        messages: &[ChatMessage],
        cancel: &CancellationToken,
    ) -> Result<String, AttemptError> {
        if cancel.is_cancelled() {
            return Err(AttemptError::Cancelled);
        }
        let call = tokio::time::timeout(
            self.attempt_timeout,
            self.backend.complete(credentials, model, messages),
        );
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AttemptError::Cancelled),
            outcome = call => match outcome {
                Ok(result) => result,
                Err(_) => Err(AttemptError::Timeout(self.attempt_timeout)),
            },
        }
    }
}
