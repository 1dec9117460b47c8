use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use decor_core::{
    load_persona, window, AssembledContext, AssistantTask, ContextAssembler, ConversationTurn,
    PricingCatalog,
};
use decor_llm::{
    AttemptCounter, CompletionBackend, CompletionRequest, CompletionResult, CredentialSource,
    EnvCredentials, FallbackChain, HttpCompletionBackend,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::AssistantConfig;
use crate::embedding::SharedEmbedder;
use crate::error::AssistantError;
use crate::gateway::VectorStoreGateway;
use crate::store::VectorStore;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssistantReply {
    pub text: String,
    pub model: String,
    pub attempts: u32,
    pub passages: usize,
}

/// Request pipeline: credentials, history window, retrieval, assembly, fallback chain.
pub struct Assistant<B> {
    credentials: Arc<dyn CredentialSource>,
    gateway: VectorStoreGateway,
    chain: FallbackChain<B>,
    assembler: ContextAssembler,
    catalog: PricingCatalog,
    models: Vec<String>,
    persona_path: PathBuf,
    history_turns: usize,
    retrieval_limit: usize,
    request_timeout: Duration,
}

impl Assistant<HttpCompletionBackend> {
    /// Production wiring: environment credentials, SQLite store at `config.rag_db`, lazily
    /// built embedder and the HTTP completion endpoint.
    pub fn from_config(config: &AssistantConfig) -> Self {
        let embedder = Arc::new(SharedEmbedder::from_settings(config.embedding.clone()));
        let gateway = VectorStoreGateway::new(
            VectorStore::new(&config.rag_db),
            embedder,
            config.retrieval_timeout(),
        );
        let backend = HttpCompletionBackend::new(&config.completion_settings());
        Self::new(config, Arc::new(EnvCredentials::default()), gateway, backend)
    }
}

impl<B: CompletionBackend> Assistant<B> {
    pub fn new(
        config: &AssistantConfig,
        credentials: Arc<dyn CredentialSource>,
        gateway: VectorStoreGateway,
        backend: B,
    ) -> Self {
        let settings = config.completion_settings();
        let catalog = PricingCatalog::builtin();
        let mut assembler = ContextAssembler::new(config.supplementary.clone());
        if config.include_catalog {
            match catalog.to_json() {
                Ok(data) => assembler = assembler.with_reference_data(data),
                Err(err) => warn!(error = %err, "catalog serialisation failed; omitted from context"),
            }
        }
        Self {
            credentials,
            gateway,
            chain: FallbackChain::new(backend, settings.attempt_timeout)
                .with_context_budget(settings.max_context_tokens),
            assembler,
            catalog,
            models: settings.models,
            persona_path: config.persona_path.clone(),
            history_turns: config.history_turns,
            retrieval_limit: config.retrieval_limit,
            request_timeout: config.request_timeout(),
        }
    }

    pub fn gateway(&self) -> &VectorStoreGateway {
        &self.gateway
    }

    pub fn chain(&self) -> &FallbackChain<B> {
        &self.chain
    }

    pub fn catalog(&self) -> &PricingCatalog {
        &self.catalog
    }

    /// Context the model would see for `query`, without calling it.
    pub async fn context_for(
        &self,
        query: &str,
        limit: usize,
        cancel: &CancellationToken,
    ) -> AssembledContext {
        let passages = self.gateway.search(query, limit, cancel).await;
        let persona = load_persona(&self.persona_path);
        self.assembler.assemble(&passages, &persona)
    }

    pub async fn respond(
        &self,
        task: &AssistantTask,
        history: &[ConversationTurn],
        counter: &AttemptCounter,
        cancel: &CancellationToken,
    ) -> Result<AssistantReply, AssistantError> {
        let credentials = self.credentials.resolve()?;
        task.validate()
            .map_err(|e| AssistantError::InvalidTask(e.to_string()))?;
        let history = if task.uses_history() {
            window(history, self.history_turns)
        } else {
            Vec::new()
        };
        let user_message = task
            .user_message(&self.catalog)
            .map_err(|e| AssistantError::InvalidTask(e.to_string()))?;
        info!(task = task.name(), history = history.len(), "assistant request");

        let work = async {
            let passages = self
                .gateway
                .search(&task.retrieval_query(), self.retrieval_limit, cancel)
                .await;
            let persona = load_persona(&self.persona_path);
            let context = self.assembler.assemble(&passages, &persona);
            let request = CompletionRequest::new(
                context.into_string(),
                history,
                user_message,
                self.models.clone(),
            )?;
            let result = self.chain.run(&credentials, &request, counter, cancel).await;
            Ok::<_, AssistantError>((result, passages.len()))
        };

        let (result, passages) = match tokio::time::timeout(self.request_timeout, work).await {
            Ok(outcome) => outcome?,
            Err(_) => {
                warn!(task = task.name(), "assistant request timed out");
                return Err(AssistantError::Completion {
                    last_error: format!(
                        "request timed out after {}s",
                        self.request_timeout.as_secs()
                    ),
                });
            }
        };
        match result {
            CompletionResult::Success { text, model } => Ok(AssistantReply {
                text,
                model,
                attempts: counter.get(),
                passages,
            }),
            CompletionResult::Failure { last_error } => {
                warn!(task = task.name(), error = %last_error, "assistant request failed");
                Err(AssistantError::Completion { last_error })
            }
        }
    }
}
