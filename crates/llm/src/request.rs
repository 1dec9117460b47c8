use decor_core::{truncate_to_tokens, ConversationTurn};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    system_context: String,
    history: Vec<ConversationTurn>,
    user_message: String,
    candidate_models: Vec<String>,
}

impl CompletionRequest {
    /// `candidate_models` must hold at least one non-blank model id; blanks are dropped and
    /// the remaining order is preserved.
    pub fn new(
        system_context: impl Into<String>,
        history: Vec<ConversationTurn>,
        user_message: impl Into<String>,
        candidate_models: Vec<String>,
    ) -> Result<Self, ConfigError> {
        let candidate_models: Vec<String> = candidate_models
            .into_iter()
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .collect();
        if candidate_models.is_empty() {
            return Err(ConfigError::NoCandidateModels);
        }
        Ok(Self {
            system_context: system_context.into(),
            history,
            user_message: user_message.into(),
            candidate_models,
        })
    }

    pub fn system_context(&self) -> &str {
        &self.system_context
    }

    pub fn history(&self) -> &[ConversationTurn] {
        &self.history
    }

    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    pub fn candidate_models(&self) -> &[String] {
        &self.candidate_models
    }

    /// `[system, ...history, user]`. With a token budget the system context is cut to fit;
    /// history and the user message are never cut.
    pub fn to_messages(&self, max_context_tokens: Option<usize>) -> Vec<ChatMessage> {
        let system = match max_context_tokens {
            Some(limit) => truncate_to_tokens(&self.system_context, limit).unwrap_or_else(|err| {
                warn!(error = %err, "token budget unavailable; sending full context");
                self.system_context.clone()
            }),
            None => self.system_context.clone(),
        };
        let mut messages = Vec::with_capacity(self.history.len() + 2);
        messages.push(ChatMessage::new("system", system));
        messages.extend(
            self.history
                .iter()
                .map(|turn| ChatMessage::new(turn.role.as_str(), turn.text.clone())),
        );
        messages.push(ChatMessage::new("user", self.user_message.clone()));
        messages
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionResult {
    Success { text: String, model: String },
    Failure { last_error: String },
}

impl CompletionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, CompletionResult::Success { .. })
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            CompletionResult::Success { text, .. } => Some(text),
            CompletionResult::Failure { .. } => None,
        }
    }
}
