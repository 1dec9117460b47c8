use serde::{Deserialize, Serialize};

/// Two-value role set understood by chat-completion endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Normalizes a free-form role label. The dashboard labels its own replies `model`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "assistant" | "model" | "bot" | "ai" => Role::Assistant,
            _ => Role::User,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        Role::from_label(&value)
    }
}

impl From<Role> for String {
    fn from(value: Role) -> Self {
        value.as_str().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
}

impl ConversationTurn {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }
}

/// Returns the most recent `max_turns` turns in their original order.
///
/// The caller's history is only borrowed; the returned turns are copies.
pub fn window(history: &[ConversationTurn], max_turns: usize) -> Vec<ConversationTurn> {
    let start = history.len().saturating_sub(max_turns);
    history[start..].to_vec()
}
