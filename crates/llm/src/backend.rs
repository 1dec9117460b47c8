use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::{CompletionSettings, Credentials};
use crate::error::AttemptError;
use crate::request::ChatMessage;

/// One chat-completion call against one model. Implementations report every failure as an
/// [`AttemptError`] so the chain can classify it; they never retry on their own.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(
        &self,
        credentials: &Credentials,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<String, AttemptError>;
}

/// OpenAI-compatible `/chat/completions` endpoint (Groq by default).
#[derive(Clone)]
pub struct HttpCompletionBackend {
    http: Client,
    endpoint: String,
    temperature: f32,
    max_tokens: u32,
}

impl HttpCompletionBackend {
    pub fn new(settings: &CompletionSettings) -> Self {
        Self {
            http: Client::new(),
            endpoint: settings.endpoint.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        }
    }
}

#[async_trait]
impl CompletionBackend for HttpCompletionBackend {
    async fn complete(
        &self,
        credentials: &Credentials,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<String, AttemptError> {
        let payload = json!({
            "model": model,
            "messages": messages,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(credentials.expose())
            .json(&payload)
            .send()
            .await?;
        let status = response.status();
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let body = response.text().await?;
        if !status.is_success() {
            let (code, message) = parse_error_body(&body);
            let message = message.unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("unknown error")
                    .to_string()
            });
            let mut err = AttemptError::from_status(model, status.as_u16(), code.as_deref(), message);
            if let AttemptError::RateLimited {
                retry_after: slot, ..
            } = &mut err
            {
                *slot = retry_after;
            }
            return Err(err);
        }
        let value: Value =
            serde_json::from_str(&body).map_err(|e| AttemptError::Malformed(e.to_string()))?;
        let text = extract_completion_text(&value)
            .ok_or_else(|| AttemptError::Malformed("missing choices[0].message.content".to_string()))?;
        if text.trim().is_empty() {
            return Err(AttemptError::EmptyCompletion);
        }
        Ok(text)
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: Option<ErrorBody>,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    code: Option<Value>,
}

/// `(code, message)` from an `{"error": {...}}` body; both absent for non-JSON bodies.
fn parse_error_body(body: &str) -> (Option<String>, Option<String>) {
    let Some(error) = serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .and_then(|e| e.error)
    else {
        return (None, None);
    };
    let code = error.code.and_then(|c| match c {
        Value::String(s) => Some(s),
        Value::Null => None,
        other => Some(other.to_string()),
    });
    (code, error.message.filter(|m| !m.trim().is_empty()))
}

fn extract_completion_text(value: &Value) -> Option<String> {
    let message = value
        .get("choices")?
        .as_array()?
        .first()?
        .get("message")?;
    let content = message.get("content")?;
    if let Some(text) = content.as_str() {
        return Some(text.to_string());
    }
    if let Some(parts) = content.as_array() {
        let joined = parts
            .iter()
            .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
            .collect::<Vec<_>>()
            .join("");
        return Some(joined);
    }
    if content.is_null() {
        return Some(String::new());
    }
    None
}
