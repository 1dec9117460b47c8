use once_cell::sync::Lazy;
use tiktoken_rs::CoreBPE;

use crate::error::{CoreError, Result};

/// Cuts `text` down to at most `max_tokens` cl100k tokens. Text already within budget is
/// returned unchanged.
pub fn truncate_to_tokens(text: &str, max_tokens: usize) -> Result<String> {
    let bpe = cl100k()?;
    let tokens = bpe.encode_with_special_tokens(text);
    if tokens.len() <= max_tokens {
        return Ok(text.to_string());
    }
    // A cut can land inside a multi-byte character; back off until it decodes.
    let mut end = max_tokens;
    while end > 0 {
        if let Ok(decoded) = bpe.decode(tokens[..end].to_vec()) {
            return Ok(decoded);
        }
        end -= 1;
    }
    Ok(String::new())
}

static CL100K: Lazy<std::result::Result<CoreBPE, String>> =
    Lazy::new(|| tiktoken_rs::cl100k_base().map_err(|e| e.to_string()));

fn cl100k() -> Result<&'static CoreBPE> {
    CL100K
        .as_ref()
        .map_err(|e| CoreError::Tokenizer(e.clone()))
}
