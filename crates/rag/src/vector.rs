//! Text form of embeddings as stored in `pricing_embeddings.embedding` and bound as the
//! query parameter: `[0.1,0.2,...]`.

use anyhow::{anyhow, Context, Result};

pub fn to_vector_literal(vector: &[f32]) -> String {
    let mut out = String::with_capacity(vector.len() * 12 + 2);
    out.push('[');
    for (idx, value) in vector.iter().enumerate() {
        if idx > 0 {
            out.push(',');
        }
        out.push_str(&value.to_string());
    }
    out.push(']');
    out
}

pub fn parse_vector_literal(literal: &str) -> Result<Vec<f32>> {
    let inner = literal
        .trim()
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .ok_or_else(|| anyhow!("vector literal must be wrapped in brackets"))?;
    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }
    inner
        .split(',')
        .enumerate()
        .map(|(idx, part)| {
            part.trim()
                .parse::<f32>()
                .with_context(|| format!("invalid component {idx}: {part:?}"))
        })
        .collect()
}

/// `1 - cos(a, b)`. A zero-norm side is treated as orthogonal.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> Result<f64> {
    if a.len() != b.len() {
        return Err(anyhow!(
            "dimension mismatch: {} vs {}",
            a.len(),
            b.len()
        ));
    }
    let mut dot = 0.0f64;
    let mut a_norm = 0.0f64;
    let mut b_norm = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        a_norm += x * x;
        b_norm += y * y;
    }
    if a_norm == 0.0 || b_norm == 0.0 {
        return Ok(1.0);
    }
    Ok(1.0 - dot / (a_norm.sqrt() * b_norm.sqrt()))
}
