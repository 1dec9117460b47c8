//! Loads the `rag_data/` knowledge base into the passage table.

use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use decor_core::format_grouped;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::embedding::EmbeddingProvider;
use crate::store::{PassageInsert, VectorStore};

#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub text: String,
    pub title: String,
    pub metadata: Value,
}

impl Chunk {
    fn new(text: String, title: impl Into<String>, metadata: Value) -> Self {
        Self {
            text,
            title: title.into(),
            metadata,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SeedReport {
    pub files: Vec<FileReport>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub file: String,
    pub category: String,
    pub chunks: usize,
}

/// Embeds and stores every `.txt` and `.json` file directly inside `dir`, in file-name order.
/// With `reset` the table is dropped first.
pub fn seed_directory(
    store: &VectorStore,
    embedder: &dyn EmbeddingProvider,
    dir: &Path,
    reset: bool,
) -> Result<SeedReport> {
    if !dir.is_dir() {
        return Err(anyhow!("RAG data directory not found: {}", dir.display()));
    }
    if reset {
        store.reset()?;
        info!(db = %store.path().display(), "passage table reset");
    } else {
        store.init()?;
    }

    let mut report = SeedReport::default();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let path = entry.path();
        let Some(chunks) = chunks_for_file(path)? else {
            continue;
        };
        let file = entry.file_name().to_string_lossy().to_string();
        let category = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| file.clone());
        let mut inserts = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            if chunk.text.trim().is_empty() {
                continue;
            }
            let embedding = embedder
                .embed(&chunk.text)
                .with_context(|| format!("failed to embed chunk {:?} from {file}", chunk.title))?;
            inserts.push(PassageInsert {
                category: category.clone(),
                item_name: chunk.title,
                content: chunk.text,
                metadata: chunk.metadata,
                embedding,
            });
        }
        let stored = store.insert_passages(&inserts)?;
        info!(file = %file, chunks = stored, "seeded knowledge file");
        report.total += stored;
        report.files.push(FileReport {
            file,
            category,
            chunks: stored,
        });
    }
    Ok(report)
}

/// Chunks for one file; `None` when the extension is not a knowledge-base format.
pub fn chunks_for_file(path: &Path) -> Result<Option<Vec<Chunk>>> {
    let file = path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    match path.extension().and_then(|e| e.to_str()) {
        Some("txt") => {
            let content = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            Ok(Some(vec![Chunk::new(
                content,
                "System Rules",
                json!({ "source": file }),
            )]))
        }
        Some("json") => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let data: Value = serde_json::from_str(&raw)
                .with_context(|| format!("invalid JSON in {}", path.display()))?;
            Ok(Some(json_chunks(&file, &data)))
        }
        _ => Ok(None),
    }
}

fn json_chunks(file: &str, data: &Value) -> Vec<Chunk> {
    if let Value::Array(items) = data {
        return items.iter().map(product_chunk).collect();
    }
    let empty = Map::new();
    let object = data.as_object().unwrap_or(&empty);
    if file.contains("company") {
        company_chunks(object)
    } else if file.contains("operational") {
        operational_chunks(object)
    } else if file.contains("civil") {
        civil_chunks(object)
    } else if file.contains("price_tiers") {
        tier_chunks(object)
    } else {
        warn!(file, "unrecognised knowledge object; skipped");
        Vec::new()
    }
}

fn product_chunk(item: &Value) -> Chunk {
    let name = first_text(item, &["name", "item"]);
    let text = match item.get("rag_context").map(plain) {
        Some(context) if !context.trim().is_empty() => context,
        _ => {
            let mut text = format!("{name}. ");
            if truthy(item.get("price")) {
                text.push_str(&format!(
                    "Harga: Rp {}/{}. ",
                    amount(item.get("price")),
                    field(item, "unit")
                ));
            }
            if truthy(item.get("features")) {
                text.push_str(&format!("Fitur: {}. ", field(item, "features")));
            }
            if truthy(item.get("description")) {
                text.push_str(&field(item, "description"));
            }
            text.trim_end().to_string()
        }
    };
    let title = first_text(item, &["name", "item", "id"]);
    let title = if title.is_empty() {
        "Product".to_string()
    } else {
        title
    };
    Chunk::new(text, title, item.clone())
}

fn company_chunks(data: &Map<String, Value>) -> Vec<Chunk> {
    let profile = data
        .get("company_profile")
        .cloned()
        .unwrap_or_else(|| json!({}));
    let text = format!(
        "Profil Perusahaan: {} ({}). {}.",
        field(&profile, "name"),
        field(&profile, "brand_name"),
        field(&profile, "description")
    );
    vec![Chunk::new(text, "Company Profile", profile)]
}

fn operational_chunks(data: &Map<String, Value>) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    for rule in array(data.get("shipping_policy")) {
        chunks.push(Chunk::new(
            format!(
                "Aturan Ongkir {}: {}. Biaya: Rp {}. Syarat: {}.",
                field(rule, "region"),
                field(rule, "description"),
                amount(rule.get("fee")),
                field(rule, "condition")
            ),
            "Shipping Rule",
            rule.clone(),
        ));
    }
    for faq in array(data.get("faq_rules")) {
        chunks.push(Chunk::new(
            format!("Q: {} A: {}", field(faq, "question"), field(faq, "answer")),
            "FAQ",
            faq.clone(),
        ));
    }
    chunks
}

fn civil_chunks(data: &Map<String, Value>) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    for (key, value) in data {
        let Value::Array(items) = value else {
            continue;
        };
        for item in items {
            let title = field(item, "item");
            chunks.push(Chunk::new(
                format!(
                    "Pekerjaan Sipil ({key}): {title}. Harga: Rp {}/{}.",
                    amount(item.get("price")),
                    field(item, "unit")
                ),
                title,
                item.clone(),
            ));
        }
    }
    chunks
}

fn tier_chunks(data: &Map<String, Value>) -> Vec<Chunk> {
    let tiers = data
        .get("comparison_matrix")
        .and_then(|m| m.get("kitchen_set"));
    array(tiers)
        .map(|tier| {
            let material = field(tier, "material");
            Chunk::new(
                format!(
                    "Perbandingan Material Kitchen Set ({material}): Grade {}. Harga {}. Kelebihan: {}. Kekurangan: {}. Durabilitas: {}.",
                    field(tier, "tier"),
                    field(tier, "price_range"),
                    field(tier, "pros"),
                    field(tier, "cons"),
                    field(tier, "durability")
                ),
                format!("Tier {material}"),
                tier.clone(),
            )
        })
        .collect()
}

fn array(value: Option<&Value>) -> impl Iterator<Item = &Value> {
    value
        .and_then(Value::as_array)
        .map(|items| items.iter())
        .into_iter()
        .flatten()
}

fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|v| v != 0.0).unwrap_or(true),
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

fn first_text(item: &Value, keys: &[&str]) -> String {
    keys.iter()
        .map(|key| field(item, key))
        .find(|text| !text.is_empty())
        .unwrap_or_default()
}

fn field(item: &Value, key: &str) -> String {
    item.get(key).map(plain).unwrap_or_default()
}

/// Display text of a JSON value; lists are comma-joined.
fn plain(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(plain).collect::<Vec<_>>().join(", "),
        other => other.to_string(),
    }
}

/// Numbers get id-ID digit grouping; anything else is shown as written.
fn amount(value: Option<&Value>) -> String {
    match value {
        Some(Value::Number(n)) => n.as_f64().map(format_grouped).unwrap_or_default(),
        Some(other) => plain(other),
        None => String::new(),
    }
}
