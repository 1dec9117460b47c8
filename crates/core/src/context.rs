use std::fs;
use std::path::Path;

use serde_json::{Map, Value};
use tracing::warn;

use crate::currency::{format_rupiah, parse_amount};
use crate::passage::RetrievedPassage;

pub const FALLBACK_PERSONA: &str = "PERAN: Kamu adalah Sales Interior profesional.";
pub const CONTEXT_HEADING: &str =
    "KONTEKS DATABASE (PENTING: Gunakan informasi ini sebagai acuan utama):";
pub const CONTEXT_START: &str = "=== KONTEKS DATABASE MULAI ===";
pub const CONTEXT_END: &str = "=== KONTEKS DATABASE SELESAI ===";
pub const NO_CONTEXT_FALLBACK: &str =
    "Tidak ada data spesifik dari database, gunakan pengetahuan umum interior standard.";
pub const PASSAGE_SEPARATOR: &str = "\n\n---\n\n";
pub const METADATA_HEADING: &str = "[DATA SPESIFIK SISTEM]:";
pub const SUPPLEMENTARY_HEADING: &str = "REFERENSI TAMBAHAN:";

const IN_CITY_KEYS: [&str; 2] = ["price_dalam_kota", "priceIn"];
const OUT_OF_CITY_KEYS: [&str; 2] = ["price_luar_kota", "priceOut"];

/// Single prompt context handed to the completion chain as the system message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledContext(String);

impl AssembledContext {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn has_retrieved_passages(&self) -> bool {
        self.0.contains(CONTEXT_START)
    }
}

impl AsRef<str> for AssembledContext {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone)]
pub struct ContextAssembler {
    supplementary: Vec<String>,
    reference_data: Option<String>,
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self {
            supplementary: default_supplementary(),
            reference_data: None,
        }
    }
}

pub fn default_supplementary() -> Vec<String> {
    vec![
        "Garansi 12 Bulan".to_string(),
        "Gratis Survey & Desain 3D (Area Bandung)".to_string(),
    ]
}

impl ContextAssembler {
    pub fn new(supplementary: Vec<String>) -> Self {
        Self {
            supplementary,
            reference_data: None,
        }
    }

    /// Appends serialized static reference data (e.g. the price catalog) after the
    /// supplementary facts.
    pub fn with_reference_data(mut self, data: impl Into<String>) -> Self {
        self.reference_data = Some(data.into());
        self
    }

    /// Persona first, then retrieved passages (or the fallback sentence), then the static
    /// facts. Never fails; empty retrieval only changes the middle section.
    pub fn assemble(&self, passages: &[RetrievedPassage], persona_rules: &str) -> AssembledContext {
        let mut out = String::new();
        out.push_str(persona_rules.trim());
        out.push_str("\n\n");
        out.push_str(CONTEXT_HEADING);
        out.push('\n');
        if passages.is_empty() {
            out.push_str(NO_CONTEXT_FALLBACK);
        } else {
            out.push_str(CONTEXT_START);
            out.push('\n');
            let rendered = passages
                .iter()
                .map(render_passage)
                .collect::<Vec<_>>()
                .join(PASSAGE_SEPARATOR);
            out.push_str(&rendered);
            out.push('\n');
            out.push_str(CONTEXT_END);
        }
        out.push_str("\n\n");
        out.push_str(SUPPLEMENTARY_HEADING);
        for fact in &self.supplementary {
            out.push_str("\n- ");
            out.push_str(fact.trim());
        }
        if let Some(data) = &self.reference_data {
            out.push_str("\n\nDATA HARGA: ");
            out.push_str(data.trim());
        }
        out.push('\n');
        AssembledContext(out)
    }
}

fn render_passage(passage: &RetrievedPassage) -> String {
    let mut text = passage.content.trim().to_string();
    let lines = metadata_lines(&passage.metadata);
    if !lines.is_empty() {
        text.push_str("\n\n");
        text.push_str(METADATA_HEADING);
        text.push('\n');
        text.push_str(&lines.join("\n"));
    }
    text
}

/// Human-readable price lines for the metadata fields the assistant understands.
pub fn metadata_lines(metadata: &Map<String, Value>) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(price) = first_amount(metadata, &IN_CITY_KEYS) {
        lines.push(format!("- Harga Dalam Kota: {}", format_rupiah(price)));
    }
    if let Some(price) = first_amount(metadata, &OUT_OF_CITY_KEYS) {
        lines.push(format!("- Harga Luar Kota: {}", format_rupiah(price)));
    }
    if let Some(fee) = first_amount(metadata, &["fee"]) {
        let condition = metadata
            .get("condition")
            .and_then(Value::as_str)
            .unwrap_or("");
        lines.push(format!(
            "- Biaya Tambahan: {} ({})",
            format_rupiah(fee),
            condition
        ));
    }
    lines
}

fn first_amount(metadata: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter()
        .filter_map(|key| metadata.get(*key))
        .filter_map(parse_amount)
        .find(|amount| *amount > 0.0)
}

/// Reads the persona document, substituting the embedded fallback when it is unreadable
/// or blank.
pub fn load_persona(path: &Path) -> String {
    match fs::read_to_string(path) {
        Ok(text) if !text.trim().is_empty() => text,
        Ok(_) => {
            warn!(path = %path.display(), "persona file is empty; using fallback persona");
            FALLBACK_PERSONA.to_string()
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "failed to read persona file; using fallback persona");
            FALLBACK_PERSONA.to_string()
        }
    }
}
