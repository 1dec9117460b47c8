use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One nearest-neighbour hit from the knowledge base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedPassage {
    pub content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub distance: f64,
}

impl RetrievedPassage {
    pub fn new(content: impl Into<String>, metadata: Map<String, Value>, distance: f64) -> Self {
        Self {
            content: content.into(),
            metadata,
            distance,
        }
    }

    /// Parses the stored metadata column. Non-object JSON and garbage both collapse to an
    /// empty map so a bad row never hides its content.
    pub fn metadata_from_json(raw: Option<&str>) -> Map<String, Value> {
        match raw.map(serde_json::from_str::<Value>) {
            Some(Ok(Value::Object(map))) => map,
            _ => Map::new(),
        }
    }
}
