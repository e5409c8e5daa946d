use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{HelixSearchError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub source: Map<String, Value>,
}

impl Document {
    /// Builds a document from a client payload; a missing id is generated.
    pub fn new(id: Option<String>, source: Value) -> Result<Self> {
        let Value::Object(source) = source else {
            return Err(HelixSearchError::invalid("document source must be a JSON object"));
        };
        let id = match id {
            Some(id) if id.is_empty() => {
                return Err(HelixSearchError::invalid("document id must not be empty"));
            }
            Some(id) => id,
            None => uuid::Uuid::new_v4().to_string(),
        };
        Ok(Self { id, source })
    }

    /// Stable shard assignment for this document's id.
    pub fn route(&self, shard_count: usize) -> usize {
        route_id(&self.id, shard_count)
    }

    /// Every string and number leaf, newline-joined, for the catch-all field.
    pub fn all_text(&self) -> String {
        let mut parts = Vec::new();
        for value in self.source.values() {
            collect_text(value, &mut parts);
        }
        parts.join("\n")
    }
}

#[allow(clippy::cast_possible_truncation)] // result is < shard_count
pub fn route_id(id: &str, shard_count: usize) -> usize {
    let hash = blake3::hash(id.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&hash.as_bytes()[..8]);
    (u64::from_le_bytes(prefix) % shard_count.max(1) as u64) as usize
}

fn collect_text(value: &Value, parts: &mut Vec<String>) {
    match value {
        Value::String(s) => parts.push(s.clone()),
        Value::Number(n) => parts.push(n.to_string()),
        Value::Array(items) => items.iter().for_each(|v| collect_text(v, parts)),
        Value::Object(map) => map.values().for_each(|v| collect_text(v, parts)),
        Value::Bool(_) | Value::Null => {}
    }
}
