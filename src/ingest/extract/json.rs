use serde_json::Value as JsonValue;

use super::{join_fragments, TextExtractor};
use crate::error::{ConnectorError, Result};

/// JSON extractor: keys and scalar values, depth first
pub struct JsonExtractor;

impl TextExtractor for JsonExtractor {
    fn can_extract(&self, extension: &str) -> bool {
        extension == "json"
    }

    fn extract(&self, content: &str, path: &str) -> Result<String> {
        let value: JsonValue = serde_json::from_str(content).map_err(|e| {
            ConnectorError::Extraction(format!("JSON parse error in {}: {}", path, e))
        })?;
        let mut fragments = Vec::new();
        collect(&value, &mut fragments);
        Ok(join_fragments(fragments))
    }
}

fn collect(value: &JsonValue, out: &mut Vec<String>) {
    match value {
        JsonValue::Null => {}
        JsonValue::Bool(b) => out.push(b.to_string()),
        JsonValue::Number(n) => out.push(n.to_string()),
        JsonValue::String(s) => out.push(s.clone()),
        JsonValue::Array(items) => items.iter().for_each(|v| collect(v, out)),
        JsonValue::Object(map) => {
            for (key, v) in map {
                out.push(key.clone());
                collect(v, out);
            }
        }
    }
}
