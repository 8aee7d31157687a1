use serde_yaml_ng::Value as YamlValue;

use super::{join_fragments, TextExtractor};
use crate::error::{ConnectorError, Result};

/// YAML extractor: keys and scalar values, depth first
pub struct YamlExtractor;

impl TextExtractor for YamlExtractor {
    fn can_extract(&self, extension: &str) -> bool {
        matches!(extension, "yaml" | "yml")
    }

    fn extract(&self, content: &str, path: &str) -> Result<String> {
        let value: YamlValue = serde_yaml_ng::from_str(content).map_err(|e| {
            ConnectorError::Extraction(format!("YAML parse error in {}: {}", path, e))
        })?;
        let mut fragments = Vec::new();
        collect(&value, &mut fragments);
        Ok(join_fragments(fragments))
    }
}

fn collect(value: &YamlValue, out: &mut Vec<String>) {
    match value {
        YamlValue::Null => {}
        YamlValue::Bool(b) => out.push(b.to_string()),
        YamlValue::Number(n) => out.push(n.to_string()),
        YamlValue::String(s) => out.push(s.clone()),
        YamlValue::Sequence(items) => items.iter().for_each(|v| collect(v, out)),
        YamlValue::Mapping(map) => {
            for (key, v) in map {
                collect(key, out);
                collect(v, out);
            }
        }
        YamlValue::Tagged(tagged) => collect(&tagged.value, out),
    }
}
