pub mod json;
pub mod markdown;
pub mod plaintext;
pub mod xml;
pub mod yaml;

use crate::error::Result;

/// Turns raw file content into indexable body text
pub trait TextExtractor: Send + Sync {
    /// Check if this extractor handles the given extension (lowercase, no dot)
    fn can_extract(&self, extension: &str) -> bool;

    /// Extract searchable text from decoded file content
    fn extract(&self, content: &str, path: &str) -> Result<String>;
}

/// Extractor registry that selects an extractor by file extension
pub struct ExtractorRegistry {
    extractors: Vec<Box<dyn TextExtractor>>,
}

impl ExtractorRegistry {
    /// Create a registry with all built-in extractors
    pub fn new() -> Self {
        let mut registry = Self {
            extractors: Vec::new(),
        };

        registry.register(Box::new(markdown::MarkdownExtractor));
        registry.register(Box::new(xml::XmlExtractor));
        registry.register(Box::new(json::JsonExtractor));
        registry.register(Box::new(yaml::YamlExtractor));

        registry
    }

    pub fn register(&mut self, extractor: Box<dyn TextExtractor>) {
        self.extractors.push(extractor);
    }

    pub fn find_extractor(&self, extension: &str) -> Option<&dyn TextExtractor> {
        self.extractors
            .iter()
            .find(|e| e.can_extract(extension))
            .map(|e| e.as_ref())
    }

    /// Extract body text from raw bytes.
    ///
    /// Content that is not valid UTF-8 is decoded lossily. If the specific
    /// extractor fails (malformed XML, JSON, ...) or none matches the
    /// extension, the decoded text is used as-is.
    pub fn extract(&self, raw: &[u8], path: &str, extension: &str) -> String {
        let content = String::from_utf8_lossy(raw);

        let Some(extractor) = self.find_extractor(extension) else {
            return plaintext::extract(&content);
        };

        match extractor.extract(&content, path) {
            Ok(text) => text,
            Err(e) => {
                log::warn!(
                    "Extractor failed for {} ({}), falling back to plain text: {}",
                    path,
                    extension,
                    e
                );
                plaintext::extract(&content)
            }
        }
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Join extracted fragments with single spaces, dropping blanks
pub(crate) fn join_fragments<I, S>(fragments: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    fragments
        .into_iter()
        .filter_map(|f| {
            let f = f.as_ref().trim();
            (!f.is_empty()).then(|| f.to_string())
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extractor_registry() {
        let registry = ExtractorRegistry::new();

        assert!(registry.find_extractor("xml").is_some());
        assert!(registry.find_extractor("yaml").is_some());
        assert!(registry.find_extractor("yml").is_some());
        assert!(registry.find_extractor("json").is_some());
        assert!(registry.find_extractor("md").is_some());
        assert!(registry.find_extractor("txt").is_none());
    }

    #[test]
    fn test_fallback_to_plaintext() {
        let registry = ExtractorRegistry::new();
        let invalid_json = br#"{"key": "value", invalid}"#;
        let text = registry.extract(invalid_json, "broken.json", "json");
        assert!(text.contains("invalid"));
    }

    #[test]
    fn test_unknown_extension_and_binary() {
        let registry = ExtractorRegistry::new();
        assert_eq!(registry.extract(b"hello\r\nworld", "a.txt", "txt"), "hello\nworld");
        let text = registry.extract(&[0x66, 0x6f, 0xff, 0x6f], "a.bin", "bin");
        assert!(text.starts_with("fo"));
    }

    #[test]
    fn test_join_fragments() {
        assert_eq!(join_fragments(["  a ", "", "b"]), "a b");
    }
}
