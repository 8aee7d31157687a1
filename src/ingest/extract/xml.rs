use quick_xml::events::Event;
use quick_xml::Reader;

use super::{join_fragments, TextExtractor};
use crate::error::{ConnectorError, Result};

/// XML extractor: collects text and CDATA nodes
pub struct XmlExtractor;

impl TextExtractor for XmlExtractor {
    fn can_extract(&self, extension: &str) -> bool {
        extension == "xml"
    }

    fn extract(&self, content: &str, path: &str) -> Result<String> {
        let mut reader = Reader::from_str(content);
        let mut fragments = Vec::new();
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Text(e)) => {
                    fragments.push(String::from_utf8_lossy(&e).to_string());
                }
                Ok(Event::CData(e)) => {
                    fragments.push(String::from_utf8_lossy(&e).to_string());
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => {
                    return Err(ConnectorError::Extraction(format!(
                        "XML parse error in {}: {}",
                        path, e
                    )));
                }
            }
            buf.clear();
        }

        Ok(join_fragments(fragments))
    }
}
