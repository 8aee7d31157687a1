use pulldown_cmark::{Event, Parser as CmarkParser, TagEnd};

use super::TextExtractor;
use crate::error::Result;

/// Markdown extractor: keeps text and code, drops markup
pub struct MarkdownExtractor;

impl TextExtractor for MarkdownExtractor {
    fn can_extract(&self, extension: &str) -> bool {
        matches!(extension, "md" | "markdown")
    }

    fn extract(&self, content: &str, _path: &str) -> Result<String> {
        let mut text = String::new();

        for event in CmarkParser::new(content) {
            match event {
                Event::Text(t) | Event::Code(t) => {
                    text.push_str(&t);
                }
                Event::SoftBreak | Event::HardBreak => text.push(' '),
                Event::End(TagEnd::Paragraph)
                | Event::End(TagEnd::Heading(_))
                | Event::End(TagEnd::Item)
                | Event::End(TagEnd::CodeBlock) => text.push('\n'),
                _ => {}
            }
        }

        Ok(text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join("\n"))
    }
}
