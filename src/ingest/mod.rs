pub mod document;
pub mod extract;
pub mod files;
pub mod rules;
pub mod walker;
pub mod window;

pub use document::{document_id, hash_id, Document, FileDetails, Permissions};
pub use extract::{ExtractorRegistry, TextExtractor};
pub use files::Files;
pub use rules::{FilterPatterns, IndexingRules};
pub use walker::recursive_fetch;
pub use window::{current_time, format_time, parse_time, IndexingType, TimeWindow, DATETIME_FORMAT};
