use thiserror::Error;

use crate::share::ShareError;

/// Main error type for the network drive connector
#[derive(Error, Debug)]
pub enum ConnectorError {
    /// File system I/O errors (state files, mapping file)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The network drive could not be reached, even after retries
    #[error("Connection error: {0}")]
    Connection(String),

    /// A single call against an open share connection failed
    #[error("Share error: {0}")]
    Share(#[from] ShareError),

    /// Index write client errors (transport, auth, bad response)
    #[error("Index error: {0}")]
    Index(String),

    /// Text extraction failed for one file's content
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// Stored checkpoint value cannot be parsed
    #[error(
        "Checkpoint {value:?} for {source_name} is not in the expected format {expected}. \
         Remove the checkpoint entry for {source_name} or fix the format to continue indexing"
    )]
    CheckpointFormat {
        source_name: String,
        value: String,
        expected: &'static str,
    },

    /// Local id store has never been written
    #[error("Local id store not found: {0}")]
    StateNotFound(String),

    /// Local id store exists but cannot be parsed
    #[error("Local id store is corrupted ({path}): {reason}")]
    StateCorrupted { path: String, reason: String },

    /// Permission sync requested while document permissions are disabled
    #[error("Permission sync is disabled: set enable_document_permission = true")]
    PermissionSyncDisabled,

    /// User mapping file missing or empty
    #[error("User mapping not found or empty: {0}")]
    EmptyMapping(String),

    /// Work queue receiver or sender went away
    #[error("Work queue closed")]
    QueueClosed,

    /// A producer thread or consumer task died without reporting a result
    #[error("Worker failed: {0}")]
    Worker(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Convenient Result type using ConnectorError
pub type Result<T> = std::result::Result<T, ConnectorError>;
