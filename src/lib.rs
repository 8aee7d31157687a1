pub mod commands;
pub mod config;
pub mod error;
pub mod index;
pub mod ingest;
pub mod mapping;
pub mod share;
pub mod state;
pub mod sync;

pub use commands::{Connector, CycleSummary};
pub use config::Config;
pub use error::{ConnectorError, Result};
