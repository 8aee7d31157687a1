use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};

use crate::ingest::{parse_time, FilterPatterns, IndexingRules, DATETIME_FORMAT};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Lower bound of the window used by full syncs and by incremental syncs
    /// without a checkpoint
    #[serde(default = "default_start_time", deserialize_with = "deserialize_time")]
    pub start_time: DateTime<Utc>,
    /// Upper bound of the default window; the current time when unset
    #[serde(default, deserialize_with = "deserialize_optional_time")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_thread_count")]
    pub network_drives_sync_thread_count: usize,
    #[serde(default = "default_thread_count")]
    pub enterprise_search_sync_thread_count: usize,
    /// Maximum number of document batches buffered between producers and consumers
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_enable_document_permission")]
    pub enable_document_permission: bool,
    #[serde(default = "default_checkpoint_path")]
    pub checkpoint_path: PathBuf,
    #[serde(default = "default_ids_path")]
    pub ids_path: PathBuf,
    pub network_drive: NetworkDriveConfig,
    pub enterprise_search: EnterpriseSearchConfig,
    #[serde(default)]
    pub network_drive_enterprise_search: MappingConfig,
    #[serde(default)]
    pub include: FilterPatterns,
    #[serde(default)]
    pub exclude: FilterPatterns,
}

/// Network drive connection settings
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkDriveConfig {
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub username: String,
    /// `{share}/{folder}`; the first segment names the share
    pub path: String,
    pub server_name: String,
    pub server_ip: String,
    /// Local directory where the server's shares are mounted
    pub mount_root: PathBuf,
}

/// Enterprise Search settings
#[derive(Debug, Clone, Deserialize)]
pub struct EnterpriseSearchConfig {
    pub host_url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    pub source_id: String,
}

/// SID to user mapping settings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MappingConfig {
    /// Two-column CSV file: `share_sid,index_user`
    #[serde(default)]
    pub user_mapping: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_start_time() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

fn default_retry_count() -> u32 {
    3
}

fn default_thread_count() -> usize {
    5
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_enable_document_permission() -> bool {
    true
}

fn default_checkpoint_path() -> PathBuf {
    PathBuf::from("checkpoint.json")
}

fn default_ids_path() -> PathBuf {
    PathBuf::from("doc_id.json")
}

fn default_api_key_env() -> String {
    "ENTERPRISE_SEARCH_API_KEY".to_string()
}

fn deserialize_time<'de, D>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    parse_time(&value).ok_or_else(|| {
        serde::de::Error::custom(format!(
            "invalid timestamp {:?}, expected format {}",
            value, DATETIME_FORMAT
        ))
    })
}

fn deserialize_optional_time<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    deserialize_time(deserializer).map(Some)
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in NETDRIVE_CONFIG environment variable
    /// 2. ./config.toml in current directory
    pub fn load() -> Result<Self> {
        let _ = dotenv::dotenv();

        let config_path = std::env::var("NETDRIVE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));

        Self::load_from(&config_path)
    }

    /// Load and validate configuration from an explicit path
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let _ = dotenv::dotenv();

        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: Config = toml::from_str(&config_str)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("network_drive.path", &self.network_drive.path),
            ("network_drive.server_name", &self.network_drive.server_name),
            ("network_drive.server_ip", &self.network_drive.server_ip),
            ("enterprise_search.host_url", &self.enterprise_search.host_url),
            ("enterprise_search.source_id", &self.enterprise_search.source_id),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                anyhow::bail!("{} must not be empty", key);
            }
        }

        if self.retry_count == 0 {
            anyhow::bail!("retry_count must be greater than 0");
        }

        if self.network_drives_sync_thread_count == 0 {
            anyhow::bail!("network_drives_sync_thread_count must be greater than 0");
        }

        if self.enterprise_search_sync_thread_count == 0 {
            anyhow::bail!("enterprise_search_sync_thread_count must be greater than 0");
        }

        if self.queue_capacity == 0 {
            anyhow::bail!("queue_capacity must be greater than 0");
        }

        if let Some(end_time) = self.end_time {
            if self.start_time >= end_time {
                anyhow::bail!("start_time must be before end_time");
            }
        }

        self.indexing_rules()
            .context("Invalid include/exclude rules")?;

        Ok(())
    }

    /// Compile the include/exclude rules
    pub fn indexing_rules(&self) -> crate::error::Result<IndexingRules> {
        IndexingRules::new(&self.include, &self.exclude)
    }

    /// Share name and share-relative folder from `network_drive.path`
    pub fn drive_path(&self) -> (String, String) {
        let normalized = crate::share::normalize_path(&self.network_drive.path);
        match normalized.split_once('/') {
            Some((share, rest)) => (share.to_string(), rest.to_string()),
            None => (normalized, String::new()),
        }
    }

    /// Name under which checkpoints and local ids are recorded
    pub fn source_name(&self) -> &str {
        &self.network_drive.server_name
    }

    pub fn user_mapping_path(&self) -> Option<&Path> {
        self.network_drive_enterprise_search.user_mapping.as_deref()
    }

    /// Read the Enterprise Search API key from the configured environment variable
    pub fn api_key(&self) -> Result<String> {
        std::env::var(&self.enterprise_search.api_key_env).with_context(|| {
            format!(
                "Environment variable {} not set. Set it in your .env file or as an environment variable with your Enterprise Search API key.",
                self.enterprise_search.api_key_env
            )
        })
    }
}
