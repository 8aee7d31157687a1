use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use super::{read_non_empty, write_json_atomic};
use crate::config::Config;
use crate::error::{ConnectorError, Result};
use crate::ingest::{format_time, parse_time, IndexingType, TimeWindow, DATETIME_FORMAT};

/// Per-source high-water marks, stored as `{source: "YYYY-MM-DDTHH:MM:SSZ"}`
pub struct CheckpointStore {
    path: PathBuf,
    default_start: DateTime<Utc>,
    default_end: Option<DateTime<Utc>>,
}

impl CheckpointStore {
    /// # Arguments
    ///
    /// * `path` - Checkpoint file
    /// * `default_start` - Window start when no checkpoint is recorded
    /// * `default_end` - Window end when no checkpoint is recorded; `now` if `None`
    pub fn new<P: AsRef<Path>>(
        path: P,
        default_start: DateTime<Utc>,
        default_end: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            default_start,
            default_end,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.checkpoint_path, config.start_time, config.end_time)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Window to sync for `source`.
    ///
    /// With a recorded checkpoint the window is `(checkpoint, now]`;
    /// otherwise the configured defaults apply. A checkpoint at or after `now`
    /// yields an empty window. An unreadable checkpoint file is logged and
    /// treated as absent, but a malformed entry for `source` is an error: the
    /// entry must be fixed or removed before syncing again.
    pub fn get_checkpoint(&self, now: DateTime<Utc>, source: &str) -> Result<TimeWindow> {
        let default_window = || TimeWindow::clamped(self.default_start, self.default_end.unwrap_or(now));

        let checkpoints = match self.read_checkpoints() {
            Some(checkpoints) => checkpoints,
            None => {
                log::debug!(
                    "No usable checkpoint file at {}, using configured start_time and end_time",
                    self.path.display()
                );
                return Ok(default_window());
            }
        };

        let value = match checkpoints.get(source) {
            Some(serde_json::Value::String(s)) if !s.is_empty() => s.clone(),
            Some(serde_json::Value::Null) | None => {
                log::debug!(
                    "Checkpoint file has no entry for {}, using configured start_time and end_time",
                    source
                );
                return Ok(default_window());
            }
            Some(other) => other.to_string(),
        };

        let start_time = parse_time(&value).ok_or_else(|| ConnectorError::CheckpointFormat {
            source_name: source.to_string(),
            value: value.clone(),
            expected: DATETIME_FORMAT,
        })?;

        let window = TimeWindow::clamped(start_time, now);
        log::debug!("Checkpoint window for {}: {}", source, window);
        Ok(window)
    }

    /// Record `time` as the checkpoint for `source`, keeping other sources.
    pub fn set_checkpoint(
        &self,
        time: DateTime<Utc>,
        indexing_type: IndexingType,
        source: &str,
    ) -> Result<()> {
        let mut checkpoints = self.read_checkpoints().unwrap_or_default();
        checkpoints.insert(
            source.to_string(),
            serde_json::Value::String(format_time(&time)),
        );
        write_json_atomic(&self.path, &checkpoints)?;
        log::info!(
            "Saved {} sync checkpoint {} for {}",
            indexing_type,
            format_time(&time),
            source
        );
        Ok(())
    }

    /// Parsed checkpoint file, or `None` when missing, empty or unparsable
    fn read_checkpoints(&self) -> Option<BTreeMap<String, serde_json::Value>> {
        let content = match read_non_empty(&self.path) {
            Ok(content) => content?,
            Err(e) => {
                log::error!("Unable to read checkpoint file {}: {}", self.path.display(), e);
                return None;
            }
        };
        match serde_json::from_str(&content) {
            Ok(checkpoints) => Some(checkpoints),
            Err(e) => {
                log::error!(
                    "Error while parsing the checkpoint file {}: {}",
                    self.path.display(),
                    e
                );
                None
            }
        }
    }
}
