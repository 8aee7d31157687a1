use std::fmt;

use chrono::{DateTime, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ConnectorError, Result};

/// Timestamp format used in checkpoint files and logs
pub const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Window of last-modified times admitted by a sync cycle.
///
/// A file qualifies when `start_time < last_updated <= end_time`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Result<Self> {
        if start_time >= end_time {
            return Err(ConnectorError::InvalidInput(format!(
                "start_time {} must be before end_time {}",
                format_time(&start_time),
                format_time(&end_time)
            )));
        }
        Ok(Self {
            start_time,
            end_time,
        })
    }

    /// Window from `start_time` to `end_time`, or an empty window at
    /// `start_time` when `start_time` is not before `end_time`.
    ///
    /// Happens when a checkpoint was recorded in the current second or lies
    /// ahead of the local clock; the cycle then admits no files.
    pub fn clamped(start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Self {
        if start_time >= end_time {
            log::warn!(
                "start_time {} is not before end_time {}; syncing an empty window",
                format_time(&start_time),
                format_time(&end_time)
            );
            return Self {
                start_time,
                end_time: start_time,
            };
        }
        Self {
            start_time,
            end_time,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.start_time >= self.end_time
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn end_time(&self) -> DateTime<Utc> {
        self.end_time
    }

    pub fn contains(&self, last_updated: DateTime<Utc>) -> bool {
        self.start_time < last_updated && last_updated <= self.end_time
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}]",
            format_time(&self.start_time),
            format_time(&self.end_time)
        )
    }
}

/// Kind of ingestion cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexingType {
    Full,
    Incremental,
}

impl IndexingType {
    /// Time recorded as the checkpoint when a cycle of this type completes:
    /// full syncs record the observed current time, incremental syncs the
    /// window's end.
    pub fn checkpoint_time(&self, now: DateTime<Utc>, window: &TimeWindow) -> DateTime<Utc> {
        match self {
            IndexingType::Full => now,
            IndexingType::Incremental => window.end_time(),
        }
    }
}

impl fmt::Display for IndexingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexingType::Full => write!(f, "full"),
            IndexingType::Incremental => write!(f, "incremental"),
        }
    }
}

pub fn format_time(time: &DateTime<Utc>) -> String {
    time.format(DATETIME_FORMAT).to_string()
}

/// Parse a timestamp in [`DATETIME_FORMAT`].
pub fn parse_time(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, DATETIME_FORMAT)
        .ok()
        .map(|t| t.and_utc())
}

/// Current time truncated to whole seconds, so it round-trips through
/// [`DATETIME_FORMAT`].
pub fn current_time() -> DateTime<Utc> {
    let now = Utc::now();
    now.with_nanosecond(0).unwrap_or(now)
}
