//! Remote share client interface.
//!
//! The connector never speaks the file-share wire protocol itself. It consumes
//! a [`ShareClient`] that hands out blocking [`ShareConnection`]s; every call on
//! a connection is a potentially slow network call and must run on a worker
//! thread, never on the async executor.

pub mod mounted;

pub use mounted::MountedShareClient;

use std::io::Write;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// NT status: STATUS_NO_SUCH_FILE
pub const STATUS_NO_SUCH_FILE: u32 = 0xC000_000F;
/// NT status: STATUS_NO_SUCH_DEVICE
pub const STATUS_NO_SUCH_DEVICE: u32 = 0xC000_000E;
/// NT status: STATUS_OBJECT_NAME_NOT_FOUND
pub const STATUS_OBJECT_NAME_NOT_FOUND: u32 = 0xC000_0034;
/// NT status: STATUS_OBJECT_PATH_NOT_FOUND
pub const STATUS_OBJECT_PATH_NOT_FOUND: u32 = 0xC000_003A;

/// Errors raised by share connections.
///
/// The deletion reconciler relies on the distinction between
/// [`ShareError::NoSuchFile`] (the target itself is gone) and
/// [`ShareError::PathNotFound`] (an ancestor segment is gone).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShareError {
    #[error("no such file or directory: {0}")]
    NoSuchFile(String),

    #[error("path not found: {0}")]
    PathNotFound(String),

    /// Transient transport failure; retried by [`connect_with_retry`]
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("{0}")]
    Other(String),
}

impl ShareError {
    /// Map an NT status code returned by an SMB server for `path`.
    pub fn from_nt_status(status: u32, path: &str) -> Self {
        match status {
            STATUS_NO_SUCH_FILE | STATUS_NO_SUCH_DEVICE | STATUS_OBJECT_NAME_NOT_FOUND => {
                ShareError::NoSuchFile(path.to_string())
            }
            STATUS_OBJECT_PATH_NOT_FOUND => ShareError::PathNotFound(path.to_string()),
            other => ShareError::Other(format!("{}: NT status {:#010x}", path, other)),
        }
    }
}

pub type ShareResult<T> = std::result::Result<T, ShareError>;

/// One entry returned by a directory listing
#[derive(Debug, Clone, PartialEq)]
pub struct ShareEntry {
    pub filename: String,
    pub is_directory: bool,
    /// Native file id; `None` (or zero) when the server does not expose one
    pub file_id: Option<u64>,
    pub file_size: u64,
    pub create_time: DateTime<Utc>,
    pub last_attr_change_time: DateTime<Utc>,
}

/// Access control entry of a file's DACL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ace {
    pub sid: String,
    pub ace_type: u8,
    pub mask: u32,
}

/// Security descriptor of a file. `dacl` is `None` when the file has no DACL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecurityDescriptor {
    pub dacl: Option<Vec<Ace>>,
}

/// An open connection to the file server.
pub trait ShareConnection: Send {
    /// List the entries of `path` inside `share`. May include `.` and `..`.
    fn list_path(&self, share: &str, path: &str) -> ShareResult<Vec<ShareEntry>>;

    /// Read the security descriptor of `path`.
    fn get_security(&self, share: &str, path: &str) -> ShareResult<SecurityDescriptor>;

    /// Stream the raw bytes of `path` into `sink`, returning the byte count.
    fn retrieve_file(&self, share: &str, path: &str, sink: &mut dyn Write) -> ShareResult<u64>;

    fn close(&mut self) {}
}

/// Factory for share connections.
pub trait ShareClient: Send + Sync {
    fn connect(&self) -> ShareResult<Box<dyn ShareConnection>>;
}

/// Connect, retrying transient [`ShareError::Connection`] failures with
/// exponential backoff (`base_delay * 2^attempt`).
///
/// Non-transient errors and exhausted retries surface as
/// [`ConnectorError::Connection`](crate::error::ConnectorError::Connection).
pub fn connect_with_retry(
    client: &dyn ShareClient,
    retry_count: u32,
    base_delay: Duration,
) -> crate::error::Result<Box<dyn ShareConnection>> {
    let attempts = retry_count.max(1);
    let mut delay = base_delay;
    let mut attempt = 1;

    loop {
        match client.connect() {
            Ok(conn) => return Ok(conn),
            Err(ShareError::Connection(msg)) if attempt < attempts => {
                log::warn!(
                    "Error while connecting to the network drive. Retry {}/{}: {}",
                    attempt,
                    attempts,
                    msg
                );
                std::thread::sleep(delay);
                delay *= 2;
                attempt += 1;
            }
            Err(e) => {
                return Err(crate::error::ConnectorError::Connection(format!(
                    "unable to connect to the network drive after {} attempt(s): {}",
                    attempt, e
                )))
            }
        }
    }
}

/// Join a share-relative folder path and an entry name with `/`.
pub fn join_path(folder: &str, name: &str) -> String {
    let folder = folder.trim_end_matches('/');
    if folder.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", folder, name)
    }
}

/// Split a share-relative path into (parent folder, file name).
pub fn split_path(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(idx) => (&path[..idx], &path[idx + 1..]),
        None => ("", path),
    }
}

/// Normalize separators to `/` and strip leading/trailing slashes.
pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/").trim_matches('/').to_string()
}


#[cfg(test)]
mod tests {
    use super::fake::FakeShare;
    use super::*;
    use std::sync::atomic::Ordering;

    #[test]
    fn test_from_nt_status() {
        assert_eq!(
            ShareError::from_nt_status(STATUS_OBJECT_NAME_NOT_FOUND, "a"),
            ShareError::NoSuchFile("a".to_string())
        );
        assert_eq!(
            ShareError::from_nt_status(STATUS_NO_SUCH_DEVICE, "a"),
            ShareError::NoSuchFile("a".to_string())
        );
        assert_eq!(
            ShareError::from_nt_status(STATUS_OBJECT_PATH_NOT_FOUND, "a/b"),
            ShareError::PathNotFound("a/b".to_string())
        );
        assert!(matches!(
            ShareError::from_nt_status(0xC000_0022, "a"),
            ShareError::Other(_)
        ));
    }

    #[test]
    fn test_connect_with_retry_recovers() {
        let share = FakeShare::new();
        share.connect_failures.store(2, Ordering::SeqCst);
        let conn = connect_with_retry(&share, 3, Duration::from_millis(1));
        assert!(conn.is_ok());
        assert_eq!(share.connects.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_connect_with_retry_exhausted() {
        let share = FakeShare::new();
        share.connect_failures.store(5, Ordering::SeqCst);
        let err = connect_with_retry(&share, 2, Duration::from_millis(1)).err().unwrap();
        assert!(matches!(err, crate::error::ConnectorError::Connection(_)));
        assert_eq!(share.connects.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_path_helpers() {
        assert_eq!(join_path("", "a.txt"), "a.txt");
        assert_eq!(join_path("root/sub", "a.txt"), "root/sub/a.txt");
        assert_eq!(split_path("root/sub/a.txt"), ("root/sub", "a.txt"));
        assert_eq!(split_path("a.txt"), ("", "a.txt"));
        assert_eq!(normalize_path("\\root\\sub\\"), "root/sub");
    }
}
