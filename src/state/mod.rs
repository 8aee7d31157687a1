//! Persistent sync state: per-source checkpoints and the ids indexed so far.
//!
//! Both files are JSON, written once at the end of a cycle by replacing the
//! previous file.

pub mod checkpoint;
pub mod local_ids;

pub use checkpoint::CheckpointStore;
pub use local_ids::{LocalIdRecord, LocalIdStore, SourceIds};

use std::fs;
use std::io::Write;
use std::path::Path;

use serde::Serialize;

use crate::error::Result;

/// Serialize `value` as pretty JSON and atomically replace `path` with it
/// (write to a sibling temp file, then rename).
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut body = serde_json::to_vec_pretty(value)?;
    body.push(b'\n');

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = Path::new(&tmp_name);

    {
        let mut file = fs::File::create(tmp_path)?;
        file.write_all(&body)?;
        file.sync_all()?;
    }
    fs::rename(tmp_path, path)?;
    Ok(())
}

/// Read a state file; `None` when it does not exist or is empty.
pub(crate) fn read_non_empty(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) if content.trim().is_empty() => Ok(None),
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}
