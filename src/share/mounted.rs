//! Share client backed by a locally mounted share.
//!
//! Each share name resolves to `{mount_root}/{share}` on the local filesystem
//! (typically a CIFS mount of the file server). Mounted filesystems do not
//! expose Windows DACLs, so [`ShareConnection::get_security`] returns an empty
//! descriptor.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};

use super::{SecurityDescriptor, ShareClient, ShareConnection, ShareEntry, ShareError, ShareResult};

/// Share client that reads from a mount point
#[derive(Debug, Clone)]
pub struct MountedShareClient {
    mount_root: PathBuf,
}

impl MountedShareClient {
    pub fn new<P: AsRef<Path>>(mount_root: P) -> Self {
        Self {
            mount_root: mount_root.as_ref().to_path_buf(),
        }
    }
}

impl ShareClient for MountedShareClient {
    fn connect(&self) -> ShareResult<Box<dyn ShareConnection>> {
        if !self.mount_root.is_dir() {
            return Err(ShareError::Connection(format!(
                "mount root is not reachable: {}",
                self.mount_root.display()
            )));
        }
        Ok(Box::new(MountedConnection {
            mount_root: self.mount_root.clone(),
        }))
    }
}

struct MountedConnection {
    mount_root: PathBuf,
}

impl MountedConnection {
    fn resolve(&self, share: &str, path: &str) -> PathBuf {
        let mut full = self.mount_root.join(share);
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            full.push(segment);
        }
        full
    }

    /// Classify an I/O error the way an SMB server reports missing objects:
    /// a missing leaf is "no such file", a missing ancestor is "path not found".
    fn map_io_error(&self, full: &Path, path: &str, err: std::io::Error) -> ShareError {
        if err.kind() == ErrorKind::NotFound {
            let parent_exists = full.parent().map(|p| p.is_dir()).unwrap_or(false);
            if parent_exists {
                ShareError::NoSuchFile(path.to_string())
            } else {
                ShareError::PathNotFound(path.to_string())
            }
        } else {
            ShareError::Other(format!("{}: {}", path, err))
        }
    }
}

fn to_utc(time: std::io::Result<SystemTime>) -> DateTime<Utc> {
    time.map(DateTime::<Utc>::from)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

#[cfg(unix)]
fn native_id(metadata: &fs::Metadata) -> Option<u64> {
    use std::os::unix::fs::MetadataExt;
    Some(metadata.ino())
}

#[cfg(not(unix))]
fn native_id(_metadata: &fs::Metadata) -> Option<u64> {
    None
}

impl ShareConnection for MountedConnection {
    fn list_path(&self, share: &str, path: &str) -> ShareResult<Vec<ShareEntry>> {
        let full = self.resolve(share, path);
        let read_dir = fs::read_dir(&full).map_err(|e| self.map_io_error(&full, path, e))?;

        let mut entries = Vec::new();
        for entry in read_dir {
            let entry = entry.map_err(|e| ShareError::Other(format!("{}: {}", path, e)))?;
            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(e) => {
                    log::warn!("Skipping {}: {}", entry.path().display(), e);
                    continue;
                }
            };
            let modified = to_utc(metadata.modified());
            entries.push(ShareEntry {
                filename: entry.file_name().to_string_lossy().to_string(),
                is_directory: metadata.is_dir(),
                file_id: native_id(&metadata),
                file_size: metadata.len(),
                create_time: metadata.created().map(DateTime::<Utc>::from).unwrap_or(modified),
                last_attr_change_time: modified,
            });
        }
        // read_dir order is platform dependent
        entries.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(entries)
    }

    fn get_security(&self, share: &str, path: &str) -> ShareResult<SecurityDescriptor> {
        let full = self.resolve(share, path);
        fs::metadata(&full).map_err(|e| self.map_io_error(&full, path, e))?;
        Ok(SecurityDescriptor::default())
    }

    fn retrieve_file(&self, share: &str, path: &str, sink: &mut dyn Write) -> ShareResult<u64> {
        let full = self.resolve(share, path);
        let mut file = fs::File::open(&full).map_err(|e| self.map_io_error(&full, path, e))?;
        std::io::copy(&mut file, sink).map_err(|e| ShareError::Other(format!("{}: {}", path, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Box<dyn ShareConnection>) {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("share/docs/nested")).unwrap();
        fs::write(root.join("share/docs/a.txt"), "alpha").unwrap();
        fs::write(root.join("share/docs/nested/b.md"), "# beta").unwrap();
        let conn = MountedShareClient::new(root).connect().unwrap();
        (temp_dir, conn)
    }

    #[test]
    fn test_list_path() {
        let (_temp_dir, conn) = setup();
        let entries = conn.list_path("share", "docs").unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.filename.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "nested"]);
        assert!(!entries[0].is_directory);
        assert_eq!(entries[0].file_size, 5);
        assert!(entries[1].is_directory);
    }

    #[test]
    fn test_missing_leaf_vs_missing_ancestor() {
        let (_temp_dir, conn) = setup();
        assert_eq!(
            conn.list_path("share", "docs/gone").unwrap_err(),
            ShareError::NoSuchFile("docs/gone".to_string())
        );
        assert_eq!(
            conn.list_path("share", "docs/gone/deeper").unwrap_err(),
            ShareError::PathNotFound("docs/gone/deeper".to_string())
        );
    }

    #[test]
    fn test_retrieve_file() {
        let (_temp_dir, conn) = setup();
        let mut buf = Vec::new();
        let n = conn.retrieve_file("share", "docs/nested/b.md", &mut buf).unwrap();
        assert_eq!(n, 6);
        assert_eq!(buf, b"# beta");
    }

    #[test]
    fn test_connect_requires_mount_root() {
        let temp_dir = TempDir::new().unwrap();
        let client = MountedShareClient::new(temp_dir.path().join("not-mounted"));
        assert!(matches!(client.connect().err(), Some(ShareError::Connection(_))));
    }
}
