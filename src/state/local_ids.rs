use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{read_non_empty, write_json_atomic};
use crate::error::{ConnectorError, Result};

/// Ids known for one source: `{"files": {id: path}}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceIds {
    #[serde(default)]
    pub files: BTreeMap<String, String>,
}

/// Contents of the local id file
///
/// `global_keys` holds every id indexed per source; `delete_keys` is the
/// snapshot taken at the start of the last ingestion cycle, which the
/// deletion sync probes against the share.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalIdRecord {
    #[serde(default)]
    pub global_keys: BTreeMap<String, SourceIds>,
    #[serde(default)]
    pub delete_keys: BTreeMap<String, SourceIds>,
}

impl LocalIdRecord {
    /// Snapshot the current ids as the deletion baseline
    pub fn begin_cycle(&mut self) {
        self.delete_keys = self.global_keys.clone();
    }

    /// Add ids discovered this cycle; previously known ids are kept
    pub fn merge_discovered(&mut self, source: &str, discovered: BTreeMap<String, String>) {
        self.global_keys
            .entry(source.to_string())
            .or_default()
            .files
            .extend(discovered);
    }

    /// Drop ids confirmed deleted from the index
    pub fn remove_ids(&mut self, source: &str, ids: &[String]) {
        if let Some(known) = self.global_keys.get_mut(source) {
            for id in ids {
                known.files.remove(id);
            }
        }
    }

    pub fn clear_delete_keys(&mut self) {
        self.delete_keys.clear();
    }

    /// Pre-cycle snapshot for `source`
    pub fn pending_deletions(&self, source: &str) -> BTreeMap<String, String> {
        self.delete_keys
            .get(source)
            .map(|s| s.files.clone())
            .unwrap_or_default()
    }

    pub fn known_ids(&self, source: &str) -> Option<&BTreeMap<String, String>> {
        self.global_keys.get(source).map(|s| &s.files)
    }
}

/// Local id file
pub struct LocalIdStore {
    path: PathBuf,
}

impl LocalIdStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the record.
    ///
    /// A missing or empty file is [`ConnectorError::StateNotFound`] (first
    /// run); a file that cannot be parsed is
    /// [`ConnectorError::StateCorrupted`].
    pub fn load_storage(&self) -> Result<LocalIdRecord> {
        let content = read_non_empty(&self.path)?
            .ok_or_else(|| ConnectorError::StateNotFound(self.path.display().to_string()))?;
        serde_json::from_str(&content).map_err(|e| ConnectorError::StateCorrupted {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Load the record, starting from an empty one on first run
    pub fn load_or_default(&self) -> Result<LocalIdRecord> {
        match self.load_storage() {
            Ok(record) => Ok(record),
            Err(ConnectorError::StateNotFound(path)) => {
                log::info!("No local id store at {}, starting fresh", path);
                Ok(LocalIdRecord::default())
            }
            Err(e) => Err(e),
        }
    }

    /// Overwrite the stored record
    pub fn update_storage(&self, record: &LocalIdRecord) -> Result<()> {
        write_json_atomic(&self.path, record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn ids(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_missing_and_corrupted_are_distinct() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalIdStore::new(temp_dir.path().join("doc_id.json"));
        assert!(matches!(store.load_storage(), Err(ConnectorError::StateNotFound(_))));
        assert_eq!(store.load_or_default().unwrap(), LocalIdRecord::default());

        fs::write(store.path(), "").unwrap();
        assert!(matches!(store.load_storage(), Err(ConnectorError::StateNotFound(_))));

        fs::write(store.path(), "{\"global_keys\": [").unwrap();
        assert!(matches!(
            store.load_storage(),
            Err(ConnectorError::StateCorrupted { .. })
        ));
        assert!(store.load_or_default().is_err());
    }

    #[test]
    fn test_load_then_update_is_byte_stable() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalIdStore::new(temp_dir.path().join("doc_id.json"));
        let mut record = LocalIdRecord::default();
        record.merge_discovered("drive", ids(&[("2", "root/b.txt"), ("1", "root/a.txt")]));
        record.begin_cycle();
        store.update_storage(&record).unwrap();
        let before = fs::read(store.path()).unwrap();

        let loaded = store.load_storage().unwrap();
        assert_eq!(loaded, record);
        store.update_storage(&loaded).unwrap();
        assert_eq!(fs::read(store.path()).unwrap(), before);
    }

    #[test]
    fn test_file_shape() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalIdStore::new(temp_dir.path().join("doc_id.json"));
        let mut record = LocalIdRecord::default();
        record.merge_discovered("drive", ids(&[("1", "root/file.txt")]));
        store.update_storage(&record).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(value["global_keys"]["drive"]["files"]["1"], "root/file.txt");
        assert!(value["delete_keys"].as_object().unwrap().is_empty());
    }

    #[test]
    fn test_cycle_operations() {
        let mut record = LocalIdRecord::default();
        record.merge_discovered("drive", ids(&[("1", "a"), ("2", "b")]));
        record.begin_cycle();
        assert_eq!(record.pending_deletions("drive").len(), 2);

        // accretive: untouched ids survive, new ids are added
        record.merge_discovered("drive", ids(&[("3", "c")]));
        assert_eq!(record.known_ids("drive").unwrap().len(), 3);
        // snapshot is independent of later merges
        assert_eq!(record.pending_deletions("drive").len(), 2);

        record.remove_ids("drive", &["1".to_string(), "missing".to_string()]);
        assert_eq!(
            record.known_ids("drive").unwrap().keys().collect::<Vec<_>>(),
            vec!["2", "3"]
        );

        record.clear_delete_keys();
        assert!(record.pending_deletions("drive").is_empty());
    }
}
