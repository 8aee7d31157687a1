//! Detect files removed from the share since the last ingestion cycle and
//! delete them from the index.
//!
//! The pre-cycle id map is grouped by folder and each folder is listed at most
//! once. A folder that is gone takes every known folder below it with it; a
//! folder whose ancestor is gone is resolved by walking up one segment at a
//! time until the missing ancestor is found.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use super::queue::{split_into_chunks, BATCH_SIZE};
use crate::index::IndexClient;
use crate::share::{split_path, ShareConnection, ShareError};
use crate::state::LocalIdRecord;

/// `{folder: {file_name: [id]}}`
pub type FolderFiles = BTreeMap<String, BTreeMap<String, Vec<String>>>;

/// Group an `{id: path}` map by parent folder
pub fn group_files_by_folder(files: &BTreeMap<String, String>) -> FolderFiles {
    let mut grouped = FolderFiles::new();
    for (id, path) in files {
        let (folder, name) = split_path(path);
        grouped
            .entry(folder.to_string())
            .or_default()
            .entry(name.to_string())
            .or_default()
            .push(id.clone());
    }
    grouped
}

/// Outcome of probing one folder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Probe {
    /// Folder listed; missing files were collected
    Listed,
    /// Folder (or an ancestor) no longer exists
    Deleted,
    /// Could not decide; nothing is deleted
    Unresolved,
}

/// Bookkeeping for one deletion run
#[derive(Default)]
struct ProbeState {
    visited: HashSet<String>,
    deleted_folders: BTreeSet<String>,
    deleted_ids: Vec<String>,
}

impl ProbeState {
    /// True if `folder` or one of its ancestors was found deleted
    fn is_deleted(&self, folder: &str) -> bool {
        self.deleted_folders
            .iter()
            .any(|d| is_same_or_descendant(folder, d))
    }
}

/// `path == ancestor` or `path` lies below `ancestor`, by whole segments
fn is_same_or_descendant(path: &str, ancestor: &str) -> bool {
    path == ancestor
        || (path.len() > ancestor.len()
            && path.starts_with(ancestor)
            && path.as_bytes()[ancestor.len()] == b'/')
}

#[derive(Clone)]
pub struct DeletionReconciler {
    client: Arc<dyn IndexClient>,
    source_id: String,
}

impl DeletionReconciler {
    pub fn new(client: Arc<dyn IndexClient>, source_id: &str) -> Self {
        Self {
            client,
            source_id: source_id.to_string(),
        }
    }

    /// Ids from `pre_cycle` (`{id: path}`) whose files no longer exist on the share
    pub fn get_deleted_files(
        &self,
        conn: &dyn ShareConnection,
        share: &str,
        pre_cycle: &BTreeMap<String, String>,
    ) -> Vec<String> {
        if pre_cycle.is_empty() {
            log::info!("No files found to be deleted for share {}", share);
            return Vec::new();
        }

        let mut structure = group_files_by_folder(pre_cycle);
        let mut state = ProbeState::default();

        let mut by_path: Vec<(&String, &String)> = pre_cycle.iter().collect();
        by_path.sort_by(|a, b| a.1.cmp(b.1).then_with(|| a.0.cmp(b.0)));

        for (id, path) in by_path {
            let (folder, _) = split_path(path);
            if state.is_deleted(folder) {
                state.deleted_ids.push(id.clone());
                continue;
            }
            if state.visited.contains(folder) {
                continue;
            }
            if probe_folder(conn, share, folder, &mut structure, &mut state) == Probe::Deleted {
                state.deleted_ids.push(id.clone());
            }
        }

        log::info!(
            "Found {} deleted files out of {} known for share {}",
            state.deleted_ids.len(),
            pre_cycle.len(),
            share
        );
        state.deleted_ids
    }

    /// Delete `ids` from the index in chunks of [`BATCH_SIZE`] and drop the ids
    /// of every chunk that succeeded from `record`. Returns the dropped ids.
    pub async fn sync_deleted_files(
        &self,
        ids: Vec<String>,
        record: &mut LocalIdRecord,
        source: &str,
    ) -> Vec<String> {
        let mut removed = Vec::new();
        for chunk in split_into_chunks(ids, BATCH_SIZE) {
            match self.client.delete_documents(&self.source_id, &chunk).await {
                Ok(()) => {
                    record.remove_ids(source, &chunk);
                    removed.extend(chunk);
                }
                Err(e) => {
                    log::error!("Error while deleting {} documents: {}", chunk.len(), e);
                }
            }
        }
        removed
    }
}

/// List `start` and resolve its files, walking up on missing ancestors
fn probe_folder(
    conn: &dyn ShareConnection,
    share: &str,
    start: &str,
    structure: &mut FolderFiles,
    state: &mut ProbeState,
) -> Probe {
    let mut current = start.to_string();

    loop {
        match conn.list_path(share, &current) {
            Ok(entries) if current == start => {
                let remaining = structure.entry(start.to_string()).or_default();
                for entry in entries {
                    remaining.remove(&entry.filename);
                }
                state
                    .deleted_ids
                    .extend(remaining.values().flatten().cloned());
                state.visited.insert(start.to_string());
                return Probe::Listed;
            }
            Ok(_) => {
                log::warn!(
                    "{} reported a missing parent but ancestor {} is present; leaving it unresolved",
                    start,
                    current
                );
                return Probe::Unresolved;
            }
            Err(ShareError::NoSuchFile(_)) => {
                log::info!("{} entire folder is deleted", current);
                let cascaded: Vec<String> = structure
                    .keys()
                    .filter(|f| is_same_or_descendant(f, &current))
                    .cloned()
                    .collect();
                for folder in cascaded {
                    log::debug!("{} removed with its parent {}", folder, current);
                    state.deleted_folders.insert(folder);
                }
                state.deleted_folders.insert(current);
                return Probe::Deleted;
            }
            Err(ShareError::PathNotFound(_)) => {
                let (parent, _) = split_path(&current);
                if parent.is_empty() || parent == current {
                    log::warn!("Unable to resolve a present ancestor for {}", start);
                    return Probe::Unresolved;
                }
                current = parent.to_string();
            }
            Err(e) => {
                log::error!("Error while probing folder {} on share {}: {}", current, share, e);
                return Probe::Unresolved;
            }
        }
    }
}
