use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Config;
use crate::error::{ConnectorError, Result};
use crate::index::IndexClient;
use crate::mapping::{is_non_empty_file, UserMapping};

/// Outcome of one permission sync
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionSummary {
    pub removed_users: usize,
    pub added_users: usize,
    pub failed_users: usize,
}

/// Replaces the index's user permissions with the SID mapping table
pub struct PermissionSync {
    client: Arc<dyn IndexClient>,
    source_id: String,
    enable_document_permission: bool,
    user_mapping: Option<PathBuf>,
}

impl PermissionSync {
    pub fn new(
        client: Arc<dyn IndexClient>,
        source_id: &str,
        enable_document_permission: bool,
        user_mapping: Option<PathBuf>,
    ) -> Self {
        Self {
            client,
            source_id: source_id.to_string(),
            enable_document_permission,
            user_mapping,
        }
    }

    pub fn from_config(client: Arc<dyn IndexClient>, config: &Config) -> Self {
        Self::new(
            client,
            &config.enterprise_search.source_id,
            config.enable_document_permission,
            config.user_mapping_path().map(|p| p.to_path_buf()),
        )
    }

    /// Remove every grant the index holds, then add one grant set per mapped
    /// user.
    ///
    /// Preconditions are checked before anything is removed: permissions must
    /// be enabled and the mapping file must exist with at least one row.
    pub async fn sync_permissions(&self) -> Result<PermissionSummary> {
        if !self.enable_document_permission {
            log::warn!("Permission sync is disabled; enable_document_permission is false");
            return Err(ConnectorError::PermissionSyncDisabled);
        }
        let mapping = self.load_mapping()?;

        let mut summary = PermissionSummary::default();
        let existing = self.client.list_permissions(&self.source_id).await?;
        for entry in existing.results {
            if entry.permissions.is_empty() {
                continue;
            }
            match self
                .client
                .remove_user_permissions(&self.source_id, &entry.user, &entry.permissions)
                .await
            {
                Ok(()) => summary.removed_users += 1,
                Err(e) => {
                    log::error!("Error while removing permissions of user {}: {}", entry.user, e);
                    summary.failed_users += 1;
                }
            }
        }

        for (user, sids) in mapping.invert() {
            match self
                .client
                .add_user_permissions(&self.source_id, &user, &sids)
                .await
            {
                Ok(()) => summary.added_users += 1,
                Err(e) => {
                    log::error!("Error while adding permissions for user {}: {}", user, e);
                    summary.failed_users += 1;
                }
            }
        }

        log::info!(
            "Permission sync finished: {} users cleared, {} users granted, {} failures",
            summary.removed_users,
            summary.added_users,
            summary.failed_users
        );
        Ok(summary)
    }

    fn load_mapping(&self) -> Result<UserMapping> {
        let path = self.user_mapping.as_deref().ok_or_else(|| {
            ConnectorError::EmptyMapping("network_drive_enterprise_search.user_mapping is not set".to_string())
        })?;
        if !is_non_empty_file(path) {
            return Err(ConnectorError::EmptyMapping(path.display().to_string()));
        }
        UserMapping::try_from(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::fake::FakeIndex;
    use std::fs;
    use std::sync::atomic::Ordering;
    use tempfile::TempDir;

    fn seeded_index() -> Arc<FakeIndex> {
        let index = Arc::new(FakeIndex::default());
        index
            .permissions
            .lock()
            .unwrap()
            .insert("old-user".to_string(), vec!["S-OLD".to_string()]);
        index
    }

    #[tokio::test]
    async fn test_disabled_fails_before_removal() {
        let index = seeded_index();
        let sync = PermissionSync::new(index.clone(), "source", false, None);
        let err = sync.sync_permissions().await.unwrap_err();
        assert!(matches!(err, ConnectorError::PermissionSyncDisabled));
        assert_eq!(index.remove_calls.load(Ordering::SeqCst), 0);
        assert!(index.permissions.lock().unwrap().contains_key("old-user"));
    }

    #[tokio::test]
    async fn test_missing_or_empty_mapping_fails_before_removal() {
        let temp_dir = TempDir::new().unwrap();
        let empty = temp_dir.path().join("empty.csv");
        fs::write(&empty, "").unwrap();
        let comments_only = temp_dir.path().join("comments.csv");
        fs::write(&comments_only, "# sid,user\n").unwrap();
        let index = seeded_index();

        for mapping in [
            None,
            Some(temp_dir.path().join("missing.csv")),
            Some(empty),
            Some(comments_only),
        ] {
            let sync = PermissionSync::new(index.clone(), "source", true, mapping);
            let err = sync.sync_permissions().await.unwrap_err();
            assert!(matches!(err, ConnectorError::EmptyMapping(_)));
        }
        assert_eq!(index.remove_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_replaces_grants_from_mapping() {
        let temp_dir = TempDir::new().unwrap();
        let mapping = temp_dir.path().join("mapping.csv");
        fs::write(&mapping, "S-1,alice\nS-2,bob\nS-3,alice\n").unwrap();
        let index = seeded_index();

        let summary = PermissionSync::new(index.clone(), "source", true, Some(mapping))
            .sync_permissions()
            .await
            .unwrap();
        assert_eq!(
            summary,
            PermissionSummary {
                removed_users: 1,
                added_users: 2,
                failed_users: 0
            }
        );

        let permissions = index.permissions.lock().unwrap();
        assert!(!permissions.contains_key("old-user"));
        assert_eq!(permissions["alice"], vec!["S-1".to_string(), "S-3".to_string()]);
        assert_eq!(permissions["bob"], vec!["S-2".to_string()]);
    }

    #[tokio::test]
    async fn test_per_user_failure_is_counted() {
        let temp_dir = TempDir::new().unwrap();
        let mapping = temp_dir.path().join("mapping.csv");
        fs::write(&mapping, "S-1,alice\nS-2,bob\n").unwrap();
        let index = seeded_index();
        index.fail_users.lock().unwrap().insert("bob".to_string());

        let summary = PermissionSync::new(index.clone(), "source", true, Some(mapping))
            .sync_permissions()
            .await
            .unwrap();
        assert_eq!(summary.added_users, 1);
        assert_eq!(summary.failed_users, 1);
        assert!(index.permissions.lock().unwrap().contains_key("alice"));
    }

    #[tokio::test]
    async fn test_listing_failure_is_returned() {
        let temp_dir = TempDir::new().unwrap();
        let mapping = temp_dir.path().join("mapping.csv");
        fs::write(&mapping, "S-1,alice\n").unwrap();
        let index = seeded_index();
        index.fail_list_permissions.store(true, Ordering::SeqCst);

        let err = PermissionSync::new(index.clone(), "source", true, Some(mapping))
            .sync_permissions()
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectorError::Index(_)));
        assert!(!index.permissions.lock().unwrap().contains_key("alice"));
    }
}
