//! Command entry points: one method per CLI subcommand.
//!
//! A [`Connector`] owns the configuration and the two external clients. Every
//! command is a single cycle; state files are written only after the cycle
//! finished without a fatal error.

use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::error::{ConnectorError, Result};
use crate::index::{ContentSource, IndexClient};
use crate::ingest::{current_time, Document, FileDetails, Files, IndexingType, TimeWindow};
use crate::share::{connect_with_retry, ShareClient};
use crate::state::{CheckpointStore, LocalIdStore};
use crate::sync::{
    DeletionReconciler, IndexSummary, IndexSync, PermissionSummary, PermissionSync,
    SyncNetworkDrives, WorkQueue,
};

const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(1);
const CONNECTIVITY_PROBE_ID: &str = "netdrive-connectivity-probe";

/// Result of a full or incremental sync
#[derive(Debug, Clone, PartialEq)]
pub struct CycleSummary {
    pub window: TimeWindow,
    pub discovered: usize,
    pub indexed: usize,
    pub failed: usize,
}

pub struct Connector {
    config: Config,
    share: Arc<dyn ShareClient>,
    index: Arc<dyn IndexClient>,
}

impl Connector {
    pub fn new(config: Config, share: Arc<dyn ShareClient>, index: Arc<dyn IndexClient>) -> Self {
        Self {
            config,
            share,
            index,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Index every file changed between the configured `start_time` and now.
    ///
    /// The checkpoint is ignored; `end_time` only bounds the first
    /// incremental sync when no checkpoint exists.
    pub async fn full_sync(&self) -> Result<CycleSummary> {
        self.run_ingestion(IndexingType::Full).await
    }

    /// Index files changed since the last recorded checkpoint
    pub async fn incremental_sync(&self) -> Result<CycleSummary> {
        self.run_ingestion(IndexingType::Incremental).await
    }

    async fn run_ingestion(&self, indexing_type: IndexingType) -> Result<CycleSummary> {
        let config = &self.config;
        let source = config.source_name().to_string();
        let now = current_time();

        let checkpoints = CheckpointStore::from_config(config);
        let window = match indexing_type {
            IndexingType::Full => TimeWindow::clamped(config.start_time, now),
            IndexingType::Incremental => checkpoints.get_checkpoint(now, &source)?,
        };
        let rules = config.indexing_rules()?;

        let id_store = LocalIdStore::new(&config.ids_path);
        let mut record = id_store.load_or_default()?;
        record.begin_cycle();

        let files = Arc::new(Files::from_config(self.share.clone(), config)?);
        let consumer_count = config.enterprise_search_sync_thread_count;
        let producer = SyncNetworkDrives::new(
            files,
            config.network_drives_sync_thread_count,
            consumer_count,
        );

        log::info!(
            "Starting {} sync of {} for window {}",
            indexing_type,
            source,
            window
        );

        let queue = WorkQueue::new(config.queue_capacity);
        let consumers: Vec<_> = (0..consumer_count)
            .map(|_| {
                let consumer = IndexSync::new(
                    self.index.clone(),
                    &config.enterprise_search.source_id,
                    queue.clone(),
                );
                tokio::spawn(async move { consumer.perform_sync().await })
            })
            .collect();

        let (share, root) = config.drive_path();
        let producer_queue = queue.clone();
        let produced = tokio::task::spawn_blocking(move || {
            producer.perform_sync(&share, &root, &window, &rules, &producer_queue)
        })
        .await;

        let produced = match produced {
            Ok(result) => result,
            Err(e) => {
                // the producer died before signalling; release the consumers
                for _ in 0..consumer_count {
                    queue.put_end_signal().await?;
                }
                Err(join_error(e))
            }
        };

        let mut summary = IndexSummary::default();
        let mut consumer_error = None;
        for handle in consumers {
            match handle.await {
                Ok(Ok(result)) => summary.merge(result),
                Ok(Err(e)) => {
                    consumer_error.get_or_insert(e);
                }
                Err(e) => {
                    consumer_error.get_or_insert(join_error(e));
                }
            }
        }

        let discovered = produced?;
        if let Some(e) = consumer_error {
            log::error!("{} sync of {} failed; no state was saved", indexing_type, source);
            return Err(e);
        }

        let discovered_count = discovered.len();
        record.merge_discovered(&source, discovered);
        id_store.update_storage(&record)?;

        for (key, time, kind) in &summary.checkpoints {
            checkpoints.set_checkpoint(*time, *kind, key)?;
        }
        checkpoints.set_checkpoint(
            indexing_type.checkpoint_time(now, &window),
            indexing_type,
            &source,
        )?;

        log::info!(
            "Completed {} sync of {}: {} documents discovered, {} indexed, {} failed",
            indexing_type,
            source,
            discovered_count,
            summary.indexed,
            summary.failed
        );
        Ok(CycleSummary {
            window,
            discovered: discovered_count,
            indexed: summary.indexed,
            failed: summary.failed,
        })
    }

    /// Remove from the index every file indexed before the last ingestion
    /// cycle that no longer exists on the share. Returns the number of
    /// documents deleted.
    pub async fn deletion_sync(&self) -> Result<usize> {
        let config = &self.config;
        let source = config.source_name().to_string();
        let id_store = LocalIdStore::new(&config.ids_path);

        let mut record = match id_store.load_storage() {
            Ok(record) => record,
            Err(ConnectorError::StateNotFound(path)) => {
                log::info!("No local id store at {}; nothing to delete", path);
                return Ok(0);
            }
            Err(e) => return Err(e),
        };

        let pre_cycle = record.pending_deletions(&source);
        if pre_cycle.is_empty() {
            log::info!("No previously indexed files recorded for {}", source);
            return Ok(0);
        }

        let reconciler = DeletionReconciler::new(self.index.clone(), &config.enterprise_search.source_id);
        let probe = reconciler.clone();
        let client = self.share.clone();
        let retry_count = config.retry_count;
        let (share, _) = config.drive_path();
        let deleted = tokio::task::spawn_blocking(move || -> Result<Vec<String>> {
            let mut conn = connect_with_retry(client.as_ref(), retry_count, CONNECT_RETRY_DELAY)?;
            let deleted = probe.get_deleted_files(conn.as_ref(), &share, &pre_cycle);
            conn.close();
            Ok(deleted)
        })
        .await
        .map_err(join_error)??;

        let removed = reconciler
            .sync_deleted_files(deleted, &mut record, &source)
            .await;
        record.clear_delete_keys();
        id_store.update_storage(&record)?;

        log::info!("Deleted {} documents of {} from the index", removed.len(), source);
        Ok(removed.len())
    }

    /// Replace the index's user permissions with the configured mapping
    pub async fn permission_sync(&self) -> Result<PermissionSummary> {
        PermissionSync::from_config(self.index.clone(), &self.config)
            .sync_permissions()
            .await
    }

    /// Create a custom content source named `name`
    pub async fn bootstrap(&self, name: &str) -> Result<ContentSource> {
        let source = self.index.create_content_source(name).await?;
        log::info!(
            "Created ContentSource with ID {}. You may now begin indexing with source_id = {}",
            source.id,
            source.id
        );
        Ok(source)
    }

    /// Check that the share can be listed and that the index accepts writes.
    ///
    /// Indexes one probe document and deletes it again.
    pub async fn test_connectivity(&self) -> Result<()> {
        let config = &self.config;
        let client = self.share.clone();
        let retry_count = config.retry_count;
        let (share, root) = config.drive_path();
        let listed = tokio::task::spawn_blocking(move || -> Result<usize> {
            let mut conn = connect_with_retry(client.as_ref(), retry_count, CONNECT_RETRY_DELAY)?;
            let entries = conn.list_path(&share, &root);
            conn.close();
            Ok(entries?.len())
        })
        .await
        .map_err(join_error)??;
        log::info!("Network drive is reachable ({} entries at the configured path)", listed);

        let source_id = &config.enterprise_search.source_id;
        let probe = connectivity_probe(config);
        let response = self
            .index
            .index_documents(source_id, std::slice::from_ref(&probe))
            .await?;
        if let Some(errors) = response.results.iter().find(|r| !r.errors.is_empty()) {
            return Err(ConnectorError::Index(format!(
                "probe document rejected: {}",
                errors.errors.join(", ")
            )));
        }
        self.index
            .delete_documents(source_id, &[probe.id])
            .await?;
        log::info!("Enterprise Search accepted and deleted the probe document");
        Ok(())
    }
}

fn connectivity_probe(config: &Config) -> Document {
    let now = current_time();
    let mut probe = Document::from_details(
        CONNECTIVITY_PROBE_ID.to_string(),
        &FileDetails {
            file_id: None,
            file_name: "connectivity-probe.txt".to_string(),
            file_path: "connectivity-probe.txt".to_string(),
            web_path: format!("file://{}/connectivity-probe.txt", config.network_drive.server_ip),
            file_type: ".txt".to_string(),
            file_size: 0,
            created_at: now,
            updated_at: now,
        },
    );
    probe.body = "connectivity test".to_string();
    probe
}

fn join_error(e: tokio::task::JoinError) -> ConnectorError {
    ConnectorError::Worker(e.to_string())
}
