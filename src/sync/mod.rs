//! Sync pipeline: producers walk the share and queue documents, consumers
//! write them to the index, and the reconcilers handle deletions and
//! permissions.

pub mod consumer;
pub mod deletion;
pub mod permissions;
pub mod producer;
pub mod queue;

pub use consumer::{IndexSummary, IndexSync};
pub use deletion::{group_files_by_folder, DeletionReconciler};
pub use permissions::{PermissionSummary, PermissionSync};
pub use producer::{split_into_buckets, SyncNetworkDrives};
pub use queue::{split_into_chunks, QueueMessage, WorkQueue, BATCH_SIZE};
