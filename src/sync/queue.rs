use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Mutex};

use crate::error::{ConnectorError, Result};
use crate::ingest::{Document, IndexingType};

/// Documents per queued batch and per index write
pub const BATCH_SIZE: usize = 100;

/// Message carried between producers and consumers
#[derive(Debug, Clone)]
pub enum QueueMessage {
    DocumentBatch(Vec<Document>),
    /// One per consumer; tells the receiving consumer to flush and stop
    EndSignal,
    /// Checkpoint request forwarded to the command that owns the cycle
    Checkpoint {
        key: String,
        time: DateTime<Utc>,
        indexing_type: IndexingType,
    },
}

/// Bounded multi-producer, multi-consumer queue.
///
/// Producers on blocking threads use the `blocking_*` methods; async
/// producers and all consumers use the async ones. Every clone shares the
/// same channel.
#[derive(Clone)]
pub struct WorkQueue {
    sender: mpsc::Sender<QueueMessage>,
    receiver: Arc<Mutex<mpsc::Receiver<QueueMessage>>>,
}

impl WorkQueue {
    /// Create a queue holding at most `capacity` messages
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        Self {
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
        }
    }

    /// Enqueue `documents` as batches of [`BATCH_SIZE`], in order
    pub async fn put_batch(&self, documents: Vec<Document>) -> Result<()> {
        for batch in split_into_chunks(documents, BATCH_SIZE) {
            self.send(QueueMessage::DocumentBatch(batch)).await?;
        }
        Ok(())
    }

    pub async fn put_end_signal(&self) -> Result<()> {
        self.send(QueueMessage::EndSignal).await
    }

    pub async fn put_checkpoint(
        &self,
        key: &str,
        time: DateTime<Utc>,
        indexing_type: IndexingType,
    ) -> Result<()> {
        self.send(QueueMessage::Checkpoint {
            key: key.to_string(),
            time,
            indexing_type,
        })
        .await
    }

    /// Blocking variant of [`WorkQueue::put_batch`]; must not be called from
    /// inside an async context.
    pub fn blocking_put_batch(&self, documents: Vec<Document>) -> Result<()> {
        for batch in split_into_chunks(documents, BATCH_SIZE) {
            self.sender
                .blocking_send(QueueMessage::DocumentBatch(batch))
                .map_err(|_| ConnectorError::QueueClosed)?;
        }
        Ok(())
    }

    /// Blocking variant of [`WorkQueue::put_end_signal`]
    pub fn blocking_put_end_signal(&self) -> Result<()> {
        self.sender
            .blocking_send(QueueMessage::EndSignal)
            .map_err(|_| ConnectorError::QueueClosed)
    }

    /// Wait for the next message
    pub async fn get(&self) -> Result<QueueMessage> {
        let mut receiver = self.receiver.lock().await;
        receiver.recv().await.ok_or(ConnectorError::QueueClosed)
    }

    async fn send(&self, message: QueueMessage) -> Result<()> {
        self.sender
            .send(message)
            .await
            .map_err(|_| ConnectorError::QueueClosed)
    }
}

/// Split `items` into consecutive chunks of `size`; only the last chunk may
/// be shorter.
pub fn split_into_chunks<T>(items: Vec<T>, size: usize) -> Vec<Vec<T>> {
    let size = size.max(1);
    let mut chunks = Vec::with_capacity(items.len().div_ceil(size));
    let mut current = Vec::with_capacity(size.min(items.len()));
    for item in items {
        current.push(item);
        if current.len() == size {
            chunks.push(std::mem::replace(&mut current, Vec::with_capacity(size)));
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
