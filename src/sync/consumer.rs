use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::queue::{split_into_chunks, QueueMessage, WorkQueue, BATCH_SIZE};
use crate::error::{ConnectorError, Result};
use crate::index::IndexClient;
use crate::ingest::{Document, IndexingType};

/// Counters reported by one consumer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexSummary {
    pub indexed: usize,
    pub failed: usize,
    /// Checkpoint requests received on the queue, in arrival order
    pub checkpoints: Vec<(String, DateTime<Utc>, IndexingType)>,
}

impl IndexSummary {
    pub fn merge(&mut self, other: IndexSummary) {
        self.indexed += other.indexed;
        self.failed += other.failed;
        self.checkpoints.extend(other.checkpoints);
    }
}

/// Drains the work queue into the index
#[derive(Clone)]
pub struct IndexSync {
    client: Arc<dyn IndexClient>,
    source_id: String,
    queue: WorkQueue,
}

impl IndexSync {
    pub fn new(client: Arc<dyn IndexClient>, source_id: &str, queue: WorkQueue) -> Self {
        Self {
            client,
            source_id: source_id.to_string(),
            queue,
        }
    }

    /// Consume messages until this consumer's end signal.
    ///
    /// Batches are buffered until [`BATCH_SIZE`] documents are pending or the
    /// end signal arrives. A transport error from the index stops indexing;
    /// the consumer still drains and discards messages up to its end signal
    /// so producers are never left blocked, then returns the error.
    pub async fn perform_sync(&self) -> Result<IndexSummary> {
        let mut summary = IndexSummary::default();
        let mut buffer: Vec<Document> = Vec::new();
        let mut failure: Option<ConnectorError> = None;
        let mut discarded = 0usize;

        loop {
            match self.queue.get().await? {
                QueueMessage::DocumentBatch(batch) => {
                    if failure.is_some() {
                        discarded += batch.len();
                        continue;
                    }
                    buffer.extend(batch);
                    if buffer.len() >= BATCH_SIZE {
                        if let Err(e) = self.flush(&mut buffer, &mut summary).await {
                            log::error!("Error while indexing documents: {}", e);
                            discarded += buffer.len();
                            buffer.clear();
                            failure = Some(e);
                        }
                    }
                }
                QueueMessage::Checkpoint {
                    key,
                    time,
                    indexing_type,
                } => summary.checkpoints.push((key, time, indexing_type)),
                QueueMessage::EndSignal => {
                    if failure.is_none() {
                        if let Err(e) = self.flush(&mut buffer, &mut summary).await {
                            log::error!("Error while indexing documents: {}", e);
                            discarded += buffer.len();
                            failure = Some(e);
                        }
                    }
                    break;
                }
            }
        }

        match failure {
            Some(e) => {
                log::error!("Discarded {} documents after an indexing failure", discarded);
                Err(e)
            }
            None => {
                log::info!(
                    "Indexer finished: {} documents indexed, {} failed",
                    summary.indexed,
                    summary.failed
                );
                Ok(summary)
            }
        }
    }

    /// Write the buffered documents in chunks of [`BATCH_SIZE`].
    ///
    /// Chunks written before a transport error are counted; the rest of the
    /// buffer is left in place for the caller to discard.
    async fn flush(&self, buffer: &mut Vec<Document>, summary: &mut IndexSummary) -> Result<()> {
        let pending = std::mem::take(buffer);
        let mut chunks = split_into_chunks(pending, BATCH_SIZE).into_iter();

        while let Some(chunk) = chunks.next() {
            let response = match self.client.index_documents(&self.source_id, &chunk).await {
                Ok(response) => response,
                Err(e) => {
                    buffer.extend(chunk);
                    buffer.extend(chunks.flatten());
                    return Err(e);
                }
            };
            for result in response.results {
                if result.errors.is_empty() {
                    summary.indexed += 1;
                } else {
                    summary.failed += 1;
                    log::error!(
                        "Error while indexing document {}: {}",
                        result.id,
                        result.errors.join(", ")
                    );
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::fake::FakeIndex;
    use crate::ingest::parse_time;
    use crate::sync::queue::tests::docs;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn consumer(index: &Arc<FakeIndex>, queue: &WorkQueue) -> IndexSync {
        IndexSync::new(index.clone(), "source", queue.clone())
    }

    #[tokio::test]
    async fn test_indexes_everything_until_end_signal() {
        let index = Arc::new(FakeIndex::default());
        let queue = WorkQueue::new(16);
        queue.put_batch(docs(250)).await.unwrap();
        queue.put_end_signal().await.unwrap();

        let summary = consumer(&index, &queue).perform_sync().await.unwrap();
        assert_eq!(summary.indexed, 250);
        assert_eq!(summary.failed, 0);
        assert_eq!(index.indexed_ids().len(), 250);
        assert_eq!(index.index_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_buffers_small_batches() {
        let index = Arc::new(FakeIndex::default());
        let queue = WorkQueue::new(16);
        queue.put_batch(docs(30)).await.unwrap();
        queue.put_batch(docs(30)).await.unwrap();
        queue.put_end_signal().await.unwrap();

        let summary = consumer(&index, &queue).perform_sync().await.unwrap();
        assert_eq!(summary.indexed, 60);
        assert_eq!(index.index_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_counts_per_document_errors() {
        let index = Arc::new(FakeIndex::default());
        index.reject_ids.lock().unwrap().insert("3".to_string());
        let queue = WorkQueue::new(16);
        queue.put_batch(docs(5)).await.unwrap();
        queue.put_end_signal().await.unwrap();

        let summary = consumer(&index, &queue).perform_sync().await.unwrap();
        assert_eq!(summary.indexed, 4);
        assert_eq!(summary.failed, 1);
        assert!(!index.indexed_ids().contains(&"3".to_string()));
    }

    #[tokio::test]
    async fn test_transport_error_drains_then_fails() {
        let index = Arc::new(FakeIndex::default());
        index.fail_index.store(true, Ordering::SeqCst);
        let queue = WorkQueue::new(2);

        let producer = queue.clone();
        let handle = tokio::task::spawn_blocking(move || {
            producer.blocking_put_batch(docs(1000)).unwrap();
            producer.blocking_put_end_signal().unwrap();
        });

        let err = consumer(&index, &queue).perform_sync().await.unwrap_err();
        assert!(matches!(err, ConnectorError::Index(_)));
        // producer was not left blocked on the full queue
        handle.await.unwrap();
        assert_eq!(index.index_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_collects_checkpoint_messages() {
        let index = Arc::new(FakeIndex::default());
        let queue = WorkQueue::new(4);
        let time = parse_time("2022-01-01T00:00:00Z").unwrap();
        queue.put_checkpoint("drive", time, IndexingType::Full).await.unwrap();
        queue.put_end_signal().await.unwrap();

        let summary = consumer(&index, &queue).perform_sync().await.unwrap();
        assert_eq!(
            summary.checkpoints,
            vec![("drive".to_string(), time, IndexingType::Full)]
        );
    }

    #[tokio::test]
    async fn test_each_consumer_needs_its_own_end_signal() {
        let index = Arc::new(FakeIndex::default());
        let queue = WorkQueue::new(16);
        queue.put_batch(docs(10)).await.unwrap();

        let first = consumer(&index, &queue);
        let second = consumer(&index, &queue);
        let a = tokio::spawn(async move { first.perform_sync().await });
        let b = tokio::spawn(async move { second.perform_sync().await });

        // a single end signal leaves one consumer waiting forever
        queue.put_end_signal().await.unwrap();
        let one_signal =
            tokio::time::timeout(Duration::from_millis(200), async { (a.await, b.await) }).await;
        assert!(one_signal.is_err());
    }

    #[tokio::test]
    async fn test_two_consumers_two_end_signals() {
        let index = Arc::new(FakeIndex::default());
        let queue = WorkQueue::new(16);
        queue.put_batch(docs(300)).await.unwrap();

        let first = consumer(&index, &queue);
        let second = consumer(&index, &queue);
        let a = tokio::spawn(async move { first.perform_sync().await });
        let b = tokio::spawn(async move { second.perform_sync().await });

        queue.put_end_signal().await.unwrap();
        queue.put_end_signal().await.unwrap();
        let (a, b) = tokio::time::timeout(Duration::from_secs(5), async { (a.await, b.await) })
            .await
            .unwrap();
        let mut total = a.unwrap().unwrap();
        total.merge(b.unwrap().unwrap());
        assert_eq!(total.indexed, 300);
        assert_eq!(index.indexed_ids().len(), 300);
    }
}
