use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;

use super::queue::WorkQueue;
use crate::error::{ConnectorError, Result};
use crate::ingest::{recursive_fetch, Files, IndexingRules, TimeWindow};

/// Stripe `items` into `n` buckets: element `k` goes to bucket `k mod n`.
///
/// Always returns `n` buckets (some possibly empty); `n == 0` is treated as 1.
pub fn split_into_buckets<T>(items: Vec<T>, n: usize) -> Vec<Vec<T>> {
    let n = n.max(1);
    let mut buckets: Vec<Vec<T>> = (0..n).map(|_| Vec::new()).collect();
    for (k, item) in items.into_iter().enumerate() {
        buckets[k % n].push(item);
    }
    buckets
}

/// Producer side of an ingestion cycle: walks the share and feeds the queue
pub struct SyncNetworkDrives {
    files: Arc<Files>,
    thread_count: usize,
    consumer_count: usize,
}

impl SyncNetworkDrives {
    /// # Arguments
    ///
    /// * `files` - Document extractor bound to the share
    /// * `thread_count` - Producer threads (one folder bucket each)
    /// * `consumer_count` - Consumers reading the queue; one end signal is sent per consumer
    pub fn new(files: Arc<Files>, thread_count: usize, consumer_count: usize) -> Self {
        Self {
            files,
            thread_count: thread_count.max(1),
            consumer_count,
        }
    }

    /// Walk `root` on `share`, extract documents in parallel and enqueue them.
    ///
    /// Returns `{id: path}` for every document handed to the queue. Blocks the
    /// calling thread; run it under `spawn_blocking` from async code. Exactly
    /// `consumer_count` end signals are enqueued whatever the outcome.
    pub fn perform_sync(
        &self,
        share: &str,
        root: &str,
        window: &TimeWindow,
        rules: &IndexingRules,
        queue: &WorkQueue,
    ) -> Result<BTreeMap<String, String>> {
        let result = self.produce(share, root, window, rules, queue);

        for _ in 0..self.consumer_count {
            if let Err(e) = queue.blocking_put_end_signal() {
                log::error!("Unable to send end signal to the indexer: {}", e);
                break;
            }
        }
        result
    }

    fn produce(
        &self,
        share: &str,
        root: &str,
        window: &TimeWindow,
        rules: &IndexingRules,
        queue: &WorkQueue,
    ) -> Result<BTreeMap<String, String>> {
        let mut conn = self.files.connect()?;
        let folders = recursive_fetch(conn.as_ref(), share, root);
        conn.close();

        if folders.is_empty() {
            log::info!("No folders found under {}/{}", share, root);
            return Ok(BTreeMap::new());
        }
        log::info!(
            "Fetching files from {} folders with {} threads",
            folders.len(),
            self.thread_count.min(folders.len())
        );

        let buckets = split_into_buckets(folders, self.thread_count);
        let files = self.files.as_ref();

        let outcomes: Vec<Result<BTreeMap<String, String>>> = thread::scope(|scope| {
            let handles: Vec<_> = buckets
                .iter()
                .filter(|bucket| !bucket.is_empty())
                .map(|bucket| {
                    scope.spawn(move || -> Result<BTreeMap<String, String>> {
                        let documents = files.fetch_files(share, bucket, window, rules)?;
                        let ids = documents
                            .iter()
                            .map(|doc| (doc.id.clone(), doc.path.clone()))
                            .collect();
                        queue.blocking_put_batch(documents)?;
                        Ok(ids)
                    })
                })
                .collect();

            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|_| Err(ConnectorError::Worker("producer thread panicked".to_string())))
                })
                .collect()
        });

        let mut discovered = BTreeMap::new();
        let mut first_error = None;
        for outcome in outcomes {
            match outcome {
                Ok(ids) => discovered.extend(ids),
                Err(e) => {
                    log::error!("Error while fetching files from the network drive: {}", e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                log::info!("Queued {} documents for indexing", discovered.len());
                Ok(discovered)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::parse_time;
    use crate::share::fake::FakeShare;
    use crate::sync::queue::QueueMessage;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn window() -> TimeWindow {
        TimeWindow::new(
            parse_time("2020-01-01T00:00:00Z").unwrap(),
            parse_time("2023-01-01T00:00:00Z").unwrap(),
        )
        .unwrap()
    }

    fn sample_share() -> Arc<FakeShare> {
        let share = FakeShare::new();
        let t = parse_time("2022-01-01T00:00:00Z").unwrap();
        for i in 0..12 {
            share.add_file(&format!("root/d{}/f{}.txt", i % 4, i), Some(i + 1), "body", t);
        }
        share.add_file("root/top.txt", Some(100), "top", t);
        share
    }

    fn producer(share: &Arc<FakeShare>, threads: usize, consumers: usize) -> SyncNetworkDrives {
        let files = Files::new(Arc::new(share.clone()), "h").with_retry(2, Duration::from_millis(1));
        SyncNetworkDrives::new(Arc::new(files), threads, consumers)
    }

    /// Drain a queue after the producer finished, counting documents and end signals
    fn drain(queue: &WorkQueue, consumers: usize) -> (Vec<String>, usize) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        runtime.block_on(async {
            let mut ids = Vec::new();
            let mut ends = 0;
            while ends < consumers {
                match queue.get().await.unwrap() {
                    QueueMessage::DocumentBatch(batch) => ids.extend(batch.into_iter().map(|d| d.id)),
                    QueueMessage::EndSignal => ends += 1,
                    QueueMessage::Checkpoint { .. } => {}
                }
            }
            ids.sort();
            (ids, ends)
        })
    }

    #[test]
    fn test_split_into_buckets_stripes() {
        let buckets = split_into_buckets((0..7).collect(), 3);
        assert_eq!(buckets, vec![vec![0, 3, 6], vec![1, 4], vec![2, 5]]);
    }

    #[test]
    fn test_split_into_buckets_partition_law() {
        for (len, n) in [(0, 3), (2, 5), (10, 1), (10, 4), (100, 7)] {
            let items: Vec<usize> = (0..len).collect();
            let buckets = split_into_buckets(items.clone(), n);
            assert_eq!(buckets.len(), n);
            let mut flattened: Vec<usize> = buckets.concat();
            flattened.sort();
            assert_eq!(flattened, items);
            for (b, bucket) in buckets.iter().enumerate() {
                assert!(bucket.iter().all(|k| k % n == b));
            }
        }
    }

    #[test]
    fn test_perform_sync_queues_all_documents() {
        let share = sample_share();
        let queue = WorkQueue::new(64);
        let discovered = producer(&share, 3, 2)
            .perform_sync("docs", "root", &window(), &IndexingRules::allow_all(), &queue)
            .unwrap();

        assert_eq!(discovered.len(), 13);
        assert_eq!(discovered["100"], "root/top.txt");
        assert_eq!(discovered["1"], "root/d0/f0.txt");

        let (ids, ends) = drain(&queue, 2);
        assert_eq!(ends, 2);
        let mut expected: Vec<String> = discovered.keys().cloned().collect();
        expected.sort();
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_zero_folders_still_signals_consumers() {
        let share = FakeShare::new();
        share.fail_listing("root", crate::share::ShareError::Other("denied".to_string()));
        let queue = WorkQueue::new(8);
        let discovered = producer(&share, 2, 3)
            .perform_sync("docs", "root", &window(), &IndexingRules::allow_all(), &queue)
            .unwrap();
        assert!(discovered.is_empty());
        let (ids, ends) = drain(&queue, 3);
        assert!(ids.is_empty());
        assert_eq!(ends, 3);
    }

    #[test]
    fn test_connection_failure_is_fatal_but_signals_consumers() {
        let share = sample_share();
        share.connect_failures.store(10, Ordering::SeqCst);
        let queue = WorkQueue::new(8);
        let err = producer(&share, 2, 2)
            .perform_sync("docs", "root", &window(), &IndexingRules::allow_all(), &queue)
            .unwrap_err();
        assert!(matches!(err, ConnectorError::Connection(_)));
        let (ids, ends) = drain(&queue, 2);
        assert!(ids.is_empty());
        assert_eq!(ends, 2);
    }
}
