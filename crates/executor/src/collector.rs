//! Result collector: one channel slot per work item.
//!
//! The channel is created with capacity equal to the number of work items,
//! so a drainer publishing its record never waits for a consumer. Records can
//! be consumed while the dispatch runs or all at once afterwards.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use fanout::OutputRecord;
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Debug, Default)]
pub(crate) struct Tally {
    published: AtomicUsize,
    failed: AtomicUsize,
    bytes: AtomicU64,
}

impl Tally {
    pub(crate) fn published(&self) -> usize {
        self.published.load(Ordering::SeqCst)
    }

    pub(crate) fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    pub(crate) fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::SeqCst)
    }
}

/// Producer side, cloned into every drainer.
#[derive(Debug, Clone)]
pub struct RecordSink {
    sender: mpsc::Sender<OutputRecord>,
    tally: Arc<Tally>,
}

/// Consumer side, handed to the caller.
#[derive(Debug)]
pub struct RecordStream {
    receiver: mpsc::Receiver<OutputRecord>,
}

/// Creates a collector sized for `capacity` records.
pub fn record_channel(capacity: usize) -> (RecordSink, RecordStream) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (
        RecordSink {
            sender,
            tally: Arc::new(Tally::default()),
        },
        RecordStream { receiver },
    )
}

impl RecordSink {
    /// Hands a finished record to the collector.
    ///
    /// If the consumer has gone away the record is dropped; the dispatch
    /// still runs to completion.
    pub async fn publish(&self, record: OutputRecord) {
        self.tally.published.fetch_add(1, Ordering::SeqCst);
        if !record.is_success() {
            self.tally.failed.fetch_add(1, Ordering::SeqCst);
        }
        self.tally
            .bytes
            .fetch_add(record.stdout.len() as u64, Ordering::SeqCst);

        let record = match self.sender.try_send(record) {
            Ok(()) => return,
            Err(mpsc::error::TrySendError::Closed(record)) => {
                debug!(index = record.index, "record stream closed, discarding record");
                return;
            }
            Err(mpsc::error::TrySendError::Full(record)) => record,
        };

        // More records than slots means a sizing bug upstream; still deliver.
        warn!(
            index = record.index,
            capacity = self.sender.max_capacity(),
            "record channel full, waiting for consumer"
        );
        let _ = self.sender.send(record).await;
    }

    pub(crate) fn tally(&self) -> Arc<Tally> {
        self.tally.clone()
    }
}

impl RecordStream {
    /// Receives the next record, or `None` once every producer has finished.
    pub async fn recv(&mut self) -> Option<OutputRecord> {
        self.receiver.recv().await
    }

    /// Waits for every producer to finish and returns all records in arrival order.
    pub async fn collect_all(mut self) -> Vec<OutputRecord> {
        let mut records = Vec::new();
        while let Some(record) = self.receiver.recv().await {
            records.push(record);
        }
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fanout::{ExecutionError, Timestamp, WorkItem};
    use std::time::Duration;

    fn record(index: usize, error: Option<ExecutionError>) -> OutputRecord {
        OutputRecord {
            index,
            item: WorkItem::new(format!("item-{index}")).unwrap(),
            stdout: vec![b'x'; index],
            stderr: None,
            exit_code: Some(0),
            error,
            started_at: None,
            finished_at: Timestamp::now(),
        }
    }

    #[tokio::test]
    async fn test_publish_never_waits_with_sized_capacity() {
        let (sink, stream) = record_channel(5);
        let publish_all = async {
            for i in 0..5 {
                sink.publish(record(i, None)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(1), publish_all)
            .await
            .expect("publishing within capacity must not block");

        let tally = sink.tally();
        drop(sink);
        let records = stream.collect_all().await;
        assert_eq!(records.len(), 5);
        assert_eq!(tally.published(), 5);
        assert_eq!(tally.bytes(), (0..5).sum::<usize>() as u64);
    }

    #[tokio::test]
    async fn test_tally_counts_failures() {
        let (sink, stream) = record_channel(2);
        sink.publish(record(0, None)).await;
        sink.publish(record(
            1,
            Some(ExecutionError::ReadFailed {
                reason: "boom".into(),
            }),
        ))
        .await;
        let tally = sink.tally();
        drop(sink);

        let records = stream.collect_all().await;
        assert_eq!(records.len(), 2);
        assert_eq!(tally.failed(), 1);
    }

    #[tokio::test]
    async fn test_publish_after_consumer_dropped_is_silent() {
        let (sink, stream) = record_channel(1);
        drop(stream);
        sink.publish(record(0, None)).await;
        assert_eq!(sink.tally().published(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_consumption() {
        let (sink, mut stream) = record_channel(3);
        let producer = tokio::spawn(async move {
            for i in 0..3 {
                sink.publish(record(i, None)).await;
            }
        });

        let mut seen = Vec::new();
        while let Some(r) = stream.recv().await {
            seen.push(r.index);
        }
        producer.await.unwrap();
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2]);
    }
}
