// Blocked-message recorder.
//
// The gate appends records to an in-memory buffer and moves on. A background
// task swaps the buffer out on a fixed interval and writes the whole batch in
// one transaction. If the batch fails, each record is retried on its own so a
// single bad row only loses itself.

use super::recorder_models::BlockedMessage;
use crate::core::retry::{RetryPolicy, RetryVerdict};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The database is locked by another writer. Worth retrying.
    #[error("Database is busy")]
    Busy,

    #[error("Storage error: {0}")]
    StorageError(String),
}

// ============================================================================
// STORAGE TRAIT (PORT)
// ============================================================================

#[async_trait]
pub trait BlockedMessageStore: Send + Sync {
    /// All-or-nothing insert. On error nothing from the batch is stored.
    async fn insert_batch(&self, records: &[BlockedMessage]) -> Result<(), StoreError>;

    async fn insert_one(&self, record: &BlockedMessage) -> Result<(), StoreError>;

    async fn count_for_group(&self, group_id: u64) -> Result<u64, StoreError>;
}

// ============================================================================
// BUFFER
// ============================================================================

/// Shared append-only buffer. The lock is only held for a push or a swap.
#[derive(Clone, Default)]
pub struct MessageBuffer {
    inner: Arc<Mutex<Vec<BlockedMessage>>>,
}

impl MessageBuffer {
    fn lock(&self) -> MutexGuard<'_, Vec<BlockedMessage>> {
        // A panic while holding the lock cannot leave a Vec half-pushed.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn push(&self, record: BlockedMessage) {
        self.lock().push(record);
    }

    /// Detach everything buffered so far, leaving the buffer empty.
    pub fn take(&self) -> Vec<BlockedMessage> {
        std::mem::take(&mut *self.lock())
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// RECORDER
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Stored by the batch transaction.
    pub batched: usize,
    /// Stored one by one after the batch failed.
    pub recovered: usize,
    /// Lost after retries.
    pub dropped: usize,
}

pub struct BlockedMessageRecorder<S: BlockedMessageStore> {
    buffer: MessageBuffer,
    store: S,
    retry: RetryPolicy,
}

impl<S: BlockedMessageStore> BlockedMessageRecorder<S> {
    pub fn new(store: S, retry: RetryPolicy) -> Self {
        Self {
            buffer: MessageBuffer::default(),
            store,
            retry,
        }
    }

    /// Handle for producers. Cloning it is cheap.
    pub fn buffer(&self) -> MessageBuffer {
        self.buffer.clone()
    }

    pub async fn count_for_group(&self, group_id: u64) -> Result<u64, StoreError> {
        self.store.count_for_group(group_id).await
    }

    pub async fn flush(&self) -> FlushReport {
        let records = self.buffer.take();
        if records.is_empty() {
            return FlushReport::default();
        }

        let err = match self.store.insert_batch(&records).await {
            Ok(()) => {
                tracing::debug!(count = records.len(), "Flushed blocked messages");
                return FlushReport {
                    batched: records.len(),
                    ..FlushReport::default()
                };
            }
            Err(err) => err,
        };

        tracing::warn!(
            count = records.len(),
            error = %err,
            "Batch insert of blocked messages failed; inserting one by one"
        );

        let mut report = FlushReport::default();
        for record in &records {
            let result = self
                .retry
                .run(
                    |e: &StoreError| match e {
                        StoreError::Busy => RetryVerdict::Retry,
                        StoreError::StorageError(_) => RetryVerdict::Stop,
                    },
                    |_| self.store.insert_one(record),
                )
                .await;

            match result {
                Ok(()) => report.recovered += 1,
                Err(failure) => {
                    report.dropped += 1;
                    tracing::error!(
                        channel_id = record.channel_id,
                        message_id = record.message_id,
                        attempts = failure.attempts(),
                        error = %failure.error(),
                        "Dropping blocked message record"
                    );
                }
            }
        }
        report
    }

    /// Flush on a fixed interval until shutdown, then flush once more.
    pub async fn run(self: Arc<Self>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.flush().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        let report = self.flush().await;
        tracing::info!(
            batched = report.batched,
            recovered = report.recovered,
            dropped = report.dropped,
            "Blocked-message recorder stopped"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::InMemoryStore;
    use chrono::Utc;

    fn record(message_id: u64) -> BlockedMessage {
        BlockedMessage::new(1, 10, message_id, "spam", Utc::now())
    }

    fn recorder(store: &InMemoryStore) -> BlockedMessageRecorder<InMemoryStore> {
        BlockedMessageRecorder::new(
            store.clone(),
            RetryPolicy::new(3).with_initial_delay(Duration::from_millis(10)),
        )
    }

    #[tokio::test]
    async fn test_flush_writes_one_batch_and_empties_buffer() {
        let store = InMemoryStore::default();
        let recorder = recorder(&store);

        for id in 1..=5 {
            recorder.buffer().push(record(id));
        }
        let report = recorder.flush().await;

        assert_eq!(report.batched, 5);
        assert!(recorder.buffer().is_empty());
        assert_eq!(store.blocked().len(), 5);

        // Nothing left to write the second time round.
        assert_eq!(recorder.flush().await, FlushReport::default());
        assert_eq!(store.blocked().len(), 5);
    }

    #[tokio::test]
    async fn test_poisoned_record_only_loses_itself() {
        let store = InMemoryStore::default();
        store.poison_message(3);
        let recorder = recorder(&store);

        for id in 1..=5 {
            recorder.buffer().push(record(id));
        }
        let report = recorder.flush().await;

        assert_eq!(report.batched, 0);
        assert_eq!(report.recovered, 4);
        assert_eq!(report.dropped, 1);

        let mut stored: Vec<u64> = store.blocked().iter().map(|r| r.message_id).collect();
        stored.sort_unstable();
        assert_eq!(stored, vec![1, 2, 4, 5]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_database_is_retried_per_record() {
        let store = InMemoryStore::default();
        store.poison_message(2);
        store.busy_for(2);
        let recorder = recorder(&store);

        recorder.buffer().push(record(1));
        recorder.buffer().push(record(2));
        let report = recorder.flush().await;

        assert_eq!(report.recovered, 1);
        assert_eq!(report.dropped, 1);
        assert_eq!(store.blocked()[0].message_id, 1);
    }

    #[tokio::test]
    async fn test_records_pushed_after_swap_wait_for_next_flush() {
        let store = InMemoryStore::default();
        let recorder = recorder(&store);
        let buffer = recorder.buffer();

        buffer.push(record(1));
        let detached = buffer.take();
        buffer.push(record(2));

        assert_eq!(detached.len(), 1);
        assert_eq!(buffer.len(), 1);
        assert_eq!(recorder.flush().await.batched, 1);
        assert_eq!(store.blocked()[0].message_id, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_flushes_on_shutdown() {
        let store = InMemoryStore::default();
        let recorder = Arc::new(recorder(&store));
        let (tx, rx) = watch::channel(false);

        let task = tokio::spawn(recorder.clone().run(Duration::from_secs(2), rx));

        tokio::time::sleep(Duration::from_secs(3)).await;
        recorder.buffer().push(record(1));
        tx.send(true).unwrap();
        task.await.unwrap();

        assert_eq!(store.blocked().len(), 1);
    }
}
