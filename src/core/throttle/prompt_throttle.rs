// Daily prompt throttle.
//
// Each (group, channel, notice kind) gets at most one notice per calendar day.
// `record` is an atomic insert-if-absent, so callers use its return value as
// the "may I send?" answer instead of a separate check followed by a write.
// A notice that could not be delivered is handed back with `release` so a
// later post can try again the same day.

use crate::core::clock::Clock;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum ThrottleError {
    #[error("Storage error: {0}")]
    StorageError(String),
}

// ============================================================================
// NOTICE KINDS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoticeKind {
    /// The channel is unknown and should apply.
    NeedsApplication,
    /// The channel already applied and is waiting for review.
    PendingApplication,
}

impl NoticeKind {
    /// Stable key used in storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            NoticeKind::NeedsApplication => "whitelist_warning",
            NoticeKind::PendingApplication => "pending_notice",
        }
    }
}

impl fmt::Display for NoticeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// STORAGE TRAIT (PORT)
// ============================================================================

#[async_trait]
pub trait PromptStore: Send + Sync {
    async fn exists(
        &self,
        group_id: u64,
        channel_id: u64,
        kind: NoticeKind,
        day: NaiveDate,
    ) -> Result<bool, ThrottleError>;

    /// Insert if absent. Returns true if this call created the record.
    async fn insert(
        &self,
        group_id: u64,
        channel_id: u64,
        kind: NoticeKind,
        day: NaiveDate,
    ) -> Result<bool, ThrottleError>;

    /// Returns true if a record was removed.
    async fn remove(
        &self,
        group_id: u64,
        channel_id: u64,
        kind: NoticeKind,
        day: NaiveDate,
    ) -> Result<bool, ThrottleError>;

    /// Delete every record whose day differs from `keep`. Returns rows removed.
    async fn delete_other_days(&self, keep: NaiveDate) -> Result<u64, ThrottleError>;
}

// ============================================================================
// CORE SERVICE
// ============================================================================

pub struct DailyPromptThrottle<S: PromptStore> {
    store: S,
    clock: Arc<dyn Clock>,
}

impl<S: PromptStore> DailyPromptThrottle<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn has_fired(
        &self,
        group_id: u64,
        channel_id: u64,
        kind: NoticeKind,
    ) -> Result<bool, ThrottleError> {
        self.store
            .exists(group_id, channel_id, kind, self.clock.today())
            .await
    }

    /// Mark the notice as sent for today. Returns false if it already was.
    pub async fn record(
        &self,
        group_id: u64,
        channel_id: u64,
        kind: NoticeKind,
    ) -> Result<bool, ThrottleError> {
        self.store
            .insert(group_id, channel_id, kind, self.clock.today())
            .await
    }

    /// Undo today's `record` after the notice failed to go out.
    pub async fn release(
        &self,
        group_id: u64,
        channel_id: u64,
        kind: NoticeKind,
    ) -> Result<bool, ThrottleError> {
        self.store
            .remove(group_id, channel_id, kind, self.clock.today())
            .await
    }

    /// Forget every record that does not belong to today.
    pub async fn reset_all(&self) -> Result<u64, ThrottleError> {
        let today = self.clock.today();
        let removed = self.store.delete_other_days(today).await?;
        tracing::info!(%today, removed, "Daily prompt records reset");
        Ok(removed)
    }
}
