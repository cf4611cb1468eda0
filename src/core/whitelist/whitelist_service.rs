// Whitelist service - which channels may post in which groups.
//
// Lookups are open to everyone (the moderation gate calls them on every
// channel post). Manual edits can be restricted to group administrators.

use super::whitelist_models::WhitelistEntry;
use crate::core::access::AccessPolicy;
use crate::core::clock::Clock;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum WhitelistError {
    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Only group administrators can manage the whitelist")]
    NotAuthorized,

    #[error("Channel {0} is already whitelisted")]
    AlreadyWhitelisted(u64),

    #[error("Channel {0} is not whitelisted")]
    NotWhitelisted(u64),
}

// ============================================================================
// STORAGE TRAIT (PORT)
// ============================================================================

#[async_trait]
pub trait WhitelistStore: Send + Sync {
    async fn is_whitelisted(&self, group_id: u64, channel_id: u64)
        -> Result<bool, WhitelistError>;

    /// Insert unless the pair already exists. Returns true if a row was created.
    async fn add(&self, entry: WhitelistEntry) -> Result<bool, WhitelistError>;

    /// Returns true if a row was removed.
    async fn remove(&self, group_id: u64, channel_id: u64) -> Result<bool, WhitelistError>;

    async fn list(&self, group_id: u64) -> Result<Vec<WhitelistEntry>, WhitelistError>;
}

// ============================================================================
// CORE SERVICE
// ============================================================================

pub struct WhitelistService<S: WhitelistStore> {
    store: S,
    access: Arc<AccessPolicy>,
    clock: Arc<dyn Clock>,
    admin_only: bool,
}

impl<S: WhitelistStore> WhitelistService<S> {
    pub fn new(store: S, access: Arc<AccessPolicy>, clock: Arc<dyn Clock>, admin_only: bool) -> Self {
        Self {
            store,
            access,
            clock,
            admin_only,
        }
    }

    /// Whether manual edits are limited to administrators.
    pub fn admin_only(&self) -> bool {
        self.admin_only
    }

    pub async fn is_whitelisted(&self, group_id: u64, channel_id: u64) -> Result<bool, WhitelistError> {
        self.store.is_whitelisted(group_id, channel_id).await
    }

    async fn ensure_can_manage(&self, group_id: u64, user_id: u64) -> Result<(), WhitelistError> {
        if self.admin_only && !self.access.is_admin(group_id, user_id).await {
            return Err(WhitelistError::NotAuthorized);
        }
        Ok(())
    }

    pub async fn add(
        &self,
        group_id: u64,
        channel_id: u64,
        channel_title: &str,
        actor: u64,
    ) -> Result<WhitelistEntry, WhitelistError> {
        self.ensure_can_manage(group_id, actor).await?;

        let entry = WhitelistEntry {
            group_id,
            channel_id,
            channel_title: channel_title.to_string(),
            added_by: actor,
            added_at: self.clock.now_utc(),
        };

        if !self.store.add(entry.clone()).await? {
            return Err(WhitelistError::AlreadyWhitelisted(channel_id));
        }

        tracing::info!(group_id, channel_id, actor, "Channel whitelisted manually");
        Ok(entry)
    }

    pub async fn remove(&self, group_id: u64, channel_id: u64, actor: u64) -> Result<(), WhitelistError> {
        self.ensure_can_manage(group_id, actor).await?;

        if !self.store.remove(group_id, channel_id).await? {
            return Err(WhitelistError::NotWhitelisted(channel_id));
        }

        tracing::info!(group_id, channel_id, actor, "Channel removed from whitelist");
        Ok(())
    }

    pub async fn list(&self, group_id: u64) -> Result<Vec<WhitelistEntry>, WhitelistError> {
        self.store.list(group_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::FixedClock;
    use crate::core::testing::{InMemoryStore, MockTransport};

    fn service(admin_only: bool) -> (WhitelistService<InMemoryStore>, Arc<MockTransport>) {
        let transport = Arc::new(MockTransport::default());
        let access = Arc::new(AccessPolicy::new([100], transport.clone()));
        let clock = Arc::new(FixedClock::at(2024, 5, 1, 12, 0));
        (
            WhitelistService::new(InMemoryStore::default(), access, clock, admin_only),
            transport,
        )
    }

    #[tokio::test]
    async fn test_add_then_lookup() {
        let (service, _) = service(true);

        assert!(!service.is_whitelisted(1, 10).await.unwrap());
        service.add(1, 10, "news", 100).await.unwrap();
        assert!(service.is_whitelisted(1, 10).await.unwrap());
        assert!(!service.is_whitelisted(2, 10).await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_add_is_reported() {
        let (service, _) = service(true);

        service.add(1, 10, "news", 100).await.unwrap();
        let err = service.add(1, 10, "news", 100).await.unwrap_err();
        assert!(matches!(err, WhitelistError::AlreadyWhitelisted(10)));
        assert_eq!(service.list(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_non_admin_rejected_when_admin_only() {
        let (service, transport) = service(true);

        let err = service.add(1, 10, "news", 5).await.unwrap_err();
        assert!(matches!(err, WhitelistError::NotAuthorized));

        transport.grant_admin(1, 5);
        service.add(1, 10, "news", 5).await.unwrap();
    }

    #[tokio::test]
    async fn test_anyone_can_manage_when_open() {
        let (service, _) = service(false);

        service.add(1, 10, "news", 5).await.unwrap();
        service.remove(1, 10, 5).await.unwrap();
        let err = service.remove(1, 10, 5).await.unwrap_err();
        assert!(matches!(err, WhitelistError::NotWhitelisted(10)));
    }
}
