// Settings service - lets group administrators switch moderation on and off.
//
// Groups without a stored row are moderated. Only an explicit /disable turns
// the gate off for a group.

use super::settings_models::GroupSettings;
use crate::core::access::AccessPolicy;
use crate::core::clock::Clock;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Only group administrators can change moderation settings")]
    NotAuthorized,
}

// ============================================================================
// STORAGE TRAIT (PORT)
// ============================================================================

#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get(&self, group_id: u64) -> Result<Option<GroupSettings>, SettingsError>;

    /// Insert or overwrite the group's row.
    async fn upsert(&self, settings: &GroupSettings) -> Result<(), SettingsError>;
}

// ============================================================================
// CORE SERVICE
// ============================================================================

pub struct SettingsService<S: SettingsStore> {
    store: S,
    access: Arc<AccessPolicy>,
    clock: Arc<dyn Clock>,
}

impl<S: SettingsStore> SettingsService<S> {
    pub fn new(store: S, access: Arc<AccessPolicy>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            access,
            clock,
        }
    }

    pub async fn settings(&self, group_id: u64) -> Result<GroupSettings, SettingsError> {
        Ok(self
            .store
            .get(group_id)
            .await?
            .unwrap_or_else(|| GroupSettings::defaults(group_id)))
    }

    pub async fn is_enabled(&self, group_id: u64) -> Result<bool, SettingsError> {
        Ok(self.settings(group_id).await?.enabled)
    }

    pub async fn set_enabled(
        &self,
        group_id: u64,
        enabled: bool,
        actor: u64,
    ) -> Result<GroupSettings, SettingsError> {
        if !self.access.is_admin(group_id, actor).await {
            return Err(SettingsError::NotAuthorized);
        }

        let settings = GroupSettings {
            group_id,
            enabled,
            updated_by: actor,
            updated_at: Some(self.clock.now_utc()),
        };
        self.store.upsert(&settings).await?;

        tracing::info!(group_id, enabled, actor, "Group moderation toggled");
        Ok(settings)
    }
}
