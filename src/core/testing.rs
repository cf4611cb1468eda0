// In-memory test doubles shared by the core's unit tests.
//
// One InMemoryStore implements every store port so that cross-table
// operations (approval writing the whitelist) behave like the SQLite
// implementation. Clones share the same maps.

use crate::core::applications::{
    ApplicationError, ApplicationStatus, ApplicationStore, ChannelApplication, Decision,
    NewApplication, UserState, UserStateStore,
};
use crate::core::recorder::{BlockedMessage, BlockedMessageStore, StoreError};
use crate::core::settings::{GroupSettings, SettingsError, SettingsStore};
use crate::core::throttle::{NoticeKind, PromptStore, ThrottleError};
use crate::core::transport::{ActionButton, MessagingTransport, Target, TransportError};
use crate::core::whitelist::{WhitelistEntry, WhitelistError, WhitelistStore};
use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::{DashMap, DashSet};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

// ============================================================================
// STORES
// ============================================================================

#[derive(Default)]
struct Tables {
    whitelist: DashMap<(u64, u64), WhitelistEntry>,
    settings: DashMap<u64, GroupSettings>,
    applications: DashMap<(u64, u64), ChannelApplication>,
    user_states: DashMap<u64, UserState>,
    prompts: DashSet<(u64, u64, NoticeKind, NaiveDate)>,
    blocked: Mutex<Vec<BlockedMessage>>,
    /// Message ids that fail to insert, batched or not.
    poisoned: DashSet<u64>,
    /// Remaining single-row inserts that report a busy database.
    busy_inserts: AtomicU32,
}

#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<Tables>,
}

impl InMemoryStore {
    pub fn poison_message(&self, message_id: u64) {
        self.tables.poisoned.insert(message_id);
    }

    pub fn busy_for(&self, inserts: u32) {
        self.tables.busy_inserts.store(inserts, Ordering::SeqCst);
    }

    pub fn blocked(&self) -> Vec<BlockedMessage> {
        self.tables.blocked.lock().unwrap().clone()
    }

    pub fn prompt_count(&self) -> usize {
        self.tables.prompts.len()
    }
}

#[async_trait]
impl WhitelistStore for InMemoryStore {
    async fn is_whitelisted(&self, group_id: u64, channel_id: u64) -> Result<bool, WhitelistError> {
        Ok(self.tables.whitelist.contains_key(&(group_id, channel_id)))
    }

    async fn add(&self, entry: WhitelistEntry) -> Result<bool, WhitelistError> {
        let key = (entry.group_id, entry.channel_id);
        match self.tables.whitelist.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(_) => Ok(false),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(entry);
                Ok(true)
            }
        }
    }

    async fn remove(&self, group_id: u64, channel_id: u64) -> Result<bool, WhitelistError> {
        Ok(self.tables.whitelist.remove(&(group_id, channel_id)).is_some())
    }

    async fn list(&self, group_id: u64) -> Result<Vec<WhitelistEntry>, WhitelistError> {
        Ok(self
            .tables
            .whitelist
            .iter()
            .filter(|e| e.group_id == group_id)
            .map(|e| e.value().clone())
            .collect())
    }
}

#[async_trait]
impl SettingsStore for InMemoryStore {
    async fn get(&self, group_id: u64) -> Result<Option<GroupSettings>, SettingsError> {
        Ok(self.tables.settings.get(&group_id).map(|s| s.clone()))
    }

    async fn upsert(&self, settings: &GroupSettings) -> Result<(), SettingsError> {
        self.tables
            .settings
            .insert(settings.group_id, settings.clone());
        Ok(())
    }
}

#[async_trait]
impl ApplicationStore for InMemoryStore {
    async fn get(
        &self,
        group_id: u64,
        channel_id: u64,
    ) -> Result<Option<ChannelApplication>, ApplicationError> {
        Ok(self
            .tables
            .applications
            .get(&(group_id, channel_id))
            .map(|a| a.clone()))
    }

    async fn list_pending(&self, group_id: u64) -> Result<Vec<ChannelApplication>, ApplicationError> {
        Ok(self
            .tables
            .applications
            .iter()
            .filter(|a| a.group_id == group_id && a.is_pending())
            .map(|a| a.value().clone())
            .collect())
    }

    async fn open(&self, application: NewApplication) -> Result<bool, ApplicationError> {
        let key = (application.group_id, application.channel_id);
        let mut slot = self
            .tables
            .applications
            .entry(key)
            .or_insert_with(|| ChannelApplication {
                group_id: application.group_id,
                channel_id: application.channel_id,
                channel_title: String::new(),
                claimant_user_id: 0,
                reason: String::new(),
                applied_at: application.applied_at,
                status: ApplicationStatus::Rejected,
                verified: false,
                last_prompt_date: None,
            });

        if slot.is_pending() {
            return Ok(false);
        }

        *slot = ChannelApplication {
            group_id: application.group_id,
            channel_id: application.channel_id,
            channel_title: application.channel_title,
            claimant_user_id: 0,
            reason: application.reason,
            applied_at: application.applied_at,
            status: ApplicationStatus::Pending,
            verified: false,
            last_prompt_date: None,
        };
        Ok(true)
    }

    async fn claim(
        &self,
        group_id: u64,
        channel_id: u64,
        user_id: u64,
        reason: Option<&str>,
        verify: bool,
    ) -> Result<bool, ApplicationError> {
        let Some(mut app) = self.tables.applications.get_mut(&(group_id, channel_id)) else {
            return Ok(false);
        };
        if !app.is_pending()
            || (app.claimant_user_id != 0 && app.claimant_user_id != user_id)
            || (verify && app.verified)
        {
            return Ok(false);
        }
        app.claimant_user_id = user_id;
        if let Some(reason) = reason {
            app.reason = reason.to_string();
        }
        if verify {
            app.verified = true;
        }
        Ok(true)
    }

    async fn mark_verified(
        &self,
        group_id: u64,
        channel_id: u64,
        user_id: u64,
    ) -> Result<bool, ApplicationError> {
        let Some(mut app) = self.tables.applications.get_mut(&(group_id, channel_id)) else {
            return Ok(false);
        };
        if !app.is_pending() || app.claimant_user_id != user_id || user_id == 0 || app.verified {
            return Ok(false);
        }
        app.verified = true;
        Ok(true)
    }

    async fn finalize(
        &self,
        group_id: u64,
        channel_id: u64,
        decision: Decision,
        whitelist_entry: Option<WhitelistEntry>,
    ) -> Result<bool, ApplicationError> {
        let Some(mut app) = self.tables.applications.get_mut(&(group_id, channel_id)) else {
            return Ok(false);
        };
        if !app.is_pending() || !app.verified {
            return Ok(false);
        }
        app.status = decision.resulting_status();
        if let Some(entry) = whitelist_entry {
            self.tables
                .whitelist
                .entry((entry.group_id, entry.channel_id))
                .or_insert(entry);
        }
        Ok(true)
    }

    async fn set_last_prompt_date(
        &self,
        group_id: u64,
        channel_id: u64,
        day: NaiveDate,
    ) -> Result<(), ApplicationError> {
        if let Some(mut app) = self.tables.applications.get_mut(&(group_id, channel_id)) {
            app.last_prompt_date = Some(day);
        }
        Ok(())
    }
}

#[async_trait]
impl UserStateStore for InMemoryStore {
    async fn get(&self, user_id: u64) -> Result<UserState, ApplicationError> {
        Ok(self
            .tables
            .user_states
            .get(&user_id)
            .map(|s| *s)
            .unwrap_or_default())
    }

    async fn set(&self, user_id: u64, state: UserState) -> Result<(), ApplicationError> {
        match state {
            UserState::Idle => {
                self.tables.user_states.remove(&user_id);
            }
            state => {
                self.tables.user_states.insert(user_id, state);
            }
        }
        Ok(())
    }

    async fn awaiting_reason(
        &self,
        group_id: u64,
        channel_id: u64,
    ) -> Result<Vec<u64>, ApplicationError> {
        let wanted = UserState::AwaitingReason {
            group_id,
            channel_id,
        };
        let mut users: Vec<u64> = self
            .tables
            .user_states
            .iter()
            .filter(|s| *s.value() == wanted)
            .map(|s| *s.key())
            .collect();
        users.sort_unstable();
        Ok(users)
    }
}

#[async_trait]
impl PromptStore for InMemoryStore {
    async fn exists(
        &self,
        group_id: u64,
        channel_id: u64,
        kind: NoticeKind,
        day: NaiveDate,
    ) -> Result<bool, ThrottleError> {
        Ok(self
            .tables
            .prompts
            .contains(&(group_id, channel_id, kind, day)))
    }

    async fn insert(
        &self,
        group_id: u64,
        channel_id: u64,
        kind: NoticeKind,
        day: NaiveDate,
    ) -> Result<bool, ThrottleError> {
        Ok(self.tables.prompts.insert((group_id, channel_id, kind, day)))
    }

    async fn remove(
        &self,
        group_id: u64,
        channel_id: u64,
        kind: NoticeKind,
        day: NaiveDate,
    ) -> Result<bool, ThrottleError> {
        Ok(self
            .tables
            .prompts
            .remove(&(group_id, channel_id, kind, day))
            .is_some())
    }

    async fn delete_other_days(&self, keep: NaiveDate) -> Result<u64, ThrottleError> {
        let before = self.tables.prompts.len();
        self.tables.prompts.retain(|(_, _, _, day)| *day == keep);
        Ok((before - self.tables.prompts.len()) as u64)
    }
}

#[async_trait]
impl BlockedMessageStore for InMemoryStore {
    async fn insert_batch(&self, records: &[BlockedMessage]) -> Result<(), StoreError> {
        if records
            .iter()
            .any(|r| self.tables.poisoned.contains(&r.message_id))
        {
            return Err(StoreError::StorageError(
                "constraint failed in batch".to_string(),
            ));
        }
        self.tables
            .blocked
            .lock()
            .unwrap()
            .extend(records.iter().cloned());
        Ok(())
    }

    async fn insert_one(&self, record: &BlockedMessage) -> Result<(), StoreError> {
        let busy = self
            .tables
            .busy_inserts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if busy {
            return Err(StoreError::Busy);
        }
        if self.tables.poisoned.contains(&record.message_id) {
            return Err(StoreError::StorageError("constraint failed".to_string()));
        }
        self.tables.blocked.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn count_for_group(&self, group_id: u64) -> Result<u64, StoreError> {
        Ok(self
            .tables
            .blocked
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.group_id == group_id)
            .count() as u64)
    }
}

// ============================================================================
// TRANSPORT
// ============================================================================

#[derive(Debug, Clone)]
pub struct SentMessage {
    pub target: Target,
    pub text: String,
    pub actions: Vec<ActionButton>,
}

/// Records everything sent and plays back scripted send and deletion results.
#[derive(Default)]
pub struct MockTransport {
    sent: Mutex<Vec<SentMessage>>,
    admins: DashSet<(u64, u64)>,
    group_admins: DashMap<u64, Vec<u64>>,
    delete_script: DashMap<u64, VecDeque<Result<(), TransportError>>>,
    delete_calls: DashMap<u64, u32>,
    admin_lookup_fails: AtomicBool,
    /// Remaining sends that fail before anything is recorded.
    failing_sends: AtomicU32,
}

impl MockTransport {
    pub fn grant_admin(&self, group_id: u64, user_id: u64) {
        self.admins.insert((group_id, user_id));
    }

    pub fn set_group_admins(&self, group_id: u64, users: Vec<u64>) {
        self.group_admins.insert(group_id, users);
    }

    pub fn fail_admin_lookups(&self) {
        self.admin_lookup_fails.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_sends(&self, count: u32) {
        self.failing_sends.store(count, Ordering::SeqCst);
    }

    /// Queue results for successive delete attempts of one message.
    /// Once the script runs out, deletes succeed.
    pub fn script_delete(&self, message_id: u64, results: Vec<Result<(), TransportError>>) {
        self.delete_script.insert(message_id, results.into());
    }

    pub fn delete_attempts(&self, message_id: u64) -> u32 {
        self.delete_calls.get(&message_id).map(|n| *n).unwrap_or(0)
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn sent_to(&self, target: Target) -> Vec<SentMessage> {
        self.sent()
            .into_iter()
            .filter(|m| m.target == target)
            .collect()
    }
}

#[async_trait]
impl MessagingTransport for MockTransport {
    async fn send(
        &self,
        target: Target,
        text: &str,
        actions: &[ActionButton],
    ) -> Result<(), TransportError> {
        let failing = self
            .failing_sends
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(TransportError::Other("send failed".to_string()));
        }
        self.sent.lock().unwrap().push(SentMessage {
            target,
            text: text.to_string(),
            actions: actions.to_vec(),
        });
        Ok(())
    }

    async fn delete(&self, _group_id: u64, message_id: u64) -> Result<(), TransportError> {
        *self.delete_calls.entry(message_id).or_insert(0) += 1;
        match self.delete_script.get_mut(&message_id) {
            Some(mut script) => script.pop_front().unwrap_or(Ok(())),
            None => Ok(()),
        }
    }

    async fn is_administrator(&self, group_id: u64, user_id: u64) -> Result<bool, TransportError> {
        if self.admin_lookup_fails.load(Ordering::SeqCst) {
            return Err(TransportError::Other("lookup failed".to_string()));
        }
        Ok(self.admins.contains(&(group_id, user_id)))
    }

    async fn group_administrators(&self, group_id: u64) -> Result<Vec<u64>, TransportError> {
        Ok(self
            .group_admins
            .get(&group_id)
            .map(|u| u.clone())
            .unwrap_or_default())
    }
}
