// Application registry - the workflow a channel goes through to earn
// speaking rights in a group.
//
// submit -> claim -> (reason) -> verify -> approve | reject
//
// Every transition is a conditional write in the store. Two racing callers
// can both read the same row, but only one of their writes will match, and
// the loser gets a conflict error instead of silently overwriting.

use super::application_models::{
    ApplicationState, ApplicationStatus, ChannelApplication, ClaimOutcome, Decision,
    NewApplication, UserState,
};
use crate::core::access::AccessPolicy;
use crate::core::clock::Clock;
use crate::core::transport::{ActionButton, ActionKind, MessagingTransport, Target, WorkflowAction};
use crate::core::whitelist::WhitelistEntry;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("This channel already has a pending application")]
    AlreadyPending,

    #[error("This application has already been claimed by someone else")]
    AlreadyClaimed,

    #[error("This application has already been decided")]
    AlreadyDecided,

    #[error("No pending application found for this channel")]
    NotFound,

    #[error("{0}")]
    InvalidState(String),

    #[error("Only group administrators can review applications")]
    NotAuthorized,
}

impl ApplicationError {
    /// Workflow conflicts are shown to the user as-is and never retried.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            ApplicationError::AlreadyPending
                | ApplicationError::AlreadyClaimed
                | ApplicationError::AlreadyDecided
        )
    }
}

// ============================================================================
// STORAGE TRAITS (PORTS)
// ============================================================================

#[async_trait]
pub trait ApplicationStore: Send + Sync {
    /// The slot for the pair, whatever its status.
    async fn get(
        &self,
        group_id: u64,
        channel_id: u64,
    ) -> Result<Option<ChannelApplication>, ApplicationError>;

    async fn list_pending(&self, group_id: u64) -> Result<Vec<ChannelApplication>, ApplicationError>;

    /// Create a pending slot, or reopen a terminal one as unclaimed and
    /// unverified. Returns false (and changes nothing) if the slot is
    /// already pending.
    async fn open(&self, application: NewApplication) -> Result<bool, ApplicationError>;

    /// Set the claimant (and the reason, if given) only when the slot is
    /// pending and unclaimed or already claimed by `user_id`. With `verify`
    /// the same write also marks ownership confirmed, and it only matches a
    /// slot that is not verified yet.
    async fn claim(
        &self,
        group_id: u64,
        channel_id: u64,
        user_id: u64,
        reason: Option<&str>,
        verify: bool,
    ) -> Result<bool, ApplicationError>;

    /// Mark verified only when pending, claimed by `user_id`, and not yet verified.
    async fn mark_verified(
        &self,
        group_id: u64,
        channel_id: u64,
        user_id: u64,
    ) -> Result<bool, ApplicationError>;

    /// Move a pending, verified slot to its terminal status. When an entry is
    /// given it is whitelisted in the same transaction.
    async fn finalize(
        &self,
        group_id: u64,
        channel_id: u64,
        decision: Decision,
        whitelist_entry: Option<WhitelistEntry>,
    ) -> Result<bool, ApplicationError>;

    async fn set_last_prompt_date(
        &self,
        group_id: u64,
        channel_id: u64,
        day: NaiveDate,
    ) -> Result<(), ApplicationError>;
}

#[async_trait]
pub trait UserStateStore: Send + Sync {
    async fn get(&self, user_id: u64) -> Result<UserState, ApplicationError>;

    /// Overwrites the previous state. Idle clears it.
    async fn set(&self, user_id: u64, state: UserState) -> Result<(), ApplicationError>;

    /// Users currently asked for a reason for this pair.
    async fn awaiting_reason(
        &self,
        group_id: u64,
        channel_id: u64,
    ) -> Result<Vec<u64>, ApplicationError>;
}

// ============================================================================
// CORE SERVICE
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct RegistryOptions {
    /// When false, a claim verifies ownership in the same step.
    pub require_ownership_verification: bool,
}

pub struct ApplicationRegistry<A: ApplicationStore, U: UserStateStore> {
    applications: A,
    user_states: U,
    access: Arc<AccessPolicy>,
    transport: Arc<dyn MessagingTransport>,
    clock: Arc<dyn Clock>,
    options: RegistryOptions,
}

impl<A: ApplicationStore, U: UserStateStore> ApplicationRegistry<A, U> {
    pub fn new(
        applications: A,
        user_states: U,
        access: Arc<AccessPolicy>,
        transport: Arc<dyn MessagingTransport>,
        clock: Arc<dyn Clock>,
        options: RegistryOptions,
    ) -> Self {
        Self {
            applications,
            user_states,
            access,
            transport,
            clock,
            options,
        }
    }

    pub fn requires_verification(&self) -> bool {
        self.options.require_ownership_verification
    }

    /// The pending application for the pair, if any.
    pub async fn pending(
        &self,
        group_id: u64,
        channel_id: u64,
    ) -> Result<Option<ChannelApplication>, ApplicationError> {
        Ok(self
            .applications
            .get(group_id, channel_id)
            .await?
            .filter(ChannelApplication::is_pending))
    }

    pub async fn list_pending(&self, group_id: u64) -> Result<Vec<ChannelApplication>, ApplicationError> {
        self.applications.list_pending(group_id).await
    }

    pub async fn state(&self, group_id: u64, channel_id: u64) -> Result<ApplicationState, ApplicationError> {
        let Some(app) = self.applications.get(group_id, channel_id).await? else {
            return Ok(ApplicationState::None);
        };

        Ok(match app.status {
            ApplicationStatus::Approved => ApplicationState::Approved,
            ApplicationStatus::Rejected => ApplicationState::Rejected,
            ApplicationStatus::Pending if app.verified => ApplicationState::PendingVerified {
                claimant: app.claimant_user_id,
            },
            ApplicationStatus::Pending if app.is_claimed() => ApplicationState::PendingClaimed {
                claimant: app.claimant_user_id,
            },
            ApplicationStatus::Pending => {
                let waiting = self.user_states.awaiting_reason(group_id, channel_id).await?;
                match waiting.first() {
                    Some(&user_id) => ApplicationState::PendingAwaitingReason { user_id },
                    None => ApplicationState::PendingUnclaimed,
                }
            }
        })
    }

    /// The (group, channel) the user was asked to give a reason for, if any.
    pub async fn reason_request_for(&self, user_id: u64) -> Result<Option<(u64, u64)>, ApplicationError> {
        Ok(match self.user_states.get(user_id).await? {
            UserState::AwaitingReason {
                group_id,
                channel_id,
            } => Some((group_id, channel_id)),
            UserState::Idle => None,
        })
    }

    // ------------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------------

    pub async fn submit(
        &self,
        group_id: u64,
        channel_id: u64,
        channel_title: &str,
        reason: &str,
    ) -> Result<ChannelApplication, ApplicationError> {
        let opened = self
            .applications
            .open(NewApplication {
                group_id,
                channel_id,
                channel_title: channel_title.to_string(),
                reason: reason.trim().to_string(),
                applied_at: self.clock.now_utc(),
            })
            .await?;

        if !opened {
            return Err(ApplicationError::AlreadyPending);
        }

        let app = self.require_pending(group_id, channel_id).await?;
        tracing::info!(group_id, channel_id, "Channel application submitted");

        let reason = if app.has_reason() {
            app.reason.as_str()
        } else {
            "(none given)"
        };
        let text = format!(
            "Channel \"{}\" has applied to post in this group.\nReason: {}\nIf you own this channel, press Claim to take over the application.",
            app.channel_title, reason
        );
        self.send_quietly(
            Target::Group(group_id),
            &text,
            &[ActionButton::new(
                "Claim",
                WorkflowAction::new(ActionKind::Claim, group_id, channel_id),
            )],
        )
        .await;

        Ok(app)
    }

    pub async fn claim(
        &self,
        group_id: u64,
        channel_id: u64,
        user_id: u64,
    ) -> Result<ClaimOutcome, ApplicationError> {
        let app = self.require_pending(group_id, channel_id).await?;

        if app.is_claimed() && app.claimant_user_id != user_id {
            return Err(ApplicationError::AlreadyClaimed);
        }
        if app.verified {
            return Err(ApplicationError::InvalidState(
                "You have already claimed and verified this application".to_string(),
            ));
        }

        if !app.has_reason() {
            self.user_states
                .set(
                    user_id,
                    UserState::AwaitingReason {
                        group_id,
                        channel_id,
                    },
                )
                .await?;

            let text = format!(
                "Channel \"{}\" did not say why it wants to post. Reply here with a short reason to continue your claim.",
                app.channel_title
            );
            self.send_quietly(Target::User(user_id), &text, &[]).await;

            tracing::info!(group_id, channel_id, user_id, "Claim waiting for a reason");
            return Ok(ClaimOutcome::AwaitingReason);
        }

        self.complete_claim(group_id, channel_id, user_id, None).await
    }

    pub async fn supply_reason(
        &self,
        group_id: u64,
        channel_id: u64,
        user_id: u64,
        reason: &str,
    ) -> Result<ClaimOutcome, ApplicationError> {
        match self.user_states.get(user_id).await? {
            UserState::AwaitingReason {
                group_id: g,
                channel_id: c,
            } if g == group_id && c == channel_id => {}
            _ => {
                return Err(ApplicationError::InvalidState(
                    "No reason was requested from you for this application".to_string(),
                ))
            }
        }

        let reason = reason.trim();
        if reason.is_empty() {
            return Err(ApplicationError::InvalidState(
                "The reason cannot be empty".to_string(),
            ));
        }

        let result = self
            .complete_claim(group_id, channel_id, user_id, Some(reason))
            .await;

        // Storage failures keep the cursor so the user can simply try again.
        if !matches!(result, Err(ApplicationError::StorageError(_))) {
            self.user_states.set(user_id, UserState::Idle).await?;
        }
        result
    }

    pub async fn verify(
        &self,
        group_id: u64,
        channel_id: u64,
        user_id: u64,
    ) -> Result<ChannelApplication, ApplicationError> {
        let app = self.require_pending(group_id, channel_id).await?;

        if !app.is_claimed() {
            return Err(ApplicationError::InvalidState(
                "This application has not been claimed yet".to_string(),
            ));
        }
        if app.claimant_user_id != user_id {
            return Err(ApplicationError::AlreadyClaimed);
        }
        if app.verified {
            return Err(ApplicationError::InvalidState(
                "Ownership has already been confirmed".to_string(),
            ));
        }

        self.mark_verified(group_id, channel_id, user_id).await
    }

    pub async fn decide(
        &self,
        group_id: u64,
        channel_id: u64,
        decision: Decision,
        acting_admin: u64,
    ) -> Result<ChannelApplication, ApplicationError> {
        if !self.access.is_admin(group_id, acting_admin).await {
            return Err(ApplicationError::NotAuthorized);
        }

        let app = match self.applications.get(group_id, channel_id).await? {
            None => return Err(ApplicationError::NotFound),
            Some(app) if app.status.is_terminal() => return Err(ApplicationError::AlreadyDecided),
            Some(app) => app,
        };
        if !app.verified {
            return Err(ApplicationError::InvalidState(
                "The claimant has not confirmed ownership yet".to_string(),
            ));
        }

        let entry = match decision {
            Decision::Approve => Some(WhitelistEntry {
                group_id,
                channel_id,
                channel_title: app.channel_title.clone(),
                added_by: acting_admin,
                added_at: self.clock.now_utc(),
            }),
            Decision::Reject => None,
        };

        if !self
            .applications
            .finalize(group_id, channel_id, decision, entry)
            .await?
        {
            return Err(self.conflict_for(group_id, channel_id, acting_admin).await);
        }

        let app = ChannelApplication {
            status: decision.resulting_status(),
            ..app
        };
        tracing::info!(
            group_id,
            channel_id,
            acting_admin,
            status = %app.status,
            "Channel application decided"
        );

        self.announce_decision(&app).await;
        Ok(app)
    }

    /// Remember that a "pending application" notice went out today.
    pub async fn record_prompt_date(&self, group_id: u64, channel_id: u64) -> Result<(), ApplicationError> {
        self.applications
            .set_last_prompt_date(group_id, channel_id, self.clock.today())
            .await
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    async fn require_pending(
        &self,
        group_id: u64,
        channel_id: u64,
    ) -> Result<ChannelApplication, ApplicationError> {
        self.pending(group_id, channel_id)
            .await?
            .ok_or(ApplicationError::NotFound)
    }

    async fn complete_claim(
        &self,
        group_id: u64,
        channel_id: u64,
        user_id: u64,
        reason: Option<&str>,
    ) -> Result<ClaimOutcome, ApplicationError> {
        let verify = !self.options.require_ownership_verification;
        if !self
            .applications
            .claim(group_id, channel_id, user_id, reason, verify)
            .await?
        {
            return Err(self.conflict_for(group_id, channel_id, user_id).await);
        }
        tracing::info!(group_id, channel_id, user_id, verify, "Channel application claimed");

        let app = self.require_pending(group_id, channel_id).await?;
        if verify {
            self.notify_reviewers(&app).await;
            return Ok(ClaimOutcome::Verified(app));
        }

        let text = format!(
            "You claimed the application for channel \"{}\". Press the button to confirm you own it.",
            app.channel_title
        );
        self.send_quietly(
            Target::User(user_id),
            &text,
            &[ActionButton::new(
                "Confirm ownership",
                WorkflowAction::new(ActionKind::Verify, group_id, channel_id),
            )],
        )
        .await;

        Ok(ClaimOutcome::Claimed(app))
    }

    async fn mark_verified(
        &self,
        group_id: u64,
        channel_id: u64,
        user_id: u64,
    ) -> Result<ChannelApplication, ApplicationError> {
        if !self
            .applications
            .mark_verified(group_id, channel_id, user_id)
            .await?
        {
            return Err(self.conflict_for(group_id, channel_id, user_id).await);
        }

        let app = self.require_pending(group_id, channel_id).await?;
        tracing::info!(group_id, channel_id, user_id, "Channel ownership verified");

        self.notify_reviewers(&app).await;
        Ok(app)
    }

    /// Work out why a conditional write matched nothing.
    async fn conflict_for(&self, group_id: u64, channel_id: u64, user_id: u64) -> ApplicationError {
        match self.applications.get(group_id, channel_id).await {
            Ok(Some(app)) if app.status.is_terminal() => ApplicationError::AlreadyDecided,
            Ok(Some(app)) if app.is_claimed() && app.claimant_user_id != user_id => {
                ApplicationError::AlreadyClaimed
            }
            Ok(Some(app)) if app.verified => ApplicationError::InvalidState(
                "Ownership has already been confirmed".to_string(),
            ),
            Ok(_) => ApplicationError::NotFound,
            Err(err) => err,
        }
    }

    async fn notify_reviewers(&self, app: &ChannelApplication) {
        let mut reviewers: BTreeSet<u64> = self.access.privileged_users().collect();
        match self.transport.group_administrators(app.group_id).await {
            Ok(admins) => reviewers.extend(admins),
            Err(err) => tracing::warn!(
                group_id = app.group_id,
                error = %err,
                "Could not look up group administrators"
            ),
        }

        if reviewers.is_empty() {
            tracing::warn!(
                group_id = app.group_id,
                channel_id = app.channel_id,
                "Verified application has nobody to review it"
            );
            return;
        }

        let text = format!(
            "Channel \"{}\" ({}) is asking to post in group {}.\nClaimed by user {}.\nReason: {}",
            app.channel_title, app.channel_id, app.group_id, app.claimant_user_id, app.reason
        );
        let buttons = [
            ActionButton::new(
                "Approve",
                WorkflowAction::new(ActionKind::Approve, app.group_id, app.channel_id),
            ),
            ActionButton::new(
                "Reject",
                WorkflowAction::new(ActionKind::Reject, app.group_id, app.channel_id),
            ),
        ];

        for reviewer in reviewers {
            self.send_quietly(Target::User(reviewer), &text, &buttons).await;
        }
    }

    async fn announce_decision(&self, app: &ChannelApplication) {
        let (claimant_text, group_text) = match app.status {
            ApplicationStatus::Approved => (
                format!(
                    "Your application for channel \"{}\" was approved. It can now post in the group.",
                    app.channel_title
                ),
                format!("Channel \"{}\" has been approved and can now post here.", app.channel_title),
            ),
            _ => (
                format!("Your application for channel \"{}\" was rejected.", app.channel_title),
                format!("The application from channel \"{}\" was rejected.", app.channel_title),
            ),
        };

        if app.is_claimed() {
            self.send_quietly(Target::User(app.claimant_user_id), &claimant_text, &[])
                .await;
        }
        self.send_quietly(Target::Group(app.group_id), &group_text, &[])
            .await;
    }

    async fn send_quietly(&self, target: Target, text: &str, actions: &[ActionButton]) {
        if let Err(err) = self.transport.send(target, text, actions).await {
            tracing::warn!(?target, error = %err, "Failed to deliver workflow message");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::FixedClock;
    use crate::core::testing::{InMemoryStore, MockTransport};
    use crate::core::whitelist::WhitelistStore;

    const GROUP: u64 = 1;
    const CHANNEL: u64 = 10;
    const ADMIN: u64 = 100;
    const U: u64 = 20;
    const V: u64 = 21;

    struct Harness {
        registry: ApplicationRegistry<InMemoryStore, InMemoryStore>,
        store: InMemoryStore,
        transport: Arc<MockTransport>,
    }

    fn harness(require_verification: bool) -> Harness {
        let store = InMemoryStore::default();
        let transport = Arc::new(MockTransport::default());
        let access = Arc::new(AccessPolicy::new([ADMIN], transport.clone()));
        let registry = ApplicationRegistry::new(
            store.clone(),
            store.clone(),
            access,
            transport.clone(),
            Arc::new(FixedClock::at(2024, 5, 1, 12, 0)),
            RegistryOptions {
                require_ownership_verification: require_verification,
            },
        );
        Harness {
            registry,
            store,
            transport,
        }
    }

    #[tokio::test]
    async fn test_submit_twice_is_already_pending() {
        let h = harness(true);

        h.registry.submit(GROUP, CHANNEL, "news", "daily news").await.unwrap();
        let err = h
            .registry
            .submit(GROUP, CHANNEL, "news", "again")
            .await
            .unwrap_err();

        assert!(matches!(err, ApplicationError::AlreadyPending));
        assert_eq!(h.registry.list_pending(GROUP).await.unwrap().len(), 1);
        // Only the first submission was announced.
        assert_eq!(h.transport.sent_to(Target::Group(GROUP)).len(), 1);
    }

    #[tokio::test]
    async fn test_full_approval_flow() {
        let h = harness(true);

        h.registry
            .submit(GROUP, CHANNEL, "news", "news outlet")
            .await
            .unwrap();

        let outcome = h.registry.claim(GROUP, CHANNEL, U).await.unwrap();
        assert!(matches!(outcome, ClaimOutcome::Claimed(_)));
        assert_eq!(
            h.registry.state(GROUP, CHANNEL).await.unwrap(),
            ApplicationState::PendingClaimed { claimant: U }
        );

        h.registry.verify(GROUP, CHANNEL, U).await.unwrap();
        assert_eq!(
            h.registry.state(GROUP, CHANNEL).await.unwrap(),
            ApplicationState::PendingVerified { claimant: U }
        );
        // The privileged admin was asked to review.
        assert_eq!(h.transport.sent_to(Target::User(ADMIN)).len(), 1);

        let group_before = h.transport.sent_to(Target::Group(GROUP)).len();
        let user_before = h.transport.sent_to(Target::User(U)).len();

        let app = h
            .registry
            .decide(GROUP, CHANNEL, Decision::Approve, ADMIN)
            .await
            .unwrap();

        assert_eq!(app.status, ApplicationStatus::Approved);
        assert!(h.store.is_whitelisted(GROUP, CHANNEL).await.unwrap());
        assert_eq!(
            h.registry.state(GROUP, CHANNEL).await.unwrap(),
            ApplicationState::Approved
        );
        assert_eq!(h.transport.sent_to(Target::Group(GROUP)).len(), group_before + 1);
        assert_eq!(h.transport.sent_to(Target::User(U)).len(), user_before + 1);
    }

    #[tokio::test]
    async fn test_second_decision_does_not_renotify() {
        let h = harness(false);

        h.registry.submit(GROUP, CHANNEL, "news", "reason").await.unwrap();
        h.registry.claim(GROUP, CHANNEL, U).await.unwrap();
        h.registry
            .decide(GROUP, CHANNEL, Decision::Reject, ADMIN)
            .await
            .unwrap();

        let sent = h.transport.sent_count();
        let err = h
            .registry
            .decide(GROUP, CHANNEL, Decision::Approve, ADMIN)
            .await
            .unwrap_err();

        assert!(matches!(err, ApplicationError::AlreadyDecided));
        assert_eq!(h.transport.sent_count(), sent);
        assert!(!h.store.is_whitelisted(GROUP, CHANNEL).await.unwrap());
    }

    #[tokio::test]
    async fn test_empty_reason_goes_through_private_reason_step() {
        let h = harness(true);

        h.registry.submit(GROUP, CHANNEL, "fans", "").await.unwrap();

        let outcome = h.registry.claim(GROUP, CHANNEL, U).await.unwrap();
        assert_eq!(outcome, ClaimOutcome::AwaitingReason);
        assert_eq!(
            h.registry.state(GROUP, CHANNEL).await.unwrap(),
            ApplicationState::PendingAwaitingReason { user_id: U }
        );
        assert_eq!(
            h.registry.reason_request_for(U).await.unwrap(),
            Some((GROUP, CHANNEL))
        );

        let outcome = h
            .registry
            .supply_reason(GROUP, CHANNEL, U, "fan page")
            .await
            .unwrap();
        match outcome {
            ClaimOutcome::Claimed(app) => assert_eq!(app.reason, "fan page"),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(
            h.registry.state(GROUP, CHANNEL).await.unwrap(),
            ApplicationState::PendingClaimed { claimant: U }
        );
        assert_eq!(h.registry.reason_request_for(U).await.unwrap(), None);

        h.registry.verify(GROUP, CHANNEL, U).await.unwrap();
        assert_eq!(
            h.registry.state(GROUP, CHANNEL).await.unwrap(),
            ApplicationState::PendingVerified { claimant: U }
        );
    }

    #[tokio::test]
    async fn test_supply_reason_without_request_is_invalid() {
        let h = harness(true);
        h.registry.submit(GROUP, CHANNEL, "fans", "").await.unwrap();

        let err = h
            .registry
            .supply_reason(GROUP, CHANNEL, U, "fan page")
            .await
            .unwrap_err();
        assert!(matches!(err, ApplicationError::InvalidState(_)));
        assert_eq!(
            h.registry.state(GROUP, CHANNEL).await.unwrap(),
            ApplicationState::PendingUnclaimed
        );
    }

    #[tokio::test]
    async fn test_claim_by_other_user_is_rejected() {
        let h = harness(true);

        h.registry.submit(GROUP, CHANNEL, "news", "reason").await.unwrap();
        h.registry.claim(GROUP, CHANNEL, U).await.unwrap();

        let err = h.registry.claim(GROUP, CHANNEL, V).await.unwrap_err();
        assert!(matches!(err, ApplicationError::AlreadyClaimed));
        assert_eq!(
            h.registry.state(GROUP, CHANNEL).await.unwrap(),
            ApplicationState::PendingClaimed { claimant: U }
        );

        let err = h.registry.verify(GROUP, CHANNEL, V).await.unwrap_err();
        assert!(matches!(err, ApplicationError::AlreadyClaimed));
    }

    #[tokio::test]
    async fn test_concurrent_claims_have_one_winner() {
        let h = harness(true);
        h.registry.submit(GROUP, CHANNEL, "news", "reason").await.unwrap();

        let (a, b) = tokio::join!(
            h.registry.claim(GROUP, CHANNEL, U),
            h.registry.claim(GROUP, CHANNEL, V)
        );

        let results = [a, b];
        let wins = results.iter().filter(|r| r.is_ok()).count();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Err(ApplicationError::AlreadyClaimed)))
            .count();
        assert_eq!(wins, 1);
        assert_eq!(conflicts, 1);
    }

    #[tokio::test]
    async fn test_racing_reason_replies_have_one_winner() {
        let h = harness(true);
        h.registry.submit(GROUP, CHANNEL, "fans", "").await.unwrap();
        h.registry.claim(GROUP, CHANNEL, U).await.unwrap();
        h.registry.claim(GROUP, CHANNEL, V).await.unwrap();

        h.registry
            .supply_reason(GROUP, CHANNEL, U, "mine")
            .await
            .unwrap();
        let err = h
            .registry
            .supply_reason(GROUP, CHANNEL, V, "no, mine")
            .await
            .unwrap_err();

        assert!(matches!(err, ApplicationError::AlreadyClaimed));
        let app = h.registry.pending(GROUP, CHANNEL).await.unwrap().unwrap();
        assert_eq!(app.reason, "mine");
        assert_eq!(app.claimant_user_id, U);
        assert_eq!(h.registry.reason_request_for(V).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_decide_requires_admin_and_verification() {
        let h = harness(true);
        h.registry.submit(GROUP, CHANNEL, "news", "reason").await.unwrap();
        h.registry.claim(GROUP, CHANNEL, U).await.unwrap();

        let err = h
            .registry
            .decide(GROUP, CHANNEL, Decision::Approve, ADMIN)
            .await
            .unwrap_err();
        assert!(matches!(err, ApplicationError::InvalidState(_)));

        h.registry.verify(GROUP, CHANNEL, U).await.unwrap();
        let err = h
            .registry
            .decide(GROUP, CHANNEL, Decision::Approve, U)
            .await
            .unwrap_err();
        assert!(matches!(err, ApplicationError::NotAuthorized));

        h.transport.grant_admin(GROUP, U);
        h.registry
            .decide(GROUP, CHANNEL, Decision::Approve, U)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_claim_verifies_immediately_when_not_required() {
        let h = harness(false);
        h.transport.set_group_admins(GROUP, vec![ADMIN, 300]);
        h.registry.submit(GROUP, CHANNEL, "news", "reason").await.unwrap();

        let outcome = h.registry.claim(GROUP, CHANNEL, U).await.unwrap();
        assert!(matches!(outcome, ClaimOutcome::Verified(_)));
        assert_eq!(
            h.registry.state(GROUP, CHANNEL).await.unwrap(),
            ApplicationState::PendingVerified { claimant: U }
        );

        // Privileged and platform admins overlap; each hears about it once.
        assert_eq!(h.transport.sent_to(Target::User(ADMIN)).len(), 1);
        assert_eq!(h.transport.sent_to(Target::User(300)).len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_claims_without_verification_notify_once() {
        let h = harness(false);
        h.registry.submit(GROUP, CHANNEL, "news", "reason").await.unwrap();

        let (a, b, c) = tokio::join!(
            h.registry.claim(GROUP, CHANNEL, U),
            h.registry.claim(GROUP, CHANNEL, U),
            h.registry.claim(GROUP, CHANNEL, V)
        );

        let verified = [&a, &b, &c]
            .iter()
            .filter(|r| matches!(r, Ok(ClaimOutcome::Verified(_))))
            .count();
        assert_eq!(verified, 1);
        assert!(c.is_err());
        assert_eq!(
            h.registry.state(GROUP, CHANNEL).await.unwrap(),
            ApplicationState::PendingVerified { claimant: U }
        );
        assert_eq!(h.transport.sent_to(Target::User(ADMIN)).len(), 1);
    }

    #[tokio::test]
    async fn test_resubmission_reopens_rejected_slot() {
        let h = harness(false);
        h.registry.submit(GROUP, CHANNEL, "news", "first").await.unwrap();
        h.registry.claim(GROUP, CHANNEL, U).await.unwrap();
        h.registry
            .decide(GROUP, CHANNEL, Decision::Reject, ADMIN)
            .await
            .unwrap();

        let app = h
            .registry
            .submit(GROUP, CHANNEL, "news", "second")
            .await
            .unwrap();

        assert_eq!(app.reason, "second");
        assert_eq!(app.claimant_user_id, 0);
        assert!(!app.verified);
        assert_eq!(
            h.registry.state(GROUP, CHANNEL).await.unwrap(),
            ApplicationState::PendingUnclaimed
        );
    }
}
