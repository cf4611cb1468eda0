// Moderation gate - decides what happens to every post in a moderated group.
//
// Only channel posts in groups with moderation enabled are judged.
// Whitelisted channels pass. Anything else is
// suppressed: the post is queued for deletion and for the audit log, and at
// most one notice per kind per day explains why. Application requests are
// handed to the registry instead of being suppressed.
//
// Deletion and audit logging are fire-and-forget. Nothing that happens to
// them can change a verdict that has already been returned.

use super::gate_models::{Post, Sender, Verdict};
use crate::core::applications::{
    ApplicationError, ApplicationRegistry, ApplicationStore, UserStateStore,
};
use crate::core::deletion::{DeletionJob, DeletionQueue};
use crate::core::recorder::{BlockedMessage, MessageBuffer};
use crate::core::settings::{SettingsError, SettingsService, SettingsStore};
use crate::core::throttle::{DailyPromptThrottle, NoticeKind, PromptStore, ThrottleError};
use crate::core::transport::{MessagingTransport, Target};
use crate::core::whitelist::{WhitelistError, WhitelistService, WhitelistStore};
use std::sync::Arc;
use thiserror::Error;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum GateError {
    #[error(transparent)]
    Whitelist(#[from] WhitelistError),

    #[error(transparent)]
    Application(#[from] ApplicationError),

    #[error(transparent)]
    Throttle(#[from] ThrottleError),

    #[error(transparent)]
    Settings(#[from] SettingsError),
}

// ============================================================================
// CORE SERVICE
// ============================================================================

pub struct ModerationGate<W, A, U, P, G>
where
    W: WhitelistStore,
    A: ApplicationStore,
    U: UserStateStore,
    P: PromptStore,
    G: SettingsStore,
{
    settings: Arc<SettingsService<G>>,
    whitelist: Arc<WhitelistService<W>>,
    registry: Arc<ApplicationRegistry<A, U>>,
    throttle: Arc<DailyPromptThrottle<P>>,
    blocked: MessageBuffer,
    deletions: DeletionQueue,
    transport: Arc<dyn MessagingTransport>,
}

impl<W, A, U, P, G> ModerationGate<W, A, U, P, G>
where
    W: WhitelistStore,
    A: ApplicationStore,
    U: UserStateStore,
    P: PromptStore,
    G: SettingsStore,
{
    pub fn new(
        settings: Arc<SettingsService<G>>,
        whitelist: Arc<WhitelistService<W>>,
        registry: Arc<ApplicationRegistry<A, U>>,
        throttle: Arc<DailyPromptThrottle<P>>,
        blocked: MessageBuffer,
        deletions: DeletionQueue,
        transport: Arc<dyn MessagingTransport>,
    ) -> Self {
        Self {
            settings,
            whitelist,
            registry,
            throttle,
            blocked,
            deletions,
            transport,
        }
    }

    pub async fn evaluate(&self, post: &Post) -> Result<Verdict, GateError> {
        let Sender::Channel { channel_id, title } = &post.sender else {
            return Ok(Verdict::NotApplicable);
        };
        let (group_id, channel_id) = (post.group_id, *channel_id);

        if !self.settings.is_enabled(group_id).await? {
            return Ok(Verdict::NotApplicable);
        }

        if self.whitelist.is_whitelisted(group_id, channel_id).await? {
            return Ok(Verdict::Allow);
        }

        if let Some(reason) = post.application_reason() {
            match self.registry.submit(group_id, channel_id, title, reason).await {
                Ok(app) => return Ok(Verdict::ApplicationSubmitted(app)),
                // Falls through and is treated like any other post from a
                // channel with a pending application.
                Err(ApplicationError::AlreadyPending) => {}
                Err(err) => return Err(err.into()),
            }
        }

        let kind = match self.registry.pending(group_id, channel_id).await? {
            Some(_) => NoticeKind::PendingApplication,
            None => NoticeKind::NeedsApplication,
        };
        // Most repeats are already recorded; the insert stays the tie-breaker
        // when two posts race for the first notice.
        let first_today = !self.throttle.has_fired(group_id, channel_id, kind).await?
            && self.throttle.record(group_id, channel_id, kind).await?;

        self.dispatch_cleanup(post, channel_id);

        if !first_today {
            tracing::debug!(group_id, channel_id, %kind, "Suppressed post without notice");
            return Ok(Verdict::Suppressed { notice: None });
        }

        let delivered = self.send_notice(group_id, channel_id, title, kind).await;
        Ok(Verdict::Suppressed {
            notice: delivered.then_some(kind),
        })
    }

    fn dispatch_cleanup(&self, post: &Post, channel_id: u64) {
        self.deletions.enqueue(DeletionJob {
            group_id: post.group_id,
            message_id: post.message_id,
        });
        self.blocked.push(BlockedMessage::new(
            post.group_id,
            channel_id,
            post.message_id,
            &post.text,
            post.sent_at,
        ));
    }

    /// Returns whether the notice reached the group. An undelivered notice
    /// gives today's slot back to the throttle.
    async fn send_notice(
        &self,
        group_id: u64,
        channel_id: u64,
        title: &str,
        kind: NoticeKind,
    ) -> bool {
        let text = match kind {
            NoticeKind::NeedsApplication => format!(
                "Channel \"{title}\" is not allowed to post in this group, so its message was removed. \
                 To request access, post `/apply <reason>` from the channel."
            ),
            NoticeKind::PendingApplication => format!(
                "Channel \"{title}\" already has an application waiting for review. \
                 Its messages will be removed until an administrator decides."
            ),
        };

        if let Err(err) = self.transport.send(Target::Group(group_id), &text, &[]).await {
            tracing::warn!(group_id, channel_id, %kind, error = %err, "Failed to send notice");
            if let Err(err) = self.throttle.release(group_id, channel_id, kind).await {
                tracing::warn!(group_id, channel_id, %kind, error = %err, "Failed to release notice slot");
            }
            return false;
        }

        if kind == NoticeKind::PendingApplication {
            if let Err(err) = self.registry.record_prompt_date(group_id, channel_id).await {
                tracing::warn!(group_id, channel_id, error = %err, "Failed to record prompt date");
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::access::AccessPolicy;
    use crate::core::applications::{ApplicationStatus, ClaimOutcome, Decision, RegistryOptions};
    use crate::core::clock::{Clock, FixedClock};
    use crate::core::deletion::DeletionInbox;
    use crate::core::testing::{InMemoryStore, MockTransport};
    use chrono::Utc;

    const GROUP: u64 = 1;
    const CHANNEL: u64 = 10;
    const ADMIN: u64 = 100;

    type Gate = ModerationGate<
        InMemoryStore,
        InMemoryStore,
        InMemoryStore,
        InMemoryStore,
        InMemoryStore,
    >;

    struct Harness {
        gate: Gate,
        registry: Arc<ApplicationRegistry<InMemoryStore, InMemoryStore>>,
        whitelist: Arc<WhitelistService<InMemoryStore>>,
        settings: Arc<SettingsService<InMemoryStore>>,
        transport: Arc<MockTransport>,
        store: InMemoryStore,
        clock: Arc<FixedClock>,
        blocked: MessageBuffer,
        inbox: DeletionInbox,
        next_message: u64,
    }

    impl Harness {
        fn new() -> Self {
            let store = InMemoryStore::default();
            let transport = Arc::new(MockTransport::default());
            let clock = Arc::new(FixedClock::at(2024, 5, 1, 10, 0));
            let access = Arc::new(AccessPolicy::new([ADMIN], transport.clone()));

            let settings = Arc::new(SettingsService::new(
                store.clone(),
                access.clone(),
                clock.clone(),
            ));
            let whitelist = Arc::new(WhitelistService::new(
                store.clone(),
                access.clone(),
                clock.clone(),
                true,
            ));
            let registry = Arc::new(ApplicationRegistry::new(
                store.clone(),
                store.clone(),
                access,
                transport.clone(),
                clock.clone(),
                RegistryOptions {
                    require_ownership_verification: true,
                },
            ));
            let throttle = Arc::new(DailyPromptThrottle::new(store.clone(), clock.clone()));
            let blocked = MessageBuffer::default();
            let (deletions, inbox) = DeletionQueue::bounded(64);

            let gate = ModerationGate::new(
                settings.clone(),
                whitelist.clone(),
                registry.clone(),
                throttle,
                blocked.clone(),
                deletions,
                transport.clone(),
            );

            Self {
                gate,
                registry,
                whitelist,
                settings,
                transport,
                store,
                clock,
                blocked,
                inbox,
                next_message: 1000,
            }
        }

        fn channel_post(&mut self, text: &str) -> Post {
            self.next_message += 1;
            Post {
                group_id: GROUP,
                message_id: self.next_message,
                sender: Sender::Channel {
                    channel_id: CHANNEL,
                    title: "Daily News".into(),
                },
                text: text.into(),
                sent_at: Utc::now(),
            }
        }

        fn queued_deletions(&mut self) -> usize {
            let mut count = 0;
            while self.inbox.try_recv().is_ok() {
                count += 1;
            }
            count
        }
    }

    #[tokio::test]
    async fn test_member_posts_are_not_judged() {
        let h = Harness::new();
        let post = Post {
            group_id: GROUP,
            message_id: 1,
            sender: Sender::User { user_id: 5 },
            text: "hi".into(),
            sent_at: Utc::now(),
        };

        assert_eq!(h.gate.evaluate(&post).await.unwrap(), Verdict::NotApplicable);
        assert!(h.blocked.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_channel_gets_one_notice_per_day() {
        let mut h = Harness::new();

        let first = h.channel_post("buy now");
        assert_eq!(
            h.gate.evaluate(&first).await.unwrap(),
            Verdict::Suppressed {
                notice: Some(NoticeKind::NeedsApplication)
            }
        );

        let second = h.channel_post("buy now!!");
        assert_eq!(
            h.gate.evaluate(&second).await.unwrap(),
            Verdict::Suppressed { notice: None }
        );

        assert_eq!(h.transport.sent_to(Target::Group(GROUP)).len(), 1);
        assert_eq!(h.queued_deletions(), 2);
        assert_eq!(h.blocked.len(), 2);

        // Next day the budget is fresh.
        h.clock.advance(chrono::Duration::days(1));
        let third = h.channel_post("again");
        assert_eq!(
            h.gate.evaluate(&third).await.unwrap(),
            Verdict::Suppressed {
                notice: Some(NoticeKind::NeedsApplication)
            }
        );
    }

    #[tokio::test]
    async fn test_failed_notice_is_retried_by_next_post() {
        let mut h = Harness::new();
        h.transport.fail_next_sends(1);

        let first = h.channel_post("buy now");
        assert_eq!(
            h.gate.evaluate(&first).await.unwrap(),
            Verdict::Suppressed { notice: None }
        );
        assert_eq!(h.store.prompt_count(), 0);
        assert!(h.transport.sent_to(Target::Group(GROUP)).is_empty());

        let second = h.channel_post("buy now!!");
        assert_eq!(
            h.gate.evaluate(&second).await.unwrap(),
            Verdict::Suppressed {
                notice: Some(NoticeKind::NeedsApplication)
            }
        );

        let third = h.channel_post("still here");
        assert_eq!(
            h.gate.evaluate(&third).await.unwrap(),
            Verdict::Suppressed { notice: None }
        );

        assert_eq!(h.transport.sent_to(Target::Group(GROUP)).len(), 1);
        assert_eq!(h.store.prompt_count(), 1);
        // Cleanup never depends on the notice.
        assert_eq!(h.queued_deletions(), 3);
    }

    #[tokio::test]
    async fn test_concurrent_posts_share_one_notice() {
        let mut h = Harness::new();
        let (a, b, c, d) = (
            h.channel_post("spam"),
            h.channel_post("spam"),
            h.channel_post("spam"),
            h.channel_post("spam"),
        );

        let verdicts = tokio::join!(
            h.gate.evaluate(&a),
            h.gate.evaluate(&b),
            h.gate.evaluate(&c),
            h.gate.evaluate(&d),
        );
        let notices = [verdicts.0, verdicts.1, verdicts.2, verdicts.3]
            .into_iter()
            .filter(|v| matches!(v, Ok(Verdict::Suppressed { notice: Some(_) })))
            .count();

        assert_eq!(notices, 1);
        assert_eq!(h.transport.sent_to(Target::Group(GROUP)).len(), 1);
        assert_eq!(h.queued_deletions(), 4);
    }

    #[tokio::test]
    async fn test_disabled_group_is_not_moderated() {
        let mut h = Harness::new();
        h.settings.set_enabled(GROUP, false, ADMIN).await.unwrap();

        let post = h.channel_post("buy now");
        assert_eq!(h.gate.evaluate(&post).await.unwrap(), Verdict::NotApplicable);
        let apply = h.channel_post("/apply news outlet");
        assert_eq!(h.gate.evaluate(&apply).await.unwrap(), Verdict::NotApplicable);

        assert_eq!(h.queued_deletions(), 0);
        assert!(h.blocked.is_empty());
        assert_eq!(h.transport.sent_count(), 0);
        assert_eq!(h.store.prompt_count(), 0);

        h.settings.set_enabled(GROUP, true, ADMIN).await.unwrap();
        let post = h.channel_post("buy now");
        assert_eq!(
            h.gate.evaluate(&post).await.unwrap(),
            Verdict::Suppressed {
                notice: Some(NoticeKind::NeedsApplication)
            }
        );
    }

    #[tokio::test]
    async fn test_whitelisted_channel_is_allowed() {
        let mut h = Harness::new();
        h.whitelist.add(GROUP, CHANNEL, "Daily News", ADMIN).await.unwrap();

        let post = h.channel_post("hello");
        assert_eq!(h.gate.evaluate(&post).await.unwrap(), Verdict::Allow);
        assert_eq!(h.queued_deletions(), 0);
        assert!(h.blocked.is_empty());
        assert_eq!(h.transport.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_apply_request_is_not_suppressed() {
        let mut h = Harness::new();

        let post = h.channel_post("/apply news outlet");
        match h.gate.evaluate(&post).await.unwrap() {
            Verdict::ApplicationSubmitted(app) => {
                assert_eq!(app.reason, "news outlet");
                assert_eq!(app.channel_title, "Daily News");
            }
            other => panic!("unexpected verdict: {other:?}"),
        }
        assert_eq!(h.queued_deletions(), 0);

        // The announcement carries a claim button.
        let announcement = &h.transport.sent_to(Target::Group(GROUP))[0];
        assert_eq!(announcement.actions.len(), 1);
    }

    #[tokio::test]
    async fn test_pending_channel_gets_pending_notice() {
        let mut h = Harness::new();
        let apply = h.channel_post("/apply news outlet");
        h.gate.evaluate(&apply).await.unwrap();

        // Applying again while pending is suppressed like any other post.
        let again = h.channel_post("/apply please");
        assert_eq!(
            h.gate.evaluate(&again).await.unwrap(),
            Verdict::Suppressed {
                notice: Some(NoticeKind::PendingApplication)
            }
        );

        let post = h.channel_post("hello");
        assert_eq!(
            h.gate.evaluate(&post).await.unwrap(),
            Verdict::Suppressed { notice: None }
        );

        let app = h.registry.pending(GROUP, CHANNEL).await.unwrap().unwrap();
        assert_eq!(app.last_prompt_date, Some(h.clock.today()));
        assert_eq!(h.queued_deletions(), 2);
    }

    #[tokio::test]
    async fn test_application_through_approval_unblocks_channel() {
        let mut h = Harness::new();
        let user = 20;

        let apply = h.channel_post("/apply news outlet");
        h.gate.evaluate(&apply).await.unwrap();

        let outcome = h.registry.claim(GROUP, CHANNEL, user).await.unwrap();
        assert!(matches!(outcome, ClaimOutcome::Claimed(_)));
        h.registry.verify(GROUP, CHANNEL, user).await.unwrap();

        let before_user = h.transport.sent_to(Target::User(user)).len();
        let before_group = h.transport.sent_to(Target::Group(GROUP)).len();
        let app = h
            .registry
            .decide(GROUP, CHANNEL, Decision::Approve, ADMIN)
            .await
            .unwrap();
        assert_eq!(app.status, ApplicationStatus::Approved);
        assert_eq!(h.transport.sent_to(Target::User(user)).len(), before_user + 1);
        assert_eq!(h.transport.sent_to(Target::Group(GROUP)).len(), before_group + 1);

        let post = h.channel_post("first real post");
        assert_eq!(h.gate.evaluate(&post).await.unwrap(), Verdict::Allow);
        assert!(h.blocked.is_empty());
    }
}
