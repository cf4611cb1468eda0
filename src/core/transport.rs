// Messaging transport port.
//
// The core never talks to Discord directly. Everything it needs from the
// platform (posting notices, deleting posts, asking who administers a group)
// goes through this trait, and the Discord adapter implements it.

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    #[error("Rate limited by the platform")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Message or conversation not found")]
    NotFound,

    #[error("Missing permissions")]
    Forbidden,

    #[error("Transport error: {0}")]
    Other(String),
}

impl TransportError {
    /// Errors that will never succeed on retry.
    pub fn is_permanent(&self) -> bool {
        matches!(self, TransportError::NotFound | TransportError::Forbidden)
    }
}

// ============================================================================
// MESSAGE TARGETS AND ACTIONS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    /// The group conversation itself.
    Group(u64),
    /// A private conversation with one user.
    User(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Claim,
    Verify,
    Approve,
    Reject,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Claim => "claim",
            ActionKind::Verify => "verify",
            ActionKind::Approve => "approve",
            ActionKind::Reject => "reject",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "claim" => Some(ActionKind::Claim),
            "verify" => Some(ActionKind::Verify),
            "approve" => Some(ActionKind::Approve),
            "reject" => Some(ActionKind::Reject),
            _ => None,
        }
    }
}

/// A workflow step bound to one application, carried by a button.
///
/// Encoded as `<action>:<group>:<channel>` so it fits in a component id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkflowAction {
    pub kind: ActionKind,
    pub group_id: u64,
    pub channel_id: u64,
}

impl WorkflowAction {
    pub fn new(kind: ActionKind, group_id: u64, channel_id: u64) -> Self {
        Self {
            kind,
            group_id,
            channel_id,
        }
    }

    pub fn parse(custom_id: &str) -> Option<Self> {
        let mut parts = custom_id.splitn(3, ':');
        let kind = ActionKind::parse(parts.next()?)?;
        let group_id = parts.next()?.parse().ok()?;
        let channel_id = parts.next()?.parse().ok()?;
        Some(Self::new(kind, group_id, channel_id))
    }
}

impl fmt::Display for WorkflowAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.kind.as_str(),
            self.group_id,
            self.channel_id
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionButton {
    pub label: String,
    pub action: WorkflowAction,
}

impl ActionButton {
    pub fn new(label: impl Into<String>, action: WorkflowAction) -> Self {
        Self {
            label: label.into(),
            action,
        }
    }
}

// ============================================================================
// TRANSPORT TRAIT (PORT)
// ============================================================================

#[async_trait]
pub trait MessagingTransport: Send + Sync {
    /// Post a message, optionally with workflow buttons attached.
    async fn send(
        &self,
        target: Target,
        text: &str,
        actions: &[ActionButton],
    ) -> Result<(), TransportError>;

    /// Delete a message from a group conversation.
    async fn delete(&self, group_id: u64, message_id: u64) -> Result<(), TransportError>;

    /// Whether the user administers the group on the platform side.
    async fn is_administrator(&self, group_id: u64, user_id: u64) -> Result<bool, TransportError>;

    /// Users who should hear about verified applications for this group.
    async fn group_administrators(&self, group_id: u64) -> Result<Vec<u64>, TransportError>;
}
