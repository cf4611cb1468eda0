// Inbound posts and the gate's verdicts.

use crate::core::applications::ChannelApplication;
use crate::core::throttle::NoticeKind;
use chrono::{DateTime, Utc};

/// Prefixes that turn a channel post into an application.
const APPLY_PREFIXES: [&str; 2] = ["/apply", "!apply"];

#[derive(Debug, Clone, PartialEq)]
pub enum Sender {
    /// A regular member writing as themselves.
    User { user_id: u64 },
    /// A broadcast identity posting into the group.
    Channel { channel_id: u64, title: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub group_id: u64,
    pub message_id: u64,
    pub sender: Sender,
    pub text: String,
    pub sent_at: DateTime<Utc>,
}

impl Post {
    /// The reason given with an application request, or None if the post is
    /// not one. The reason may be empty.
    pub fn application_reason(&self) -> Option<&str> {
        let text = self.text.trim_start();
        APPLY_PREFIXES.iter().find_map(|prefix| {
            let rest = text.strip_prefix(prefix)?;
            if rest.is_empty() || rest.starts_with(char::is_whitespace) {
                Some(rest.trim())
            } else {
                None
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// Not a channel post; the gate has no opinion.
    NotApplicable,
    Allow,
    /// The post was an application request and opened a new application.
    ApplicationSubmitted(ChannelApplication),
    /// The post is being removed. `notice` is set when a notice went out
    /// for it.
    Suppressed { notice: Option<NoticeKind> },
}
