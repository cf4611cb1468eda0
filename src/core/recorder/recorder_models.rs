// Audit records for suppressed posts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Longest snippet of the original text we keep, in characters.
pub const MAX_SNIPPET_CHARS: usize = 500;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockedMessage {
    pub group_id: u64,
    pub channel_id: u64,
    pub message_id: u64,
    pub text: String,
    pub blocked_at: DateTime<Utc>,
}

impl BlockedMessage {
    pub fn new(
        group_id: u64,
        channel_id: u64,
        message_id: u64,
        text: &str,
        blocked_at: DateTime<Utc>,
    ) -> Self {
        Self {
            group_id,
            channel_id,
            message_id,
            text: snippet(text),
            blocked_at,
        }
    }
}

fn snippet(text: &str) -> String {
    match text.char_indices().nth(MAX_SNIPPET_CHARS) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.to_string(),
    }
}
