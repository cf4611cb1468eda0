// Whitelist domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A channel that is allowed to post in a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhitelistEntry {
    pub group_id: u64,
    pub channel_id: u64,
    /// Display name captured when the entry was created.
    pub channel_title: String,
    /// Administrator who added the entry, or who approved the application.
    pub added_by: u64,
    pub added_at: DateTime<Utc>,
}
