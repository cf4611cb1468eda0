// Group settings models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSettings {
    pub group_id: u64,
    /// When false the gate ignores every post in the group.
    pub enabled: bool,
    /// Administrator behind the last change, 0 if never changed.
    pub updated_by: u64,
    pub updated_at: Option<DateTime<Utc>>,
}

impl GroupSettings {
    /// What a group that never touched its settings runs with.
    pub fn defaults(group_id: u64) -> Self {
        Self {
            group_id,
            enabled: true,
            updated_by: 0,
            updated_at: None,
        }
    }
}
