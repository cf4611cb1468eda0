// Channel application domain models.
//
// The stored row (ChannelApplication) is flat. The workflow position of a
// pair is derived from the row plus the per-user conversation cursor, see
// ApplicationState.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApplicationStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::Approved => "approved",
            ApplicationStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ApplicationStatus::Pending),
            "approved" => Some(ApplicationStatus::Approved),
            "rejected" => Some(ApplicationStatus::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ApplicationStatus::Pending)
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One application slot per (group, channel).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelApplication {
    pub group_id: u64,
    pub channel_id: u64,
    /// Channel display name at submission time.
    pub channel_title: String,
    /// 0 while unclaimed.
    pub claimant_user_id: u64,
    pub reason: String,
    pub applied_at: DateTime<Utc>,
    pub status: ApplicationStatus,
    pub verified: bool,
    /// Last day a "pending application" notice went out for this slot.
    pub last_prompt_date: Option<NaiveDate>,
}

impl ChannelApplication {
    pub fn is_pending(&self) -> bool {
        self.status == ApplicationStatus::Pending
    }

    pub fn is_claimed(&self) -> bool {
        self.claimant_user_id != 0
    }

    pub fn has_reason(&self) -> bool {
        !self.reason.trim().is_empty()
    }
}

/// Input to a submission.
#[derive(Debug, Clone, PartialEq)]
pub struct NewApplication {
    pub group_id: u64,
    pub channel_id: u64,
    pub channel_title: String,
    pub reason: String,
    pub applied_at: DateTime<Utc>,
}

/// Where a (group, channel) pair sits in the application workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationState {
    None,
    PendingUnclaimed,
    PendingAwaitingReason { user_id: u64 },
    PendingClaimed { claimant: u64 },
    PendingVerified { claimant: u64 },
    Approved,
    Rejected,
}

/// Per-user conversation cursor for multi-step private exchanges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UserState {
    #[default]
    Idle,
    AwaitingReason { group_id: u64, channel_id: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn resulting_status(&self) -> ApplicationStatus {
        match self {
            Decision::Approve => ApplicationStatus::Approved,
            Decision::Reject => ApplicationStatus::Rejected,
        }
    }
}

/// Result of a successful claim step.
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    /// The application has no reason yet; the user was asked for one privately.
    AwaitingReason,
    /// Claimed; the claimant still has to confirm ownership.
    Claimed(ChannelApplication),
    /// Claimed and verified in one step; administrators were notified.
    Verified(ChannelApplication),
}
