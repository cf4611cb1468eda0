// User-facing text for application workflow results, shared by buttons,
// slash commands and the DM reason flow.

use crate::core::applications::{
    ApplicationError, ApplicationState, ChannelApplication, ClaimOutcome,
};
use crate::core::settings::SettingsError;
use crate::core::whitelist::WhitelistError;

pub fn claim_outcome_text(outcome: &ClaimOutcome) -> String {
    match outcome {
        ClaimOutcome::AwaitingReason => {
            "This application has no reason yet. Check your DMs and reply there with one.".to_string()
        }
        ClaimOutcome::Claimed(app) => format!(
            "✅ You claimed \"{}\". Check your DMs to confirm that you own it.",
            app.channel_title
        ),
        ClaimOutcome::Verified(app) => verified_text(app),
    }
}

pub fn verified_text(app: &ChannelApplication) -> String {
    format!(
        "✅ Ownership of \"{}\" confirmed. Administrators have been asked to review it.",
        app.channel_title
    )
}

pub fn decided_text(app: &ChannelApplication) -> String {
    format!("Application for \"{}\" is now {}.", app.channel_title, app.status)
}

pub fn state_text(state: &ApplicationState) -> String {
    match state {
        ApplicationState::None => "No application has been made for this channel.".to_string(),
        ApplicationState::PendingUnclaimed => "Pending, waiting for the owner to claim it.".to_string(),
        ApplicationState::PendingAwaitingReason { user_id } => {
            format!("Pending, waiting for <@{}> to give a reason.", user_id)
        }
        ApplicationState::PendingClaimed { claimant } => {
            format!("Claimed by <@{}>, waiting for ownership confirmation.", claimant)
        }
        ApplicationState::PendingVerified { claimant } => {
            format!("Verified for <@{}>, waiting for an administrator.", claimant)
        }
        ApplicationState::Approved => "Approved.".to_string(),
        ApplicationState::Rejected => "Rejected. The channel may apply again.".to_string(),
    }
}

pub fn application_error_text(err: &ApplicationError) -> String {
    match err {
        ApplicationError::StorageError(detail) => {
            tracing::error!(error = %detail, "Application workflow storage failure");
            "❌ Something went wrong on our side. Please try again in a moment.".to_string()
        }
        other if other.is_conflict() => format!("⚠️ {}", other),
        other => format!("❌ {}", other),
    }
}

pub fn whitelist_error_text(err: &WhitelistError) -> String {
    match err {
        WhitelistError::StorageError(detail) => {
            tracing::error!(error = %detail, "Whitelist storage failure");
            "❌ Something went wrong on our side. Please try again in a moment.".to_string()
        }
        other => format!("❌ {}", other),
    }
}

pub fn settings_error_text(err: &SettingsError) -> String {
    match err {
        SettingsError::StorageError(detail) => {
            tracing::error!(error = %detail, "Settings storage failure");
            "❌ Something went wrong on our side. Please try again in a moment.".to_string()
        }
        other => format!("❌ {}", other),
    }
}

/// Parse a channel id given as a raw snowflake or a `<#id>` mention.
pub fn parse_channel_id(input: &str) -> Option<u64> {
    let trimmed = input.trim();
    let raw = trimmed
        .strip_prefix("<#")
        .and_then(|rest| rest.strip_suffix('>'))
        .unwrap_or(trimmed);
    raw.parse().ok().filter(|id| *id != 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_channel_id() {
        assert_eq!(parse_channel_id("1234"), Some(1234));
        assert_eq!(parse_channel_id(" <#987> "), Some(987));
        assert_eq!(parse_channel_id("0"), None);
        assert_eq!(parse_channel_id("#general"), None);
    }

    #[test]
    fn test_conflicts_are_shown_verbatim() {
        let text = application_error_text(&ApplicationError::AlreadyClaimed);
        assert!(text.contains("already been claimed"));

        let text = application_error_text(&ApplicationError::StorageError("disk I/O".into()));
        assert!(!text.contains("disk I/O"));
    }
}
