// Inbound messages: channel posts go through the moderation gate, DMs may
// carry a reason the registry asked a claimant for.

use crate::core::gate::{Post, Sender, Verdict};
use crate::discord::events::workflow_replies::{application_error_text, claim_outcome_text};
use crate::discord::{Data, Error};
use chrono::{DateTime, Utc};
use poise::serenity_prelude as serenity;

pub async fn handle_message(
    ctx: &serenity::Context,
    msg: &serenity::Message,
    data: &Data,
) -> Result<(), Error> {
    if msg.guild_id.is_none() {
        if !msg.author.bot {
            handle_direct_message(ctx, msg, data).await?;
        }
        return Ok(());
    }

    let post = post_from_message(msg);
    let verdict = data
        .gate
        .evaluate(&post)
        .await
        .map_err(|e| Error::from(e.to_string()))?;

    match verdict {
        Verdict::ApplicationSubmitted(app) => {
            tracing::info!(
                group_id = app.group_id,
                channel_id = app.channel_id,
                "Application opened from channel post"
            );
        }
        Verdict::Suppressed { notice } => {
            tracing::debug!(
                group_id = post.group_id,
                message_id = post.message_id,
                notified = notice.is_some(),
                "Channel post suppressed"
            );
        }
        Verdict::Allow | Verdict::NotApplicable => {}
    }

    Ok(())
}

async fn handle_direct_message(
    ctx: &serenity::Context,
    msg: &serenity::Message,
    data: &Data,
) -> Result<(), Error> {
    let user_id = msg.author.id.get();
    let Some((group_id, channel_id)) = data.registry.reason_request_for(user_id).await? else {
        return Ok(());
    };

    let reply = match data
        .registry
        .supply_reason(group_id, channel_id, user_id, &msg.content)
        .await
    {
        Ok(outcome) => claim_outcome_text(&outcome),
        Err(err) => application_error_text(&err),
    };

    msg.channel_id.say(&ctx.http, reply).await?;
    Ok(())
}

/// Build a gate post from a guild message.
fn post_from_message(msg: &serenity::Message) -> Post {
    let is_crosspost = msg
        .flags
        .is_some_and(|flags| flags.contains(serenity::MessageFlags::IS_CROSSPOST));
    let source_channel = msg
        .message_reference
        .as_ref()
        .filter(|_| is_crosspost)
        .map(|reference| reference.channel_id.get());

    Post {
        group_id: msg.channel_id.get(),
        message_id: msg.id.get(),
        sender: sender_of(
            msg.webhook_id.map(|id| id.get()),
            source_channel,
            msg.author.id.get(),
            &msg.author.name,
        ),
        text: msg.content.clone(),
        sent_at: DateTime::from_timestamp(msg.timestamp.unix_timestamp(), 0).unwrap_or_else(Utc::now),
    }
}

fn sender_of(
    webhook_id: Option<u64>,
    source_channel: Option<u64>,
    author_id: u64,
    author_name: &str,
) -> Sender {
    match channel_identity(webhook_id, source_channel) {
        Some(channel_id) => Sender::Channel {
            channel_id,
            title: author_name.to_string(),
        },
        None => Sender::User { user_id: author_id },
    }
}

/// The identity a webhook post speaks for: the followed source channel for
/// crossposts, the webhook itself otherwise.
fn channel_identity(webhook_id: Option<u64>, source_channel: Option<u64>) -> Option<u64> {
    let webhook_id = webhook_id?;
    Some(source_channel.unwrap_or(webhook_id))
}
