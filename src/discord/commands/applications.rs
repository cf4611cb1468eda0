// Slash-command entry points into the application workflow. The same
// transitions are reachable through the DM buttons.

use crate::core::applications::Decision;
use crate::discord::events::workflow_replies::{
    application_error_text, claim_outcome_text, decided_text, parse_channel_id, state_text,
};
use crate::discord::{Context, Error};
use poise::serenity_prelude as serenity;

async fn reply_private(ctx: Context<'_>, text: String) -> Result<(), Error> {
    ctx.send(poise::CreateReply::default().content(text).ephemeral(true))
        .await?;
    Ok(())
}

/// Claim a channel's pending application as its owner.
#[poise::command(slash_command, guild_only)]
pub async fn claim(
    ctx: Context<'_>,
    #[description = "Channel or webhook id"] channel: String,
) -> Result<(), Error> {
    let Some(channel_id) = parse_channel_id(&channel) else {
        return reply_private(ctx, "❌ That is not a valid channel id.".to_string()).await;
    };
    let group_id = ctx.channel_id().get();

    let text = match ctx
        .data()
        .registry
        .claim(group_id, channel_id, ctx.author().id.get())
        .await
    {
        Ok(outcome) => claim_outcome_text(&outcome),
        Err(e) => application_error_text(&e),
    };
    reply_private(ctx, text).await
}

async fn decide(ctx: Context<'_>, channel: String, decision: Decision) -> Result<(), Error> {
    let Some(channel_id) = parse_channel_id(&channel) else {
        return reply_private(ctx, "❌ That is not a valid channel id.".to_string()).await;
    };
    let group_id = ctx.channel_id().get();

    let text = match ctx
        .data()
        .registry
        .decide(group_id, channel_id, decision, ctx.author().id.get())
        .await
    {
        Ok(app) => decided_text(&app),
        Err(e) => application_error_text(&e),
    };
    reply_private(ctx, text).await
}

/// Approve a verified application and whitelist the channel.
#[poise::command(slash_command, guild_only)]
pub async fn approve(
    ctx: Context<'_>,
    #[description = "Channel or webhook id"] channel: String,
) -> Result<(), Error> {
    decide(ctx, channel, Decision::Approve).await
}

/// Reject a verified application.
#[poise::command(slash_command, guild_only)]
pub async fn reject(
    ctx: Context<'_>,
    #[description = "Channel or webhook id"] channel: String,
) -> Result<(), Error> {
    decide(ctx, channel, Decision::Reject).await
}

/// List applications waiting in this conversation.
#[poise::command(slash_command, guild_only)]
pub async fn pending(ctx: Context<'_>) -> Result<(), Error> {
    let group_id = ctx.channel_id().get();
    let apps = ctx
        .data()
        .registry
        .list_pending(group_id)
        .await
        .map_err(|e| Error::from(e.to_string()))?;

    if apps.is_empty() {
        return reply_private(ctx, "No applications are waiting here.".to_string()).await;
    }

    let mut embed = serenity::CreateEmbed::new()
        .title("Pending Applications")
        .color(serenity::Color::ORANGE);

    for app in apps.iter().take(25) {
        let claimant = if app.is_claimed() {
            format!("<@{}>", app.claimant_user_id)
        } else {
            "unclaimed".to_string()
        };
        let step = if app.verified { "verified" } else { "awaiting verification" };
        embed = embed.field(
            &app.channel_title,
            format!("`{}` · {} · {}", app.channel_id, claimant, step),
            false,
        );
    }

    ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true))
        .await?;
    Ok(())
}

/// Show where a channel's application stands.
#[poise::command(slash_command, guild_only)]
pub async fn application(
    ctx: Context<'_>,
    #[description = "Channel or webhook id"] channel: String,
) -> Result<(), Error> {
    let Some(channel_id) = parse_channel_id(&channel) else {
        return reply_private(ctx, "❌ That is not a valid channel id.".to_string()).await;
    };
    let group_id = ctx.channel_id().get();

    let text = match ctx.data().registry.state(group_id, channel_id).await {
        Ok(state) => state_text(&state),
        Err(e) => application_error_text(&e),
    };
    reply_private(ctx, text).await
}
