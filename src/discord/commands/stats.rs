use crate::discord::{Context, Error};
use poise::serenity_prelude as serenity;

/// Show moderation statistics for this conversation.
#[poise::command(slash_command, guild_only)]
pub async fn stats(ctx: Context<'_>) -> Result<(), Error> {
    let group_id = ctx.channel_id().get();
    let data = ctx.data();

    let whitelisted = data
        .whitelist
        .list(group_id)
        .await
        .map_err(|e| Error::from(e.to_string()))?
        .len();
    let blocked = data
        .recorder
        .count_for_group(group_id)
        .await
        .map_err(|e| Error::from(e.to_string()))?;
    let pending = data
        .registry
        .list_pending(group_id)
        .await
        .map_err(|e| Error::from(e.to_string()))?
        .len();

    let embed = serenity::CreateEmbed::new()
        .title("📊 Moderation Stats")
        .color(serenity::Color::BLURPLE)
        .field("Whitelisted channels", whitelisted.to_string(), true)
        .field("Blocked messages", blocked.to_string(), true)
        .field("Pending applications", pending.to_string(), true)
        .timestamp(serenity::Timestamp::now());

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}
