use crate::discord::events::workflow_replies::{parse_channel_id, whitelist_error_text};
use crate::discord::{Context, Error};
use poise::serenity_prelude as serenity;

const MAX_LISTED: usize = 25;

/// Manage which channels may post in this conversation.
#[poise::command(slash_command, guild_only, subcommands("add", "remove", "list"))]
pub async fn whitelist(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Allow a channel to post here.
#[poise::command(slash_command, guild_only)]
pub async fn add(
    ctx: Context<'_>,
    #[description = "Channel or webhook id"] channel: String,
    #[description = "Name to show in the whitelist"] name: Option<String>,
) -> Result<(), Error> {
    let Some(channel_id) = parse_channel_id(&channel) else {
        ctx.say("❌ That is not a valid channel id.").await?;
        return Ok(());
    };
    let group_id = ctx.channel_id().get();
    let title = name.unwrap_or_else(|| channel_id.to_string());

    let reply = match ctx
        .data()
        .whitelist
        .add(group_id, channel_id, &title, ctx.author().id.get())
        .await
    {
        Ok(entry) => format!("✅ \"{}\" (`{}`) can now post here.", entry.channel_title, entry.channel_id),
        Err(e) => whitelist_error_text(&e),
    };

    ctx.say(reply).await?;
    Ok(())
}

/// Stop a channel from posting here.
#[poise::command(slash_command, guild_only)]
pub async fn remove(
    ctx: Context<'_>,
    #[description = "Channel or webhook id"] channel: String,
) -> Result<(), Error> {
    let Some(channel_id) = parse_channel_id(&channel) else {
        ctx.say("❌ That is not a valid channel id.").await?;
        return Ok(());
    };
    let group_id = ctx.channel_id().get();

    let reply = match ctx
        .data()
        .whitelist
        .remove(group_id, channel_id, ctx.author().id.get())
        .await
    {
        Ok(()) => format!("🛑 `{}` removed from the whitelist.", channel_id),
        Err(e) => whitelist_error_text(&e),
    };

    ctx.say(reply).await?;
    Ok(())
}

/// Show the channels allowed to post here.
#[poise::command(slash_command, guild_only)]
pub async fn list(ctx: Context<'_>) -> Result<(), Error> {
    let group_id = ctx.channel_id().get();
    let entries = ctx
        .data()
        .whitelist
        .list(group_id)
        .await
        .map_err(|e| Error::from(e.to_string()))?;

    if entries.is_empty() {
        ctx.say("No channels are whitelisted here yet.").await?;
        return Ok(());
    }

    let mut embed = serenity::CreateEmbed::new()
        .title("Whitelisted Channels")
        .color(serenity::Color::BLURPLE);

    for entry in entries.iter().take(MAX_LISTED) {
        embed = embed.field(
            &entry.channel_title,
            format!(
                "`{}` · added by <@{}> on {}",
                entry.channel_id,
                entry.added_by,
                entry.added_at.format("%Y-%m-%d")
            ),
            false,
        );
    }

    if entries.len() > MAX_LISTED {
        embed = embed.footer(serenity::CreateEmbedFooter::new(format!(
            "Showing {} of {}",
            MAX_LISTED,
            entries.len()
        )));
    }

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}
