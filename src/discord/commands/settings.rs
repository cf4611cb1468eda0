use crate::discord::events::workflow_replies::settings_error_text;
use crate::discord::{Context, Error};
use poise::serenity_prelude as serenity;

async fn toggle(ctx: Context<'_>, enabled: bool) -> Result<(), Error> {
    let group_id = ctx.channel_id().get();

    let reply = match ctx
        .data()
        .settings
        .set_enabled(group_id, enabled, ctx.author().id.get())
        .await
    {
        Ok(_) if enabled => "✅ Moderation is on. Channels that are not whitelisted will be removed.".to_string(),
        Ok(_) => "⏸️ Moderation is off. Channel posts here are left alone until `/enable`.".to_string(),
        Err(e) => settings_error_text(&e),
    };

    ctx.say(reply).await?;
    Ok(())
}

/// Turn channel moderation on for this conversation.
#[poise::command(slash_command, guild_only)]
pub async fn enable(ctx: Context<'_>) -> Result<(), Error> {
    toggle(ctx, true).await
}

/// Turn channel moderation off for this conversation.
#[poise::command(slash_command, guild_only)]
pub async fn disable(ctx: Context<'_>) -> Result<(), Error> {
    toggle(ctx, false).await
}

fn on_off(value: bool) -> &'static str {
    if value {
        "On"
    } else {
        "Off"
    }
}

/// Show how moderation is configured here.
#[poise::command(slash_command, guild_only)]
pub async fn settings(ctx: Context<'_>) -> Result<(), Error> {
    let group_id = ctx.channel_id().get();
    let data = ctx.data();

    let settings = match data.settings.settings(group_id).await {
        Ok(settings) => settings,
        Err(e) => {
            ctx.say(settings_error_text(&e)).await?;
            return Ok(());
        }
    };

    let last_change = match settings.updated_at {
        Some(at) => format!("<@{}> on {}", settings.updated_by, at.format("%Y-%m-%d %H:%M UTC")),
        None => "Never changed".to_string(),
    };

    let embed = serenity::CreateEmbed::new()
        .title("⚙️ Moderation Settings")
        .color(if settings.enabled {
            serenity::Color::DARK_GREEN
        } else {
            serenity::Color::DARK_GREY
        })
        .field("Moderation", on_off(settings.enabled), true)
        .field("Admin-only whitelist", on_off(data.whitelist.admin_only()), true)
        .field(
            "Ownership check",
            on_off(data.registry.requires_verification()),
            true,
        )
        .field("Last change", last_change, false);

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}
