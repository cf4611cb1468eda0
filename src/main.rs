// This is the entry point of the Discord bot.
//
// **Architecture Overview:**
// - `core/` = Business logic (platform-agnostic)
// - `infra/` = Implementations of core traits (SQLite stores)
// - `discord/` = Discord-specific adapters (commands, events, transport)
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize services (dependency injection)
// 3. Start the background subsystems
// 4. Set up the Discord framework and run until Ctrl-C

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
mod core;
#[path = "discord/discord_layer.rs"]
mod discord;
#[path = "infra/infra_layer.rs"]
mod infra;

mod config;

use crate::config::BotConfig;
use crate::core::access::AccessPolicy;
use crate::core::applications::{ApplicationRegistry, RegistryOptions};
use crate::core::clock::{Clock, SystemClock};
use crate::core::deletion::{DeletionActor, DeletionQueue};
use crate::core::gate::ModerationGate;
use crate::core::recorder::BlockedMessageRecorder;
use crate::core::retry::RetryPolicy;
use crate::core::scheduler::DailyResetScheduler;
use crate::core::settings::SettingsService;
use crate::core::throttle::DailyPromptThrottle;
use crate::core::transport::MessagingTransport;
use crate::core::whitelist::WhitelistService;
use crate::discord::transport::DiscordTransport;
use crate::discord::{Data, Error};
use crate::infra::applications::{SqliteApplicationStore, SqliteUserStateStore};
use crate::infra::recorder::SqliteBlockedMessageStore;
use crate::infra::settings::SqliteSettingsStore;
use crate::infra::throttle::SqlitePromptStore;
use crate::infra::whitelist::SqliteWhitelistStore;
use anyhow::Context as _;
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use tokio::sync::watch;

/// Event handler for non-command Discord events.
async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    match event {
        serenity::FullEvent::Message { new_message } => {
            if let Err(e) = discord::events::handle_message(ctx, new_message, data).await {
                tracing::error!(
                    channel_id = new_message.channel_id.get(),
                    message_id = new_message.id.get(),
                    "Error handling message: {}",
                    e
                );
            }
        }
        serenity::FullEvent::InteractionCreate { interaction } => {
            if let Some(component) = interaction.as_message_component() {
                if let Err(e) = discord::events::handle_component(ctx, component, data).await {
                    tracing::error!("Error handling button press: {}", e);
                }
            }
        }
        serenity::FullEvent::Ready { data_about_bot } => {
            tracing::info!(user = %data_about_bot.user.name, "Connected to Discord");
        }
        _ => {}
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    // Initialize logging so we can see what's happening
    tracing_subscriber::fmt::init();

    let config = BotConfig::from_env()?;

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================
    // This is the "composition root" where we wire everything together.

    let database_path = config.database_path.to_string_lossy().to_string();
    let pool = infra::sqlite::connect(&database_path)
        .await
        .with_context(|| format!("Failed to open database at {}", database_path))?;

    let whitelist_store = SqliteWhitelistStore::new(pool.clone());
    let settings_store = SqliteSettingsStore::new(pool.clone());
    let application_store = SqliteApplicationStore::new(pool.clone());
    let user_state_store = SqliteUserStateStore::new(pool.clone());
    let prompt_store = SqlitePromptStore::new(pool.clone());
    let blocked_store = SqliteBlockedMessageStore::new(pool);

    // Approvals write whitelist rows, so that table goes first.
    whitelist_store.migrate().await?;
    settings_store.migrate().await?;
    application_store.migrate().await?;
    user_state_store.migrate().await?;
    prompt_store.migrate().await?;
    blocked_store.migrate().await?;

    let http = Arc::new(serenity::Http::new(&config.discord_token));
    let transport: Arc<dyn MessagingTransport> = Arc::new(DiscordTransport::new(http));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new(config.timezone));
    let access = Arc::new(AccessPolicy::new(
        config.admin_users.iter().copied(),
        Arc::clone(&transport),
    ));

    let settings = Arc::new(SettingsService::new(
        settings_store,
        Arc::clone(&access),
        Arc::clone(&clock),
    ));
    let whitelist = Arc::new(WhitelistService::new(
        whitelist_store,
        Arc::clone(&access),
        Arc::clone(&clock),
        config.admin_only_whitelist_management,
    ));
    let registry = Arc::new(ApplicationRegistry::new(
        application_store,
        user_state_store,
        Arc::clone(&access),
        Arc::clone(&transport),
        Arc::clone(&clock),
        RegistryOptions {
            require_ownership_verification: config.require_ownership_verification,
        },
    ));
    let throttle = Arc::new(DailyPromptThrottle::new(prompt_store, Arc::clone(&clock)));
    let recorder = Arc::new(BlockedMessageRecorder::new(
        blocked_store,
        RetryPolicy::for_storage(),
    ));

    let (deletions, deletion_inbox) = DeletionQueue::bounded(config.deletion_queue_capacity);
    let deletion_actor = Arc::new(DeletionActor::new(
        Arc::clone(&transport),
        RetryPolicy::for_deletions(),
        config.deletion_max_concurrency,
    ));

    let gate = Arc::new(ModerationGate::new(
        Arc::clone(&settings),
        Arc::clone(&whitelist),
        Arc::clone(&registry),
        Arc::clone(&throttle),
        recorder.buffer(),
        deletions,
        Arc::clone(&transport),
    ));

    // ========================================================================
    // BACKGROUND SUBSYSTEMS
    // ========================================================================

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut background = tokio::task::JoinSet::new();

    background.spawn(
        Arc::clone(&recorder).run(config.blocked_flush_interval, shutdown_rx.clone()),
    );
    background.spawn(deletion_actor.run(deletion_inbox, shutdown_rx.clone()));
    background.spawn(DailyResetScheduler::new(throttle, clock).run(shutdown_rx));

    let data = Data {
        gate,
        registry,
        whitelist,
        settings,
        recorder,
    };

    // ========================================================================
    // DISCORD FRAMEWORK SETUP
    // ========================================================================

    let intents = serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::MESSAGE_CONTENT // Required to read message content
        | serenity::GatewayIntents::DIRECT_MESSAGES
        | serenity::GatewayIntents::GUILDS;

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: discord::commands::all(),
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            ..Default::default()
        })
        .setup(|ctx, _ready, framework| {
            Box::pin(async move {
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                tracing::info!("Commands registered");
                Ok(data)
            })
        })
        .build();

    let mut client = serenity::ClientBuilder::new(&config.discord_token, intents)
        .framework(framework)
        .await
        .context("Error creating client")?;

    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            return;
        }
        tracing::info!("Shutdown requested");
        shard_manager.shutdown_all().await;
    });

    let run_result = client.start().await;

    // Stops the background loops: the recorder flushes its last batch and
    // queued deletions are drained before they exit.
    let _ = shutdown_tx.send(true);
    while let Some(result) = background.join_next().await {
        if let Err(e) = result {
            tracing::error!("Background task failed: {}", e);
        }
    }

    run_result.context("Error running bot")?;
    tracing::info!("Bot stopped");
    Ok(())
}
