// Discord layer - commands, event handlers and the messaging transport.

#[path = "commands/command_catalog.rs"]
pub mod commands;

#[path = "events/mod.rs"]
pub mod events;

#[path = "transport/mod.rs"]
pub mod transport;

use crate::core::applications::ApplicationRegistry;
use crate::core::gate::ModerationGate;
use crate::core::recorder::BlockedMessageRecorder;
use crate::core::settings::SettingsService;
use crate::core::whitelist::WhitelistService;
use crate::infra::applications::{SqliteApplicationStore, SqliteUserStateStore};
use crate::infra::recorder::SqliteBlockedMessageStore;
use crate::infra::settings::SqliteSettingsStore;
use crate::infra::throttle::SqlitePromptStore;
use crate::infra::whitelist::SqliteWhitelistStore;
use std::sync::Arc;

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;

pub type Gate = ModerationGate<
    SqliteWhitelistStore,
    SqliteApplicationStore,
    SqliteUserStateStore,
    SqlitePromptStore,
    SqliteSettingsStore,
>;
pub type Registry = ApplicationRegistry<SqliteApplicationStore, SqliteUserStateStore>;
pub type Whitelist = WhitelistService<SqliteWhitelistStore>;
pub type Settings = SettingsService<SqliteSettingsStore>;
pub type Recorder = BlockedMessageRecorder<SqliteBlockedMessageStore>;

/// Shared state handed to every command and event handler.
pub struct Data {
    pub gate: Arc<Gate>,
    pub registry: Arc<Registry>,
    pub whitelist: Arc<Whitelist>,
    pub settings: Arc<Settings>,
    pub recorder: Arc<Recorder>,
}
