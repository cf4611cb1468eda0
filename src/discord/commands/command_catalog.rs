// Discord commands module.
// Each feature gets its own command file.

pub mod applications;

pub mod help;

pub mod settings;

pub mod stats;

pub mod whitelist;

use crate::discord::{Data, Error};

/// Every slash command the bot registers.
pub fn all() -> Vec<poise::Command<Data, Error>> {
    vec![
        whitelist::whitelist(),
        applications::claim(),
        applications::approve(),
        applications::reject(),
        applications::pending(),
        applications::application(),
        stats::stats(),
        settings::enable(),
        settings::disable(),
        settings::settings(),
        help::help(),
    ]
}
