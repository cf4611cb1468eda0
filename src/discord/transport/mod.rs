pub mod discord_transport;

pub use discord_transport::DiscordTransport;
