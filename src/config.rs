// Runtime configuration, read once from the environment at startup.

use anyhow::{anyhow, Context as _};
use chrono_tz::Tz;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct BotConfig {
    pub discord_token: String,
    pub database_path: PathBuf,
    /// Users treated as administrators in every group.
    pub admin_users: BTreeSet<u64>,
    pub require_ownership_verification: bool,
    pub admin_only_whitelist_management: bool,
    pub blocked_flush_interval: Duration,
    pub timezone: Tz,
    pub deletion_queue_capacity: usize,
    pub deletion_max_concurrency: usize,
}

impl BotConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let discord_token = get("DISCORD_TOKEN").ok_or_else(|| {
            anyhow!("Missing DISCORD_TOKEN environment variable! Create a .env file with your bot token.")
        })?;

        let flush_secs: u64 = parse_or(get("BLOCKED_FLUSH_INTERVAL_SECS"), "BLOCKED_FLUSH_INTERVAL_SECS", 2)?;
        if flush_secs == 0 {
            return Err(anyhow!("BLOCKED_FLUSH_INTERVAL_SECS must be at least 1"));
        }

        let deletion_queue_capacity = parse_or(get("DELETION_QUEUE_CAPACITY"), "DELETION_QUEUE_CAPACITY", 1024)?;
        let deletion_max_concurrency = parse_or(get("DELETION_MAX_CONCURRENCY"), "DELETION_MAX_CONCURRENCY", 8)?;
        if deletion_queue_capacity == 0 || deletion_max_concurrency == 0 {
            return Err(anyhow!(
                "DELETION_QUEUE_CAPACITY and DELETION_MAX_CONCURRENCY must be positive"
            ));
        }

        let timezone = match get("BOT_TIMEZONE") {
            Some(name) => Tz::from_str(&name)
                .map_err(|e| anyhow!("BOT_TIMEZONE {:?} is not a valid IANA zone: {}", name, e))?,
            None => Tz::UTC,
        };

        Ok(Self {
            discord_token,
            database_path: get("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data/whitelist.db")),
            admin_users: parse_admin_users(get("ADMIN_USERS").as_deref())?,
            require_ownership_verification: parse_bool(
                get("REQUIRE_OWNERSHIP_VERIFICATION"),
                "REQUIRE_OWNERSHIP_VERIFICATION",
                false,
            )?,
            admin_only_whitelist_management: parse_bool(
                get("ADMIN_ONLY_WHITELIST_MANAGEMENT"),
                "ADMIN_ONLY_WHITELIST_MANAGEMENT",
                true,
            )?,
            blocked_flush_interval: Duration::from_secs(flush_secs),
            timezone,
            deletion_queue_capacity,
            deletion_max_concurrency,
        })
    }
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("{} has an invalid value: {:?}", key, raw)),
        None => Ok(default),
    }
}

fn parse_bool(value: Option<String>, key: &str, default: bool) -> anyhow::Result<bool> {
    let Some(raw) = value else {
        return Ok(default);
    };
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(anyhow!("{} must be true or false, got {:?}", key, raw)),
    }
}

fn parse_admin_users(value: Option<&str>) -> anyhow::Result<BTreeSet<u64>> {
    let Some(raw) = value else {
        return Ok(BTreeSet::new());
    };
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<u64>()
                .with_context(|| format!("ADMIN_USERS contains an invalid user id: {:?}", part))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> anyhow::Result<BotConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        BotConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[("DISCORD_TOKEN", "abc")]).unwrap();

        assert_eq!(config.database_path, PathBuf::from("data/whitelist.db"));
        assert!(config.admin_users.is_empty());
        assert!(!config.require_ownership_verification);
        assert!(config.admin_only_whitelist_management);
        assert_eq!(config.blocked_flush_interval, Duration::from_secs(2));
        assert_eq!(config.timezone, Tz::UTC);
        assert_eq!(config.deletion_queue_capacity, 1024);
        assert_eq!(config.deletion_max_concurrency, 8);
    }

    #[test]
    fn test_token_is_required() {
        assert!(config_from(&[]).is_err());
        assert!(config_from(&[("DISCORD_TOKEN", "  ")]).is_err());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("DISCORD_TOKEN", "abc"),
            ("ADMIN_USERS", "12, 34,,56"),
            ("REQUIRE_OWNERSHIP_VERIFICATION", "yes"),
            ("ADMIN_ONLY_WHITELIST_MANAGEMENT", "false"),
            ("BOT_TIMEZONE", "Europe/Berlin"),
            ("BLOCKED_FLUSH_INTERVAL_SECS", "5"),
        ])
        .unwrap();

        assert_eq!(config.admin_users, BTreeSet::from([12, 34, 56]));
        assert!(config.require_ownership_verification);
        assert!(!config.admin_only_whitelist_management);
        assert_eq!(config.timezone, chrono_tz::Europe::Berlin);
        assert_eq!(config.blocked_flush_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_invalid_values_fail() {
        assert!(config_from(&[("DISCORD_TOKEN", "abc"), ("ADMIN_USERS", "12,bob")]).is_err());
        assert!(config_from(&[("DISCORD_TOKEN", "abc"), ("BOT_TIMEZONE", "Mars/Olympus")]).is_err());
        assert!(config_from(&[("DISCORD_TOKEN", "abc"), ("BLOCKED_FLUSH_INTERVAL_SECS", "0")]).is_err());
        assert!(config_from(&[("DISCORD_TOKEN", "abc"), ("REQUIRE_OWNERSHIP_VERIFICATION", "maybe")]).is_err());
    }
}
