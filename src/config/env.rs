//! Environment variable overrides for configuration.
//!
//! Supports overriding config values with environment variables:
//! - `HERALD_DISCORD_TOKEN` - Discord bot token
//! - `HERALD_TRANSLATE_URL` - Translation engine base URL
//! - `HERALD_TRANSLATE_API_KEY` - Translation engine API key
//! - `HERALD_GAME_LINK_BIND` - Address the game link listens on

use std::env;

use crate::config::types::Config;

/// Environment variable prefix for all config overrides.
const ENV_PREFIX: &str = "HERALD";

/// Apply environment variable overrides to a config.
///
/// This allows secrets like the bot token to be provided via
/// environment variables instead of the config file.
pub fn apply_env_overrides(config: Config) -> Config {
    apply_overrides_from(config, |name| env::var(name).ok())
}

fn apply_overrides_from(mut config: Config, lookup: impl Fn(&str) -> Option<String>) -> Config {
    if let Some(token) = lookup(&format!("{}_DISCORD_TOKEN", ENV_PREFIX)) {
        config.discord.token = token;
    }
    if let Some(url) = lookup(&format!("{}_TRANSLATE_URL", ENV_PREFIX)) {
        config.translation.endpoint = url;
    }
    if let Some(key) = lookup(&format!("{}_TRANSLATE_API_KEY", ENV_PREFIX)) {
        config.translation.api_key = Some(key);
    }
    if let Some(bind) = lookup(&format!("{}_GAME_LINK_BIND", ENV_PREFIX)) {
        config.game_link.bind = bind;
    }

    config
}

/// Get the config file path from environment or use default.
///
/// Checks `HERALD_CONFIG` environment variable, otherwise returns "herald.conf".
pub fn get_config_path() -> String {
    env::var(format!("{}_CONFIG", ENV_PREFIX)).unwrap_or_else(|_| "herald.conf".to_string())
}
