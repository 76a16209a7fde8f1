//! Configuration validation.
//!
//! Validates configuration values and provides helpful error messages.

use std::net::SocketAddr;

use fancy_regex::Regex;

use crate::common::error::ConfigError;
use crate::common::resources::canonical_language_code;
use crate::config::types::Config;

const MAX_SHUTDOWN_GRACE_SECS: u64 = 3600;

/// Validate a configuration and return detailed errors.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    if canonical_language_code(&config.server.default_language).is_none() {
        errors.push(format!(
            "server.default_language '{}' is not a known language code",
            config.server.default_language
        ));
    }

    if config.server.shutdown_grace_secs > MAX_SHUTDOWN_GRACE_SECS {
        errors.push(format!(
            "server.shutdown_grace_secs must be at most {}",
            MAX_SHUTDOWN_GRACE_SECS
        ));
    }

    if config.game_link.bind.parse::<SocketAddr>().is_err() {
        errors.push(format!(
            "game_link.bind '{}' is not a valid socket address",
            config.game_link.bind
        ));
    }

    // Discord settings only matter when the bridge is enabled
    if config.discord.enabled {
        if config.discord.token.is_empty() {
            errors.push("discord.token is required".to_string());
        }
        if config.discord.token == "YOUR_DISCORD_TOKEN_HERE" {
            errors.push("discord.token has not been configured (still using placeholder)".to_string());
        }
        if config.discord.channel == 0 {
            errors.push("discord.channel must be a non-zero channel id".to_string());
        }
        if config.discord.staff_channel == Some(0) {
            errors.push("discord.staff_channel must be a non-zero channel id".to_string());
        }
        if config.discord.premium_channel == Some(0) {
            errors.push("discord.premium_channel must be a non-zero channel id".to_string());
        }
    }
    if let Some(ref language) = config.discord.language {
        if canonical_language_code(language).is_none() {
            errors.push(format!(
                "discord.language '{}' is not a known language code",
                language
            ));
        }
    }

    if config.translation.enabled {
        if !config.translation.endpoint.starts_with("http://")
            && !config.translation.endpoint.starts_with("https://")
        {
            errors.push(format!(
                "translation.endpoint '{}' must be an http(s) URL",
                config.translation.endpoint
            ));
        }
        if config.translation.timeout_secs == 0 {
            errors.push("translation.timeout_secs must be non-zero".to_string());
        }
    }
    if config.translation.cache_capacity == 0 {
        errors.push("translation.cache_capacity must be non-zero".to_string());
    }

    // Validate filter patterns (try to compile them)
    for (i, pattern) in config.filter.patterns.iter().enumerate() {
        if Regex::new(pattern).is_err() {
            errors.push(format!(
                "filter.patterns[{}] is not a valid regex: '{}'",
                i, pattern
            ));
        }
    }

    if config.preferences.path.is_empty() {
        errors.push("preferences.path is required".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError {
            message: errors.join("\n"),
        })
    }
}
