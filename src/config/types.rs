//! Configuration type definitions.

use serde::Deserialize;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub game_link: GameLinkConfig,
    pub discord: DiscordConfig,
    #[serde(default)]
    pub translation: TranslationConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub preferences: PreferencesConfig,
    #[serde(default)]
    pub formats: FormatsConfig,
}

/// Server-wide settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Language assumed for senders and recipients without an explicit one.
    #[serde(default = "default_language")]
    pub default_language: String,
    /// Seconds to wait for in-flight fan-outs on shutdown.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            default_language: default_language(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

/// Game server plugin link.
#[derive(Debug, Clone, Deserialize)]
pub struct GameLinkConfig {
    #[serde(default = "default_game_link_bind")]
    pub bind: String,
}

impl Default for GameLinkConfig {
    fn default() -> Self {
        Self {
            bind: default_game_link_bind(),
        }
    }
}

/// Discord bot configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscordConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub token: String,
    /// Channel mirrored with in-game chat (bidirectional).
    #[serde(default)]
    pub channel: u64,
    /// Channel mirroring the staff chat (outbound only).
    #[serde(default)]
    pub staff_channel: Option<u64>,
    /// Channel mirroring the premium chat (outbound only).
    #[serde(default)]
    pub premium_channel: Option<u64>,
    /// Language of the Discord audience (server default if unset).
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default = "default_started_message")]
    pub server_started_message: String,
    #[serde(default = "default_stopped_message")]
    pub server_stopped_message: String,
}

/// Translation engine settings.
#[derive(Debug, Clone, Deserialize)]
pub struct TranslationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Base URL of a LibreTranslate-compatible service.
    #[serde(default = "default_translate_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_translate_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: default_translate_endpoint(),
            api_key: None,
            timeout_secs: default_translate_timeout_secs(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

/// Content filter settings.
#[derive(Debug, Clone, Deserialize)]
pub struct FilterConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Blocked terms (case-insensitive substring).
    #[serde(default)]
    pub terms: Vec<String>,
    /// Blocked regex patterns.
    #[serde(default)]
    pub patterns: Vec<String>,
    /// Optional file with one blocked term per line.
    #[serde(default)]
    pub blocklist_file: Option<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            terms: Vec::new(),
            patterns: Vec::new(),
            blocklist_file: None,
        }
    }
}

/// Language preference persistence.
#[derive(Debug, Clone, Deserialize)]
pub struct PreferencesConfig {
    #[serde(default = "default_preferences_path")]
    pub path: String,
}

impl Default for PreferencesConfig {
    fn default() -> Self {
        Self {
            path: default_preferences_path(),
        }
    }
}

/// Per-channel format strings (`%user`, `%message`, `%time`, `%origin`).
#[derive(Debug, Clone, Deserialize)]
pub struct FormatsConfig {
    #[serde(default = "default_game_format")]
    pub game: String,
    #[serde(default = "default_external_to_game_format")]
    pub external_to_game: String,
    #[serde(default = "default_system_format")]
    pub system: String,
    #[serde(default = "default_staff_format")]
    pub staff: String,
    #[serde(default = "default_premium_format")]
    pub premium: String,
    #[serde(default = "default_discord_format")]
    pub discord: String,
}

impl Default for FormatsConfig {
    fn default() -> Self {
        Self {
            game: default_game_format(),
            external_to_game: default_external_to_game_format(),
            system: default_system_format(),
            staff: default_staff_format(),
            premium: default_premium_format(),
            discord: default_discord_format(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_language() -> String {
    "en".to_string()
}

fn default_shutdown_grace_secs() -> u64 {
    5
}

fn default_game_link_bind() -> String {
    "127.0.0.1:25580".to_string()
}

fn default_started_message() -> String {
    ":white_check_mark: **The server has started**".to_string()
}

fn default_stopped_message() -> String {
    ":octagonal_sign: **The server has stopped**".to_string()
}

fn default_translate_endpoint() -> String {
    "http://127.0.0.1:5000".to_string()
}

fn default_translate_timeout_secs() -> u64 {
    10
}

fn default_cache_capacity() -> usize {
    2048
}

fn default_preferences_path() -> String {
    "languages.json".to_string()
}

fn default_game_format() -> String {
    "%user: %message".to_string()
}

fn default_external_to_game_format() -> String {
    "[Discord] %user: %message".to_string()
}

fn default_system_format() -> String {
    "%message".to_string()
}

fn default_staff_format() -> String {
    "[Staff] %user: %message".to_string()
}

fn default_premium_format() -> String {
    "[Premium] %user: %message".to_string()
}

fn default_discord_format() -> String {
    "**%user**: %message".to_string()
}
