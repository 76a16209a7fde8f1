//! Error types for the application.

use thiserror::Error;

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {message}")]
    IoError { path: String, message: String },

    #[error("Failed to parse config: {message}")]
    ParseError { message: String },

    #[error("Config validation failed: {message}")]
    ValidationError { message: String },
}

/// Translation engine failures.
///
/// Never surfaced to the sender: the router falls back to the untranslated
/// text and logs the failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranslateError {
    #[error("Translation timed out")]
    Timeout,

    #[error("Unsupported language pair: {source_lang} -> {target_lang}")]
    UnsupportedLanguagePair {
        source_lang: String,
        target_lang: String,
    },

    #[error("Translation engine unavailable")]
    EngineUnavailable,

    #[error("Malformed engine response: {message}")]
    Malformed { message: String },
}

/// Delivery failures reported by a sink.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("Channel unreachable: {message}")]
    ChannelUnreachable { message: String },

    #[error("Rate limited")]
    RateLimited,

    #[error("Authentication failed")]
    AuthFailure,
}

/// Language code not in the known set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid language code: '{code}'")]
pub struct InvalidLanguage {
    pub code: String,
}

/// Language preference store errors.
#[derive(Debug, Error)]
pub enum PreferenceError {
    #[error(transparent)]
    InvalidLanguage(#[from] InvalidLanguage),

    #[error("Failed to persist preferences to '{path}': {source}")]
    Persist {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to load preferences from '{path}': {message}")]
    Load { path: String, message: String },
}

/// Game link errors.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("Invalid frame: {message}")]
    InvalidFrame { message: String },

    #[error("Frame too long: {len} bytes (max {max})")]
    FrameTooLong { len: usize, max: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for translation operations.
pub type TranslateResult<T> = std::result::Result<T, TranslateError>;

/// Result type alias for delivery operations.
pub type SendResult<T> = std::result::Result<T, SendError>;
