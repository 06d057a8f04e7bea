//! Error types for the profile bot.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Channel-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send response on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Failed to download file {file_id} on channel {name}: {reason}")]
    DownloadFailed {
        name: String,
        file_id: String,
        reason: String,
    },

    #[error("No channel registered under name {0}")]
    UnknownChannel(String),
}

/// Media store errors.
#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("Refusing to store empty file for {conversation}")]
    EmptyFile { conversation: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the bot.
pub type Result<T> = std::result::Result<T, Error>;
