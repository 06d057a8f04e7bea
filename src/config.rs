//! Configuration types.
//!
//! Everything is read from the environment at startup. The bot token is
//! only ever held as a [`SecretString`].

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

pub const ENV_TELEGRAM_TOKEN: &str = "TELEGRAM_BOT_TOKEN";
pub const ENV_TELEGRAM_ALLOWED_USERS: &str = "TELEGRAM_ALLOWED_USERS";
pub const ENV_TELEGRAM_POLL_TIMEOUT: &str = "TELEGRAM_POLL_TIMEOUT_SECS";
pub const ENV_MEDIA_DIR: &str = "PROFILE_BOT_MEDIA_DIR";
pub const ENV_REPROMPT: &str = "PROFILE_BOT_REPROMPT";
pub const ENV_CLI: &str = "PROFILE_BOT_CLI";

const DEFAULT_MEDIA_DIR: &str = "./data/media";
const DEFAULT_POLL_TIMEOUT_SECS: u64 = 30;

/// Telegram gateway settings.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: SecretString,
    /// Usernames or numeric ids; `*` allows everyone.
    pub allowed_users: Vec<String>,
    /// Long-poll timeout passed to `getUpdates`.
    pub poll_timeout: Duration,
}

/// Bot configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub name: String,
    /// Present when `TELEGRAM_BOT_TOKEN` is set.
    pub telegram: Option<TelegramConfig>,
    /// Whether the stdin/stdout channel is enabled.
    pub cli_enabled: bool,
    /// Root directory for stored photos.
    pub media_dir: PathBuf,
    /// Answer unmatched input with a corrective prompt instead of ignoring it.
    pub reprompt_unmatched: bool,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            name: "profile-bot".to_string(),
            telegram: None,
            cli_enabled: false,
            media_dir: PathBuf::from(DEFAULT_MEDIA_DIR),
            reprompt_unmatched: false,
        }
    }
}

impl BotConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let telegram = match lookup(ENV_TELEGRAM_TOKEN).filter(|t| !t.trim().is_empty()) {
            Some(token) => {
                let allowed_users: Vec<String> = lookup(ENV_TELEGRAM_ALLOWED_USERS)
                    .unwrap_or_else(|| "*".to_string())
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();

                let poll_timeout_secs = match lookup(ENV_TELEGRAM_POLL_TIMEOUT) {
                    Some(raw) => raw.trim().parse::<u64>().map_err(|e| {
                        ConfigError::InvalidValue {
                            key: ENV_TELEGRAM_POLL_TIMEOUT.to_string(),
                            message: format!("{raw:?}: {e}"),
                        }
                    })?,
                    None => DEFAULT_POLL_TIMEOUT_SECS,
                };

                Some(TelegramConfig {
                    bot_token: SecretString::from(token.trim().to_string()),
                    allowed_users,
                    poll_timeout: Duration::from_secs(poll_timeout_secs),
                })
            }
            None => None,
        };

        let cli_enabled = parse_bool(ENV_CLI, lookup(ENV_CLI))?.unwrap_or(false);
        let reprompt_unmatched = parse_bool(ENV_REPROMPT, lookup(ENV_REPROMPT))?.unwrap_or(false);

        if telegram.is_none() && !cli_enabled {
            return Err(ConfigError::MissingRequired {
                key: ENV_TELEGRAM_TOKEN.to_string(),
                hint: format!("Set {ENV_TELEGRAM_TOKEN}, or {ENV_CLI}=true to chat from the terminal."),
            });
        }

        let media_dir = lookup(ENV_MEDIA_DIR)
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MEDIA_DIR));

        Ok(Self {
            telegram,
            cli_enabled,
            media_dir,
            reprompt_unmatched,
            ..Self::default()
        })
    }
}

fn parse_bool(key: &str, raw: Option<String>) -> Result<Option<bool>, ConfigError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(Some(true)),
        "0" | "false" | "no" | "off" | "" => Ok(Some(false)),
        other => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected a boolean, got {other:?}"),
        }),
    }
}
