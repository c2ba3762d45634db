use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use teloxide::types::ChatId;
use thiserror::Error;

use crate::i18n::Language;
use crate::relay::{RetryPolicy, Route};

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the config file.
    #[error("failed to read config file '{}': {source}", path.display())]
    ReadFile { path: PathBuf, source: std::io::Error },
    /// Failed to parse JSON.
    #[error("failed to parse config file '{}': {source}", path.display())]
    ParseJson { path: PathBuf, source: serde_json::Error },
    /// Validation error.
    #[error("config validation error: {0}")]
    Validation(String),
}

#[derive(Deserialize)]
struct ConfigFile {
    telegram_bot_token: String,
    /// Group the bot watches for audio.
    source_chat_id: i64,
    /// Channel audio is forwarded to.
    destination_chat_id: i64,
    /// Receives a notice when the bot comes up.
    owner_id: Option<i64>,
    /// Chat that receives WARN/ERROR logs.
    log_chat_id: Option<i64>,
    #[serde(default = "default_language")]
    default_language: String,
    /// Directory for state files (logs, database). Defaults to current directory.
    data_dir: Option<String>,
    database_path: Option<String>,
    #[serde(default = "default_database_timeout_secs")]
    database_timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    max_attempts: u32,
    #[serde(default = "default_base_delay_secs")]
    base_delay_secs: u64,
    #[serde(default = "default_watchdog_interval_secs")]
    watchdog_interval_secs: u64,
    #[serde(default = "default_watchdog_first_tick_secs")]
    watchdog_first_tick_secs: u64,
    #[serde(default = "default_activity_timeout_secs")]
    activity_timeout_secs: u64,
    #[serde(default = "default_startup_sync_delay_secs")]
    startup_sync_delay_secs: u64,
    #[serde(default = "default_max_restarts")]
    max_restarts: u32,
    #[serde(default = "default_log_level")]
    log_level: String,
}

fn default_language() -> String {
    "en".to_string()
}

fn default_database_timeout_secs() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_secs() -> u64 {
    5
}

fn default_watchdog_interval_secs() -> u64 {
    300
}

fn default_watchdog_first_tick_secs() -> u64 {
    10
}

fn default_activity_timeout_secs() -> u64 {
    300
}

fn default_startup_sync_delay_secs() -> u64 {
    5
}

fn default_max_restarts() -> u32 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

pub struct Config {
    pub telegram_bot_token: String,
    pub source_chat_id: ChatId,
    pub destination_chat_id: ChatId,
    pub owner_id: Option<ChatId>,
    pub log_chat_id: Option<ChatId>,
    pub default_language: Language,
    /// Directory for state files (logs).
    pub data_dir: PathBuf,
    pub database_path: PathBuf,
    pub database_timeout: Duration,
    pub retry_policy: RetryPolicy,
    pub watchdog_interval: Duration,
    pub watchdog_first_tick: Duration,
    pub activity_timeout: Duration,
    pub startup_sync_delay: Duration,
    pub max_restarts: u32,
    pub log_level: String,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config_path = path.as_ref().to_path_buf();
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| ConfigError::ReadFile { path: config_path.clone(), source: e })?;
        let file: ConfigFile = serde_json::from_str(&content)
            .map_err(|e| ConfigError::ParseJson { path: config_path.clone(), source: e })?;

        if file.telegram_bot_token.is_empty() {
            return Err(ConfigError::Validation("telegram_bot_token is required".into()));
        }
        // Telegram tokens are formatted as {bot_id}:{secret} where bot_id is numeric
        let token_parts: Vec<&str> = file.telegram_bot_token.split(':').collect();
        if token_parts.len() != 2 || token_parts[0].parse::<u64>().is_err() || token_parts[1].is_empty() {
            return Err(ConfigError::Validation(
                "telegram_bot_token appears invalid (expected format: 123456789:ABCdefGHI...)".into()
            ));
        }
        if file.source_chat_id == 0 {
            return Err(ConfigError::Validation("source_chat_id must be set".into()));
        }
        if file.destination_chat_id == 0 {
            return Err(ConfigError::Validation("destination_chat_id must be set".into()));
        }
        if file.source_chat_id == file.destination_chat_id {
            return Err(ConfigError::Validation(
                "source_chat_id and destination_chat_id must differ".into()
            ));
        }
        if file.max_attempts == 0 {
            return Err(ConfigError::Validation("max_attempts must be at least 1".into()));
        }
        if file.watchdog_interval_secs == 0 {
            return Err(ConfigError::Validation("watchdog_interval_secs must be positive".into()));
        }
        let default_language = Language::from_code(&file.default_language).ok_or_else(|| {
            ConfigError::Validation(format!(
                "unsupported default_language '{}' (supported: {})",
                file.default_language,
                Language::supported()
            ))
        })?;

        let data_dir = file
            .data_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        let database_path = file
            .database_path
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("data").join("forwarded_files.db"));

        Ok(Self {
            telegram_bot_token: file.telegram_bot_token,
            source_chat_id: ChatId(file.source_chat_id),
            destination_chat_id: ChatId(file.destination_chat_id),
            owner_id: file.owner_id.map(ChatId),
            log_chat_id: file.log_chat_id.map(ChatId),
            default_language,
            data_dir,
            database_path,
            database_timeout: Duration::from_secs(file.database_timeout_secs),
            retry_policy: RetryPolicy::new(file.max_attempts, Duration::from_secs(file.base_delay_secs)),
            watchdog_interval: Duration::from_secs(file.watchdog_interval_secs),
            watchdog_first_tick: Duration::from_secs(file.watchdog_first_tick_secs),
            activity_timeout: Duration::from_secs(file.activity_timeout_secs),
            startup_sync_delay: Duration::from_secs(file.startup_sync_delay_secs),
            max_restarts: file.max_restarts,
            log_level: file.log_level,
        })
    }

    pub fn route(&self) -> Route {
        Route {
            source_chat: self.source_chat_id.0,
            destination_chat: self.destination_chat_id.0,
        }
    }

    pub fn is_source_chat(&self, chat_id: ChatId) -> bool {
        self.source_chat_id == chat_id
    }
}
