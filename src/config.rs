//! # Configuration Module
//!
//! Bot settings loaded from environment variables (and `.env` when present).

use std::env;
use std::time::Duration;
use thiserror::Error;

/// Reminder offsets used when `REMIND_DAYS_BEFORE` is unset or unusable
pub const DEFAULT_REMIND_DAYS_BEFORE: [u32; 3] = [7, 1, 0];
/// Offsets further out than this are ignored
pub const MAX_REMIND_DAYS_BEFORE: u32 = 365;
pub const DEFAULT_REMINDER_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 5;

/// Configuration errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(String),
    #[error("invalid value for {var}: {reason}")]
    InvalidValue { var: String, reason: String },
}

/// Runtime configuration of the bot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotConfig {
    pub bot_token: String,
    pub database_url: String,
    /// Days before the due date on which both parties get a reminder
    pub remind_days_before: Vec<u32>,
    /// Period of the reminder sweep
    pub reminder_interval: Duration,
    pub database_max_connections: u32,
}

impl BotConfig {
    /// Load configuration from the process environment
    ///
    /// Required: `TELEGRAM_BOT_TOKEN` (or `BOT_TOKEN`) and `DATABASE_URL`.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bot_token = non_empty("TELEGRAM_BOT_TOKEN")
            .or_else(|| non_empty("BOT_TOKEN"))
            .ok_or_else(|| ConfigError::MissingVar("TELEGRAM_BOT_TOKEN".to_string()))?;

        let database_url = non_empty("DATABASE_URL")
            .ok_or_else(|| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let remind_days_before = non_empty("REMIND_DAYS_BEFORE")
            .map(|raw| parse_remind_days(&raw))
            .unwrap_or_else(|| DEFAULT_REMIND_DAYS_BEFORE.to_vec());

        let reminder_interval_secs = match non_empty("REMINDER_INTERVAL_SECS") {
            Some(raw) => parse_positive("REMINDER_INTERVAL_SECS", &raw)?,
            None => DEFAULT_REMINDER_INTERVAL_SECS,
        };

        let database_max_connections = match non_empty("DATABASE_MAX_CONNECTIONS") {
            Some(raw) => parse_positive("DATABASE_MAX_CONNECTIONS", &raw)? as u32,
            None => DEFAULT_DATABASE_MAX_CONNECTIONS,
        };

        Ok(Self {
            bot_token,
            database_url,
            remind_days_before,
            reminder_interval: Duration::from_secs(reminder_interval_secs),
            database_max_connections,
        })
    }
}

/// Parse `"7,1,0"` into day offsets
///
/// Unparseable and out-of-range entries are skipped, duplicates dropped and
/// the result sorted descending. Falls back to the defaults when nothing is left.
pub fn parse_remind_days(raw: &str) -> Vec<u32> {
    let mut days: Vec<u32> = raw
        .split(',')
        .filter_map(|part| part.trim().parse::<u32>().ok())
        .filter(|day| *day <= MAX_REMIND_DAYS_BEFORE)
        .collect();
    days.sort_unstable_by(|a, b| b.cmp(a));
    days.dedup();

    if days.is_empty() {
        DEFAULT_REMIND_DAYS_BEFORE.to_vec()
    } else {
        days
    }
}

fn parse_positive(var: &str, raw: &str) -> Result<u64, ConfigError> {
    match raw.trim().parse::<u64>() {
        Ok(value) if value > 0 && value <= u32::MAX as u64 => Ok(value),
        _ => Err(ConfigError::InvalidValue {
            var: var.to_string(),
            reason: format!("expected a positive integer, got '{raw}'"),
        }),
    }
}
