//! Environment-driven configuration.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::formatter::MessageStyle;
use crate::gate::GatePolicy;

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 10_000;
pub const DEFAULT_PORT: u16 = 3000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{key} has invalid value '{value}': {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Clone)]
pub struct SheetsConfig {
    pub service_account_email: String,
    pub private_key: String,
    pub sheet_id: String,
}

impl fmt::Debug for SheetsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SheetsConfig")
            .field("service_account_email", &self.service_account_email)
            .field("private_key", &"<redacted>")
            .field("sheet_id", &self.sheet_id)
            .finish()
    }
}

impl SheetsConfig {
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            service_account_email: required(&lookup, "GOOGLE_SERVICE_ACCOUNT_EMAIL")?,
            // Keys pasted into a single-line env var carry literal "\n" sequences.
            private_key: required(&lookup, "GOOGLE_PRIVATE_KEY")?.replace("\\n", "\n"),
            sheet_id: required(&lookup, "GOOGLE_SHEET_ID")?,
        })
    }
}

#[derive(Clone)]
pub struct DiscordConfig {
    pub token: String,
    pub channel_id: String,
}

impl fmt::Debug for DiscordConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscordConfig")
            .field("token", &"<redacted>")
            .field("channel_id", &self.channel_id)
            .finish()
    }
}

impl DiscordConfig {
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            token: required(&lookup, "DISCORD_TOKEN")?,
            channel_id: required(&lookup, "DISCORD_CHANNEL_ID")?,
        })
    }
}

/// Reads `MIN_REQUEST_INTERVAL`, `MAX_RETRIES`, `INITIAL_BACKOFF` and `MAX_BACKOFF`.
pub fn gate_policy_from_lookup<F>(lookup: F) -> Result<GatePolicy, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = GatePolicy::default();
    let max_attempts: u32 = optional(&lookup, "MAX_RETRIES")?.unwrap_or(defaults.max_attempts);
    if max_attempts == 0 {
        return Err(ConfigError::Invalid {
            key: "MAX_RETRIES",
            value: "0".to_string(),
            reason: "at least one attempt is required".to_string(),
        });
    }

    Ok(GatePolicy {
        min_spacing: millis(&lookup, "MIN_REQUEST_INTERVAL")?.unwrap_or(defaults.min_spacing),
        max_attempts,
        initial_backoff: millis(&lookup, "INITIAL_BACKOFF")?.unwrap_or(defaults.initial_backoff),
        max_backoff: millis(&lookup, "MAX_BACKOFF")?.unwrap_or(defaults.max_backoff),
    })
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub sheets: SheetsConfig,
    pub discord: DiscordConfig,
    pub gate: GatePolicy,
    pub poll_interval: Duration,
    pub message_style: MessageStyle,
    pub port: u16,
}

impl RelayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let poll_interval = millis(&lookup, "UPDATE_INTERVAL")?
            .unwrap_or(Duration::from_millis(DEFAULT_POLL_INTERVAL_MS));
        if poll_interval.is_zero() {
            return Err(ConfigError::Invalid {
                key: "UPDATE_INTERVAL",
                value: "0".to_string(),
                reason: "poll interval must be positive".to_string(),
            });
        }

        Ok(Self {
            sheets: SheetsConfig::from_lookup(&lookup)?,
            discord: DiscordConfig::from_lookup(&lookup)?,
            gate: gate_policy_from_lookup(&lookup)?,
            poll_interval,
            message_style: optional(&lookup, "MESSAGE_STYLE")?.unwrap_or_default(),
            port: optional(&lookup, "PORT")?.unwrap_or(DEFAULT_PORT),
        })
    }
}

fn required<F>(lookup: &F, key: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .filter(|value| !value.trim().is_empty())
        .ok_or(ConfigError::Missing(key))
}

fn optional<F, T>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: fmt::Display,
{
    let Some(raw) = lookup(key).filter(|value| !value.trim().is_empty()) else {
        return Ok(None);
    };
    raw.trim()
        .parse()
        .map(Some)
        .map_err(|err: T::Err| ConfigError::Invalid {
            key,
            value: raw.clone(),
            reason: err.to_string(),
        })
}

fn millis<F>(lookup: &F, key: &'static str) -> Result<Option<Duration>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    Ok(optional::<F, u64>(lookup, key)?.map(Duration::from_millis))
}
