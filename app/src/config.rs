use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::address::DEFAULT_DISPLAY_CHARS;
use crate::errors::{WalletError, WalletResult};

const ENV_ENVIRONMENT: &str = "STELLAR_INSURED_ENV";
const ENV_STORAGE_KEY: &str = "STELLAR_INSURED_STORAGE_KEY";
const ENV_COOKIE_NAME: &str = "STELLAR_INSURED_COOKIE_NAME";
const ENV_COOKIE_MAX_AGE: &str = "STELLAR_INSURED_COOKIE_MAX_AGE_SECS";
const ENV_CHALLENGE_LABEL: &str = "STELLAR_INSURED_CHALLENGE_LABEL";
const ENV_PRESENCE_POLL: &str = "STELLAR_INSURED_PRESENCE_POLL_MS";
const ENV_DISPLAY_CHARS: &str = "STELLAR_INSURED_ADDRESS_DISPLAY_CHARS";

pub const DEFAULT_STORAGE_KEY: &str = "wallet-store";
pub const DEFAULT_COOKIE_NAME: &str = "stellar_insured_session";
pub const DEFAULT_CHALLENGE_LABEL: &str = "Stellar Insured Authentication";
pub const DEFAULT_COOKIE_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);
pub const DEFAULT_PRESENCE_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Deployment environments with different defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            "test" | "testing" => Environment::Test,
            _ => Environment::Development,
        }
    }
}

/// Runtime settings for the client core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub environment: Environment,
    /// Key under which wallet state is persisted.
    pub storage_key: String,
    pub cookie_name: String,
    pub cookie_max_age: Duration,
    /// First line of the message the wallet is asked to sign.
    pub challenge_label: String,
    /// Fallback polling interval when the provider has no push channel.
    pub presence_poll_interval: Duration,
    pub address_display_chars: usize,
}

impl ClientConfig {
    pub fn new(environment: Environment) -> Self {
        let presence_poll_interval = match environment {
            Environment::Test => Duration::from_millis(50),
            Environment::Development | Environment::Production => DEFAULT_PRESENCE_POLL_INTERVAL,
        };

        Self {
            environment,
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            cookie_max_age: DEFAULT_COOKIE_MAX_AGE,
            challenge_label: DEFAULT_CHALLENGE_LABEL.to_string(),
            presence_poll_interval,
            address_display_chars: DEFAULT_DISPLAY_CHARS,
        }
    }

    /// Load configuration from process environment variables.
    pub fn from_env() -> WalletResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> WalletResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| -> Option<String> {
            let value = lookup(key)?;
            if value.trim().is_empty() {
                log::warn!("Environment variable {} is empty", key);
                return None;
            }
            if value.chars().any(|c| c.is_control()) {
                log::warn!(
                    "Environment variable {} contains control characters, ignoring",
                    key
                );
                return None;
            }
            Some(value)
        };

        let environment = read(ENV_ENVIRONMENT)
            .map(|value| Environment::parse(&value))
            .unwrap_or(Environment::Development);
        let mut config = Self::new(environment);

        if let Some(value) = read(ENV_STORAGE_KEY) {
            config.storage_key = value.trim().to_string();
        }
        if let Some(value) = read(ENV_COOKIE_NAME) {
            config.cookie_name = parse_cookie_name(&value, ENV_COOKIE_NAME)?;
        }
        if let Some(value) = read(ENV_COOKIE_MAX_AGE) {
            config.cookie_max_age = Duration::from_secs(parse_u64_value(&value, ENV_COOKIE_MAX_AGE)?);
        }
        if let Some(value) = read(ENV_CHALLENGE_LABEL) {
            config.challenge_label = value.trim().to_string();
        }
        if let Some(value) = read(ENV_PRESENCE_POLL) {
            let millis = parse_u64_value(&value, ENV_PRESENCE_POLL)?;
            if millis == 0 {
                return Err(WalletError::ValidationError(format!(
                    "Configuration key '{}' must be greater than zero",
                    ENV_PRESENCE_POLL
                )));
            }
            config.presence_poll_interval = Duration::from_millis(millis);
        }
        if let Some(value) = read(ENV_DISPLAY_CHARS) {
            config.address_display_chars = parse_usize_value(&value, ENV_DISPLAY_CHARS)?;
        }

        log::debug!("Loaded client configuration for {:?}", config.environment);
        Ok(config)
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    /// Log verbosity for the environment.
    pub fn log_level(&self) -> log::LevelFilter {
        match self.environment {
            Environment::Production => log::LevelFilter::Info,
            Environment::Development => log::LevelFilter::Debug,
            Environment::Test => log::LevelFilter::Warn,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(Environment::Development)
    }
}

fn parse_u64_value(value: &str, key: &str) -> WalletResult<u64> {
    value.trim().parse::<u64>().map_err(|_| {
        WalletError::ValidationError(format!(
            "Invalid numeric value '{}' for key '{}'",
            value, key
        ))
    })
}

/// Like [`parse_u64_value`], but rejects values the target's `usize` cannot hold.
fn parse_usize_value(value: &str, key: &str) -> WalletResult<usize> {
    let parsed = parse_u64_value(value, key)?;
    usize::try_from(parsed).map_err(|_| {
        WalletError::ValidationError(format!(
            "Numeric value '{}' for key '{}' is out of range",
            value, key
        ))
    })
}

fn parse_cookie_name(value: &str, key: &str) -> WalletResult<String> {
    let trimmed = value.trim();
    let valid = trimmed
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !valid {
        return Err(WalletError::ValidationError(format!(
            "Invalid cookie name '{}' for key '{}'",
            value, key
        )));
    }
    Ok(trimmed.to_string())
}
