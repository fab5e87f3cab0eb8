//! # configs
//!
//! Layered settings for the forum core: built-in defaults, then an optional
//! `config/forum.{toml,yaml,json}` file, then `FORUM__*` environment
//! variables (`__` separates nesting levels, e.g. `FORUM__DATABASE__URL`).

pub mod telemetry;

use std::time::Duration;

use chrono::TimeDelta;
use config::{Config, Environment, File};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use services::{ForumOptions, RetryPolicy};
use thiserror::Error;

const ENV_PREFIX: &str = "FORUM";
const CONFIG_FILE: &str = "config/forum";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load settings: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("failed to install log subscriber: {0}")]
    Telemetry(String),
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub forum: ForumSettings,
    pub log: LogSettings,
}

#[derive(Debug, Deserialize)]
pub struct DatabaseSettings {
    /// Connection URL, e.g. `sqlite://forum.db` or `sqlite::memory:`.
    pub url: SecretString,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForumSettings {
    pub unknown_author_label: String,
    pub visit_window_secs: i64,
    pub verify_invariants: bool,
    pub retry: RetrySettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    /// `EnvFilter` directives; `RUST_LOG` wins when set.
    pub filter: String,
    pub json: bool,
}

impl Settings {
    /// Reads `.env` (if any), then the config file and `FORUM__*` variables.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env");
        }
        Self::load_from(Environment::with_prefix(ENV_PREFIX))
    }

    /// Same layering as `load`, with the environment layer supplied by the caller.
    pub fn load_from(env: Environment) -> Result<Self, ConfigError> {
        let settings: Settings = defaults()?
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(env.separator("__").try_parsing(true))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.database.url.expose_secret().trim().is_empty() {
            return Err(invalid("database.url", "must not be empty"));
        }
        if self.database.max_connections == 0 {
            return Err(invalid("database.max_connections", "must be at least 1"));
        }
        if self.forum.visit_window_secs < 0 {
            return Err(invalid("forum.visit_window_secs", "must not be negative"));
        }
        let retry = &self.forum.retry;
        if retry.max_attempts == 0 {
            return Err(invalid("forum.retry.max_attempts", "must be at least 1"));
        }
        if retry.base_delay_ms > retry.max_delay_ms {
            return Err(invalid(
                "forum.retry.base_delay_ms",
                "must not exceed forum.retry.max_delay_ms",
            ));
        }
        Ok(())
    }
}

impl ForumSettings {
    pub fn visit_window(&self) -> TimeDelta {
        TimeDelta::seconds(self.visit_window_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
        }
    }

    pub fn to_options(&self) -> ForumOptions {
        ForumOptions {
            unknown_author_label: self.unknown_author_label.clone(),
            visit_window: self.visit_window(),
            verify_invariants: self.verify_invariants,
            retry: self.retry_policy(),
        }
    }
}

fn defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
    Ok(Config::builder()
        .set_default("database.url", "sqlite://forum.db")?
        .set_default("database.max_connections", 5)?
        .set_default("forum.unknown_author_label", "Unknown")?
        .set_default("forum.visit_window_secs", 3600)?
        .set_default("forum.verify_invariants", true)?
        .set_default("forum.retry.max_attempts", 4)?
        .set_default("forum.retry.base_delay_ms", 50)?
        .set_default("forum.retry.max_delay_ms", 1000)?
        .set_default("log.filter", "info")?
        .set_default("log.json", false)?)
}

fn invalid(key: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> Environment {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Environment::with_prefix(ENV_PREFIX).source(Some(map))
    }

    #[test]
    fn defaults_match_the_service_defaults() {
        let settings = Settings::load_from(env(&[])).unwrap();
        assert_eq!(settings.database.url.expose_secret(), "sqlite://forum.db");
        assert_eq!(settings.database.max_connections, 5);
        assert_eq!(settings.log.filter, "info");
        assert!(!settings.log.json);

        let options = settings.forum.to_options();
        let fallback = ForumOptions::default();
        assert_eq!(options.unknown_author_label, fallback.unknown_author_label);
        assert_eq!(options.visit_window, fallback.visit_window);
        assert_eq!(options.verify_invariants, fallback.verify_invariants);
        assert_eq!(options.retry, fallback.retry);
    }

    #[test]
    fn environment_overrides_nested_keys() {
        let settings = Settings::load_from(env(&[
            ("FORUM__DATABASE__URL", "sqlite::memory:"),
            ("FORUM__DATABASE__MAX_CONNECTIONS", "1"),
            ("FORUM__FORUM__UNKNOWN_AUTHOR_LABEL", "Anonymous"),
            ("FORUM__FORUM__VISIT_WINDOW_SECS", "60"),
            ("FORUM__FORUM__RETRY__MAX_ATTEMPTS", "2"),
            ("FORUM__LOG__JSON", "true"),
        ]))
        .unwrap();

        assert_eq!(settings.database.url.expose_secret(), "sqlite::memory:");
        assert_eq!(settings.database.max_connections, 1);
        assert_eq!(settings.forum.unknown_author_label, "Anonymous");
        assert_eq!(settings.forum.visit_window(), TimeDelta::seconds(60));
        assert_eq!(settings.forum.retry_policy().max_attempts, 2);
        assert!(settings.log.json);
    }

    #[test]
    fn database_url_is_redacted_in_debug_output() {
        let settings = Settings::load_from(env(&[(
            "FORUM__DATABASE__URL",
            "sqlite:///var/lib/forum/secret.db",
        )]))
        .unwrap();
        assert!(!format!("{settings:?}").contains("secret.db"));
    }

    #[test]
    fn nonsensical_values_are_rejected() {
        let err = Settings::load_from(env(&[("FORUM__FORUM__RETRY__MAX_ATTEMPTS", "0")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "forum.retry.max_attempts", .. }));

        let err = Settings::load_from(env(&[("FORUM__FORUM__RETRY__BASE_DELAY_MS", "5000")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "forum.retry.base_delay_ms", .. }));
    }
}
