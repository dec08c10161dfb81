//! # configs
//!
//! Layered settings for the comment service binary.
//!
//! Sources, lowest precedence first:
//! 1. built-in defaults
//! 2. `config/comment-service.{toml,yaml,json}` (optional)
//! 3. environment variables prefixed `COMMENTS__`, nested with `__`
//!    (e.g. `COMMENTS__RATE_LIMIT__MAX_ACTIONS=5`)
//!
//! A `.env` file in the working directory is loaded into the environment first.

use std::time::Duration;

use config::{Config, Environment, File};
use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub rate_limit: RateLimitSettings,
    pub comments: CommentSettings,
    pub telemetry: TelemetrySettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl ServerSettings {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Memory,
    Sqlite,
}

#[derive(Debug, Deserialize)]
pub struct DatabaseSettings {
    pub backend: DatabaseBackend,
    pub url: SecretString,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitSettings {
    pub max_actions: usize,
    pub window_secs: u64,
    pub retention_secs: u64,
    pub sweep_interval_secs: u64,
}

impl RateLimitSettings {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommentSettings {
    pub max_content_chars: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelemetrySettings {
    pub log_format: LogFormat,
    /// Fallback filter when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Settings {
    /// Loads `.env`, then layers defaults, the optional config file and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(path) => debug!(path = %path.display(), "loaded .env"),
            Err(e) if e.not_found() => {}
            Err(e) => debug!(error = %e, "ignoring unreadable .env"),
        }

        let builder = Self::defaults(Config::builder())?
            .add_source(File::with_name("config/comment-service").required(false))
            .add_source(
                Environment::with_prefix("COMMENTS")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );
        Self::from_config(builder.build()?)
    }

    /// Settings from defaults only; handy for tests and local runs.
    pub fn from_defaults() -> Result<Self, ConfigError> {
        Self::from_config(Self::defaults(Config::builder())?.build()?)
    }

    fn defaults(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Ok(builder
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("database.backend", "memory")?
            .set_default("database.url", "sqlite://comments.db")?
            .set_default("database.max_connections", 5)?
            .set_default("rate_limit.max_actions", 2)?
            .set_default("rate_limit.window_secs", 60)?
            .set_default("rate_limit.retention_secs", 120)?
            .set_default("rate_limit.sweep_interval_secs", 300)?
            .set_default("comments.max_content_chars", 1000)?
            .set_default("telemetry.log_format", "pretty")?
            .set_default("telemetry.log_filter", "info")?)
    }

    fn from_config(config: Config) -> Result<Self, ConfigError> {
        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let rl = &self.rate_limit;
        if rl.max_actions == 0 {
            return Err(ConfigError::Invalid("rate_limit.max_actions must be greater than 0".into()));
        }
        if rl.window_secs == 0 {
            return Err(ConfigError::Invalid("rate_limit.window_secs must be greater than 0".into()));
        }
        if rl.retention_secs < rl.window_secs {
            return Err(ConfigError::Invalid(
                "rate_limit.retention_secs must not be shorter than rate_limit.window_secs".into(),
            ));
        }
        if rl.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "rate_limit.sweep_interval_secs must be greater than 0".into(),
            ));
        }
        if self.comments.max_content_chars == 0 {
            return Err(ConfigError::Invalid("comments.max_content_chars must be greater than 0".into()));
        }
        Ok(())
    }
}
