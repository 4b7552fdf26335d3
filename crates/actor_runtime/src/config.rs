//! Runtime configuration
//!
//! Configuration is read from a TOML file, from environment variables, or
//! from both with the environment taking precedence. Every loader runs
//! [`Validate::validate`] before handing the configuration out.

use crate::mailbox::MailboxConfig;
use serde::{Deserialize, Serialize};
use std::{path::Path, time::Duration};
use thiserror::Error;

/// Default environment variable prefix
pub const DEFAULT_ENV_PREFIX: &str = "ACTOR_RUNTIME_";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("Configuration parse error: {reason}")]
    ParseError { reason: String },

    #[error("Configuration validation error: {field} - {reason}")]
    ValidationError { field: String, reason: String },

    #[error("Environment variable error: {var} - {reason}")]
    EnvVarError { var: String, reason: String },

    #[error("IO error: {reason}")]
    IoError { reason: String },
}

/// Configuration validation trait
pub trait Validate {
    fn validate(&self) -> Result<(), ConfigError>;
}

/// Top-level configuration of an actor system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Node value stamped into every address
    pub node: u32,
    /// Mailbox sizing for every spawned actor
    pub mailbox: MailboxConfig,
    /// How long a synchronous call waits for its reply
    pub call_timeout_ms: u64,
    /// How long each path segment lookup waits for its reply
    pub lookup_timeout_ms: u64,
    /// How long shutdown waits for every actor to stop
    pub shutdown_timeout_ms: u64,
    /// Log output settings
    pub logging: LoggingConfig,
}

/// Log output settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `actor_runtime=debug`
    pub level: String,
    pub with_target: bool,
    /// Force file and line output regardless of level
    pub with_file_and_line: bool,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            node: crate::address::LOCAL_NODE,
            mailbox: MailboxConfig::default(),
            call_timeout_ms: 100,
            lookup_timeout_ms: 1_000,
            shutdown_timeout_ms: 5_000,
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            with_target: true,
            with_file_and_line: false,
        }
    }
}

impl SystemConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            reason: format!("Failed to read {}: {}", path.display(), e),
        })?;

        let config: SystemConfig = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            reason: format!("Failed to parse TOML: {}", e),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables on top of the defaults
    pub fn load_from_env(prefix: &str) -> Result<Self, ConfigError> {
        let mut config = SystemConfig::default();
        config.apply_env_overrides(prefix)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file, then apply environment overrides
    pub fn load_with_overrides<P: AsRef<Path>>(
        path: P,
        env_prefix: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides(env_prefix.unwrap_or(DEFAULT_ENV_PREFIX))?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self, prefix: &str) -> Result<(), ConfigError> {
        if let Some(node) = env_var(prefix, "NODE")? {
            self.node = node;
        }
        if let Some(capacity) = env_var(prefix, "MAILBOX_CAPACITY")? {
            self.mailbox.capacity = capacity;
        }
        if let Some(threshold) = env_var(prefix, "MAILBOX_WARN_THRESHOLD")? {
            self.mailbox.warn_threshold = threshold;
        }
        if let Some(ms) = env_var(prefix, "CALL_TIMEOUT_MS")? {
            self.call_timeout_ms = ms;
        }
        if let Some(ms) = env_var(prefix, "LOOKUP_TIMEOUT_MS")? {
            self.lookup_timeout_ms = ms;
        }
        if let Some(ms) = env_var(prefix, "SHUTDOWN_TIMEOUT_MS")? {
            self.shutdown_timeout_ms = ms;
        }
        if let Ok(level) = std::env::var(format!("{}LOG_LEVEL", prefix)) {
            self.logging.level = level;
        }
        Ok(())
    }
}

fn env_var<T>(prefix: &str, name: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let var = format!("{}{}", prefix, name);
    match std::env::var(&var) {
        Ok(raw) => raw.trim().parse().map(Some).map_err(|e| ConfigError::EnvVarError {
            var,
            reason: format!("Invalid value {:?}: {}", raw, e),
        }),
        Err(_) => Ok(None),
    }
}

impl Validate for SystemConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        self.mailbox.validate()?;

        for (field, value) in [
            ("call_timeout_ms", self.call_timeout_ms),
            ("lookup_timeout_ms", self.lookup_timeout_ms),
            ("shutdown_timeout_ms", self.shutdown_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::ValidationError {
                    field: field.to_string(),
                    reason: "must be greater than zero".to_string(),
                });
            }
        }

        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::ValidationError {
                field: "logging.level".to_string(),
                reason: "must not be empty".to_string(),
            });
        }

        Ok(())
    }
}
