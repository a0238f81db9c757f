//! Configuration System
//!
//! Layered configuration for the report client: built-in defaults, the
//! user's global file, workspace files, then `HUB_AUDIT__SECTION__KEY`
//! environment variables. Validation reports every problem at once.

use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;
pub use sources::global_file::global_config_path;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Remote job API connection
    #[serde(default)]
    pub client: ClientConfig,

    /// Poll scheduling
    #[serde(default)]
    pub polling: PollingConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Session credential; the CLI's `--session` flag takes precedence.
    #[serde(default)]
    pub session_token: Option<String>,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

pub(crate) fn default_base_url() -> String {
    "http://localhost:8080/api".to_string()
}

pub(crate) fn default_connect_timeout() -> u64 {
    10
}

pub(crate) fn default_request_timeout() -> u64 {
    30
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            session_token: None,
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Fixed wait between poll attempts
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Attempt ceiling per polling loop; absent means poll until done.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
}

pub(crate) fn default_interval() -> u64 {
    60
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            max_attempts: None,
        }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Client(String),
    Polling(String),
    Logging(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::Client(msg) => write!(f, "client: {}", msg),
            ValidationError::Polling(msg) => write!(f, "polling: {}", msg),
            ValidationError::Logging(msg) => write!(f, "logging: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl ClientConfig {
    fn validate(&self, errors: &mut Vec<ValidationError>) {
        let url = self.base_url.trim();
        if url.is_empty() {
            errors.push(ValidationError::Client("base_url cannot be empty".to_string()));
        } else if !(url.starts_with("http://") || url.starts_with("https://")) {
            errors.push(ValidationError::Client(format!(
                "base_url must start with http:// or https://, got '{}'",
                url
            )));
        }
        if self.connect_timeout_secs == 0 {
            errors.push(ValidationError::Client(
                "connect_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            errors.push(ValidationError::Client(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }
    }
}

impl PollingConfig {
    fn validate(&self, errors: &mut Vec<ValidationError>) {
        if self.interval_secs == 0 {
            errors.push(ValidationError::Polling(
                "interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.max_attempts == Some(0) {
            errors.push(ValidationError::Polling(
                "max_attempts must be at least 1 when set".to_string(),
            ));
        }
    }
}

impl AuditConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        self.client.validate(&mut errors);
        self.polling.validate(&mut errors);
        if let Err(e) = self.logging.validate() {
            errors.push(ValidationError::Logging(e));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Copy safe to print: the session token is masked.
    pub fn redacted(&self) -> AuditConfig {
        let mut config = self.clone();
        if config.client.session_token.is_some() {
            config.client.session_token = Some("***".to_string());
        }
        config
    }
}
