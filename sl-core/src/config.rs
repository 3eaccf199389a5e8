//! Client configuration management.
//!
//! Handles loading, saving, and validating the client configuration: the
//! server endpoint, the reconnect policy, logging, notifications and the
//! default channel list. Configuration is persisted as TOML on disk.

use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::{Deserialize, Serialize};

use crate::error::{SlError, SlResult};
use crate::platform;

/// Top-level client configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server connection settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Reconnection policy.
    #[serde(default)]
    pub reconnect: ReconnectConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Notification settings.
    #[serde(default)]
    pub notifications: NotificationConfig,

    /// Channels subscribed on startup.
    #[serde(default)]
    pub subscriptions: SubscriptionConfig,
}

/// Server connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// WebSocket endpoint (e.g., "wss://scanner.example.com/ws").
    #[serde(default)]
    pub url: String,

    /// Handshake timeout in milliseconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
}

/// Reconnection policy: exponential backoff bounded by `max_delay_ms`,
/// giving up after `max_attempts` consecutive failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt.
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,

    /// Maximum delay cap for exponential backoff.
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Maximum number of consecutive reconnection attempts.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Jitter factor (0.0 to 1.0) applied to each delay. Zero disables jitter.
    #[serde(default)]
    pub jitter_factor: f64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for log files. If empty, uses default location.
    #[serde(default)]
    pub directory: String,

    /// Enable JSON structured logging output.
    #[serde(default)]
    pub json_output: bool,
}

/// Notification configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Show native desktop notifications in addition to the log.
    #[serde(default)]
    pub desktop: bool,
}

/// Default subscriptions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubscriptionConfig {
    /// Channel names subscribed when the client starts.
    #[serde(default)]
    pub channels: Vec<String>,
}

// Default value functions for serde

fn default_connect_timeout() -> u64 {
    10_000
}

fn default_base_delay() -> u64 {
    1_000
}

fn default_max_delay() -> u64 {
    30_000
}

fn default_max_attempts() -> u32 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            connect_timeout_ms: default_connect_timeout(),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
            max_attempts: default_max_attempts(),
            jitter_factor: 0.0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: String::new(),
            json_output: false,
        }
    }
}

impl LoggingConfig {
    /// The configured log directory, or `logs/` under the data directory.
    pub fn effective_directory(&self) -> SlResult<PathBuf> {
        if self.directory.is_empty() {
            Ok(platform::data_dir()?.join("logs"))
        } else {
            Ok(PathBuf::from(&self.directory))
        }
    }
}

impl ServerConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl ReconnectConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Check that the policy is bounded and well-formed.
    pub fn validate(&self) -> SlResult<()> {
        if self.max_attempts == 0 {
            return Err(SlError::Config("reconnect.max_attempts must be at least 1".into()));
        }
        if self.base_delay_ms == 0 {
            return Err(SlError::Config("reconnect.base_delay_ms must be positive".into()));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(SlError::Config(
                "reconnect.max_delay_ms must not be smaller than base_delay_ms".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(SlError::Config("reconnect.jitter_factor must be within 0.0..=1.0".into()));
        }
        Ok(())
    }
}

impl AppConfig {
    /// Load `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> SlResult<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &Path) -> SlResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: AppConfig = toml::from_str(&contents)?;
        config.server.url = Self::sanitize_server_url(&config.server.url);
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a specific file path.
    pub fn save_to_file(&self, path: &Path) -> SlResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)
            .map_err(|e| SlError::Config(format!("failed to serialize config: {e}")))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> SlResult<PathBuf> {
        Ok(platform::config_dir()?.join("config.toml"))
    }

    /// Validate every section that has constraints.
    pub fn validate(&self) -> SlResult<()> {
        self.reconnect.validate()
    }

    /// Check whether a server endpoint is configured.
    pub fn is_server_configured(&self) -> bool {
        !self.server.url.is_empty()
    }

    /// Sanitize and normalize a server URL into a WebSocket URL.
    ///
    /// Adds a `ws://` scheme when none is given, maps `http(s)://` to
    /// `ws(s)://`, and strips trailing slashes.
    pub fn sanitize_server_url(url: &str) -> String {
        let trimmed = url.trim().trim_matches('"').trim();
        if trimmed.is_empty() {
            return String::new();
        }

        let with_scheme = if trimmed.starts_with("ws://") || trimmed.starts_with("wss://") {
            trimmed.to_string()
        } else if let Some(rest) = trimmed.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = trimmed.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            format!("ws://{trimmed}")
        };

        with_scheme.trim_end_matches('/').to_string()
    }
}
