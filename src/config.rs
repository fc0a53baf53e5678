//! Configuration loading and defaults.
//!
//! Configuration is resolved in order of precedence (highest wins):
//!
//! 1. **Environment variables**: `WAHA_PANEL_CREDENTIALS`,
//!    `WAHA_PANEL_QR_DIR`, `WAHA_PANEL_POLL_MS`
//! 2. **Config file**: path via `--config <path>`, or `waha-panel.toml` in CWD
//! 3. **Compiled defaults**: see each field's default value below
//!
//! The TOML file mirrors the struct hierarchy:
//!
//! ```toml
//! [gateway]
//! request_timeout_ms = 30000
//! connect_timeout_ms = 10000
//! probe_timeout_ms = 10000
//!
//! [poller]
//! interval_ms = 5000
//!
//! [storage]
//! credentials_file = "~/.config/waha-panel/credentials.toml"
//! qr_dir = "~/.cache/waha-panel"
//!
//! [logging]
//! level = "warn"
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::util::expand_path;

/// Config file looked up in the current directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "waha-panel.toml";

/// Top-level configuration, deserialized from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewaySettings,
    #[serde(default)]
    pub poller: PollerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Outbound request limits.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewaySettings {
    /// Total timeout for every authenticated call (default 30 000 ms).
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// TCP connect timeout (default 10 000 ms).
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Timeout for the login probe (default 10 000 ms).
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

/// Session poller cadence.
#[derive(Debug, Clone, Deserialize)]
pub struct PollerConfig {
    /// Milliseconds between status fetches (default 5000).
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

/// Where local state lives.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Credential file holding host and API key. `~` is expanded.
    #[serde(default = "default_credentials_file")]
    pub credentials_file: String,
    /// Directory the pairing QR image is written to. `~` is expanded.
    #[serde(default = "default_qr_dir")]
    pub qr_dir: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// tracing filter level (default `warn`). Overridden by `RUST_LOG` env var.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_request_timeout_ms() -> u64 {
    30_000
}
fn default_connect_timeout_ms() -> u64 {
    10_000
}
fn default_probe_timeout_ms() -> u64 {
    10_000
}
fn default_interval_ms() -> u64 {
    5000
}
fn default_credentials_file() -> String {
    "~/.config/waha-panel/credentials.toml".to_string()
}
fn default_qr_dir() -> String {
    "~/.cache/waha-panel".to_string()
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
        }
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            credentials_file: default_credentials_file(),
            qr_dir: default_qr_dir(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl GatewaySettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

impl PollerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}

impl StorageConfig {
    pub fn credentials_path(&self) -> PathBuf {
        expand_path(&self.credentials_file)
    }

    pub fn qr_path(&self) -> PathBuf {
        expand_path(&self.qr_dir)
    }
}

impl Config {
    /// Load configuration with the precedence chain: env vars > file > defaults.
    ///
    /// If `path` is `Some`, that file must exist and parse. Otherwise
    /// `waha-panel.toml` in the current directory is used when present.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };

        // Env var overrides
        if let Ok(file) = std::env::var("WAHA_PANEL_CREDENTIALS") {
            config.storage.credentials_file = file;
        }
        if let Ok(dir) = std::env::var("WAHA_PANEL_QR_DIR") {
            config.storage.qr_dir = dir;
        }
        if let Ok(ms) = std::env::var("WAHA_PANEL_POLL_MS") {
            config.poller.interval_ms = ms.parse().map_err(|_| ConfigError::InvalidEnv {
                name: "WAHA_PANEL_POLL_MS",
                value: ms.clone(),
            })?;
        }

        Ok(config)
    }

    /// Parse a config file without applying env overrides.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}
