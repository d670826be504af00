//! Engine configuration loading
//!
//! Loads configuration from `~/.config/pixelprops/pixelprops.toml` (or the
//! `PIXELPROPS_CONFIG` env var). Every field has a default, so a missing
//! file yields a working configuration.

use crate::error::ConfigError;
use crate::remote::DEFAULT_CERTIFIED_PROFILE_URL;
use serde::Deserialize;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct PropsConfig {
    /// Spoof gaming devices for known game titles
    #[serde(default)]
    pub games_enabled: bool,

    /// Refuse key attestation to GMS DroidGuard and the Play Store
    #[serde(default = "default_block_key_attestation")]
    pub block_key_attestation: bool,

    /// Log every package/process seen at attach time
    #[serde(default)]
    pub log_packages: bool,

    /// Certified profile refresh settings
    #[serde(default)]
    pub remote: RemoteConfig,
}

fn default_block_key_attestation() -> bool {
    true
}

/// Certified profile refresh configuration
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    /// Endpoint serving the certified profile JSON
    #[serde(default = "default_url")]
    pub url: String,

    /// Length of one wait step
    #[serde(default = "default_wait_interval_ms")]
    pub wait_interval_ms: u64,

    /// Number of wait steps before the caller proceeds without the fetch
    #[serde(default = "default_wait_iterations")]
    pub wait_iterations: u32,

    /// Upper bound on the HTTP request itself
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_url() -> String {
    DEFAULT_CERTIFIED_PROFILE_URL.to_string()
}
fn default_wait_interval_ms() -> u64 {
    1000
}
fn default_wait_iterations() -> u32 {
    10
}
fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            wait_interval_ms: default_wait_interval_ms(),
            wait_iterations: default_wait_iterations(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl RemoteConfig {
    /// Longest time a caller blocks waiting for a fetch.
    pub fn wait_budget(&self) -> Duration {
        Duration::from_millis(self.wait_interval_ms.saturating_mul(u64::from(self.wait_iterations)))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for PropsConfig {
    fn default() -> Self {
        Self {
            games_enabled: false,
            block_key_attestation: default_block_key_attestation(),
            log_packages: false,
            remote: RemoteConfig::default(),
        }
    }
}

impl PropsConfig {
    /// Environment variable for config path override
    pub const ENV_CONFIG_PATH: &'static str = "PIXELPROPS_CONFIG";

    /// Default config filename
    pub const DEFAULT_CONFIG_FILENAME: &'static str = "pixelprops.toml";

    /// Load configuration from file
    ///
    /// Resolution order:
    /// 1. `PIXELPROPS_CONFIG` environment variable
    /// 2. `~/.config/pixelprops/pixelprops.toml`
    ///
    /// If the config file doesn't exist, returns default configuration.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::resolve_config_path();

        if !path.exists() {
            tracing::info!(
                path = %path.display(),
                "pixelprops config not found, using defaults"
            );
            return Ok(Self::default());
        }

        Self::load_from_path(&path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        Self::parse(&contents)
    }

    /// Parse configuration from TOML string
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let cfg: PropsConfig = toml::from_str(contents)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn resolve_config_path() -> PathBuf {
        if let Ok(path) = std::env::var(Self::ENV_CONFIG_PATH) {
            return PathBuf::from(path);
        }

        dirs::home_dir()
            .map(|h| {
                h.join(".config")
                    .join("pixelprops")
                    .join(Self::DEFAULT_CONFIG_FILENAME)
            })
            .unwrap_or_else(|| PathBuf::from(Self::DEFAULT_CONFIG_FILENAME))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.remote.url.trim().is_empty() {
            return Err(ConfigError::Invalid("remote.url must not be empty".to_string()));
        }

        if self.remote.wait_budget().is_zero() {
            tracing::warn!(
                "remote wait budget is zero; the GMS profile will use cached or default values"
            );
        }

        Ok(())
    }
}
