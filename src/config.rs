//! Layered configuration for the Atrium client.
//!
//! Settings are resolved in three layers, later layers winning:
//! file (`atrium.toml`) → environment (`ATRIUM_*`) → CLI flags.
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! base_url = "https://atrium.example.com"
//!
//! [retry]
//! initial_delay_ms = 1000
//! max_delay_ms = 10000
//! max_attempts = 6
//!
//! [auth]
//! refresh_window_secs = 300
//! watchdog_interval_secs = 60
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File name looked up inside the config directory.
pub const CONFIG_FILE: &str = "atrium.toml";

/// Durable token store file name inside the state directory.
pub const TOKENS_FILE: &str = "tokens.json";

/// Server connection settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base URL of the Atrium API, e.g. `https://atrium.example.com`
    #[serde(default)]
    pub base_url: Option<String>,
}

/// Reconnect supervision settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Delay before the first reconnect attempt
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Ceiling for the doubling backoff schedule
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Consecutive failures tolerated before giving up
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_initial_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_max_attempts() -> u32 {
    6
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

/// Credential lifecycle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Refresh proactively when the access token expires within this window
    #[serde(default = "default_refresh_window_secs")]
    pub refresh_window_secs: u64,
    /// How often the expiry watchdog wakes up
    #[serde(default = "default_watchdog_interval_secs")]
    pub watchdog_interval_secs: u64,
}

fn default_refresh_window_secs() -> u64 {
    300
}

fn default_watchdog_interval_secs() -> u64 {
    60
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            refresh_window_secs: default_refresh_window_secs(),
            watchdog_interval_secs: default_watchdog_interval_secs(),
        }
    }
}

/// Raw file contents of `atrium.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AtriumToml {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

impl AtriumToml {
    /// Load from `dir/atrium.toml`, returning defaults when the file is absent.
    pub fn load_or_default(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
    }
}

/// Resolved runtime configuration.
///
/// Bridges the on-disk `AtriumToml` with environment variables and CLI flags,
/// and owns the directory layout (config dir for `atrium.toml`, state dir for
/// the durable token store and log files).
#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: String,
    pub config_dir: PathBuf,
    pub state_dir: PathBuf,
    pub log_dir: PathBuf,
    pub retry: RetryConfig,
    pub auth: AuthConfig,
    pub verbose: bool,
}

impl Config {
    /// Resolve configuration from all three layers.
    ///
    /// `base_url_flag` is the `--base-url` CLI value, which wins over
    /// `ATRIUM_BASE_URL`, which wins over the `[server]` section of
    /// `atrium.toml`. A missing base URL in every layer is an error — the
    /// client cannot guess where the platform lives.
    pub fn resolve(base_url_flag: Option<String>, verbose: bool) -> Result<Self> {
        let config_dir = Self::config_dir()?;
        let state_dir = Self::state_dir()?;
        let file = AtriumToml::load_or_default(&config_dir)?;

        let base_url = base_url_flag
            .or_else(|| std::env::var("ATRIUM_BASE_URL").ok())
            .or(file.server.base_url)
            .context(
                "No server configured. Pass --base-url, set ATRIUM_BASE_URL, \
                 or add [server] base_url to atrium.toml",
            )?;
        let base_url = base_url.trim_end_matches('/').to_string();

        let log_dir = state_dir.join("logs");

        Ok(Self {
            base_url,
            config_dir,
            state_dir,
            log_dir,
            retry: file.retry,
            auth: file.auth,
            verbose,
        })
    }

    /// Directory holding `atrium.toml`. Override with `ATRIUM_CONFIG_DIR`.
    pub fn config_dir() -> Result<PathBuf> {
        if let Ok(dir) = std::env::var("ATRIUM_CONFIG_DIR") {
            return Ok(PathBuf::from(dir));
        }
        Ok(dirs::config_dir()
            .context("Could not determine the user config directory")?
            .join("atrium"))
    }

    /// Directory holding the durable token store and logs.
    /// Override with `ATRIUM_STATE_DIR`.
    pub fn state_dir() -> Result<PathBuf> {
        if let Ok(dir) = std::env::var("ATRIUM_STATE_DIR") {
            return Ok(PathBuf::from(dir));
        }
        Ok(dirs::data_dir()
            .context("Could not determine the user data directory")?
            .join("atrium"))
    }

    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.config_dir).context("Failed to create config directory")?;
        std::fs::create_dir_all(&self.state_dir).context("Failed to create state directory")?;
        std::fs::create_dir_all(&self.log_dir).context("Failed to create log directory")?;
        Ok(())
    }

    /// Path of the durable token store file.
    pub fn token_store_path(&self) -> PathBuf {
        self.state_dir.join(TOKENS_FILE)
    }

    pub fn refresh_window(&self) -> Duration {
        Duration::from_secs(self.auth.refresh_window_secs)
    }

    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_secs(self.auth.watchdog_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atrium_toml_defaults_when_file_absent() {
        let dir = tempfile::tempdir().unwrap();
        let config = AtriumToml::load_or_default(dir.path()).unwrap();
        assert_eq!(config.retry.initial_delay_ms, 1_000);
        assert_eq!(config.retry.max_delay_ms, 10_000);
        assert_eq!(config.retry.max_attempts, 6);
        assert_eq!(config.auth.refresh_window_secs, 300);
        assert!(config.server.base_url.is_none());
    }

    #[test]
    fn atrium_toml_parses_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "[server]\nbase_url = \"https://atrium.example.com\"\n\n[retry]\nmax_attempts = 3\n",
        )
        .unwrap();
        let config = AtriumToml::load_or_default(dir.path()).unwrap();
        assert_eq!(
            config.server.base_url.as_deref(),
            Some("https://atrium.example.com")
        );
        assert_eq!(config.retry.max_attempts, 3);
        // Unspecified fields fall back to defaults
        assert_eq!(config.retry.initial_delay_ms, 1_000);
    }

    #[test]
    fn atrium_toml_rejects_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "[server\nbase_url = 1").unwrap();
        assert!(AtriumToml::load_or_default(dir.path()).is_err());
    }

}
