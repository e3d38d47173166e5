//! Configuration management for the client.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Default backend origin.
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Where the session is sent after an unrecoverable authentication failure.
pub const DEFAULT_LOGIN_PATH: &str = "/login";

/// Delay between quote status polls.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;

/// Proactive renewal period. Must stay below the access credential lifetime.
pub const DEFAULT_PROACTIVE_REFRESH_SECS: u64 = 50 * 60;

/// Per-request transport timeout.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Nominal access credential lifetime issued by the backend.
const ACCESS_CREDENTIAL_LIFETIME_SECS: u64 = 60 * 60;

/// Main client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Backend origin, e.g. `https://api.example.com`.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Login surface path used when the session can no longer be renewed.
    #[serde(default = "default_login_path")]
    pub login_path: String,
    /// Quote status poll interval in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Proactive access credential renewal period in seconds.
    #[serde(default = "default_proactive_refresh_secs")]
    pub proactive_refresh_secs: u64,
    /// Transport timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_login_path() -> String {
    DEFAULT_LOGIN_PATH.to_string()
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_proactive_refresh_secs() -> u64 {
    DEFAULT_PROACTIVE_REFRESH_SECS
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            api_base_url: default_api_base_url(),
            login_path: default_login_path(),
            poll_interval_ms: default_poll_interval_ms(),
            proactive_refresh_secs: default_proactive_refresh_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Config {
    /// Create a new Config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from the config file, falling back to defaults,
    /// then apply environment overrides and validate.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// Override configuration from environment variables.
    fn load_from_env(&mut self) {
        if let Some(log_level) = non_empty_env("GLASSQUOTE_LOG_LEVEL") {
            self.log_level = log_level;
        }
        if let Some(api_url) = non_empty_env("GLASSQUOTE_API_URL") {
            self.api_base_url = api_url;
        }
    }

    /// Reject values the session and polling layers cannot work with.
    pub fn validate(&self) -> CoreResult<()> {
        self.api_base_url()?;

        if !self.login_path.starts_with('/') {
            return Err(CoreError::Config(format!(
                "login_path must be absolute, got {:?}",
                self.login_path
            )));
        }
        if self.poll_interval_ms == 0 {
            return Err(CoreError::Config(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.proactive_refresh_secs == 0
            || self.proactive_refresh_secs >= ACCESS_CREDENTIAL_LIFETIME_SECS
        {
            return Err(CoreError::Config(format!(
                "proactive_refresh_secs must be between 1 and {}",
                ACCESS_CREDENTIAL_LIFETIME_SECS - 1
            )));
        }
        Ok(())
    }

    /// Get the backend origin as a parsed URL.
    pub fn api_base_url(&self) -> CoreResult<Url> {
        Url::parse(&self.api_base_url).map_err(CoreError::from)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn proactive_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.proactive_refresh_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.login_path, "/login");
        assert_eq!(config.poll_interval(), Duration::from_secs(2));
        assert_eq!(config.proactive_refresh_interval(), Duration::from_secs(3000));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_load_from_file_fills_missing_fields() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.json");

        std::fs::write(
            &config_path,
            r#"{ "log_level": "debug", "poll_interval_ms": 500 }"#,
        )
        .unwrap();

        let config = Config::load_from_file(&config_path).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.poll_interval_ms, 500);
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
    }

    #[test]
    fn test_config_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let mut config = Config::default();
        config.api_base_url = "https://quotes.example.com".to_string();
        config.save(&paths).unwrap();

        let loaded = Config::load_from_file(&paths.config_file()).unwrap();
        assert_eq!(loaded.api_base_url, "https://quotes.example.com");
    }

    #[test]
    fn test_config_load_nonexistent_uses_defaults() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let config = Config::load(&paths).unwrap();
        assert_eq!(config.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
    }

    #[test]
    fn test_config_invalid_url() {
        let config = Config {
            api_base_url: "not a valid url".to_string(),
            ..Config::default()
        };

        assert!(matches!(
            config.validate(),
            Err(CoreError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_config_rejects_refresh_interval_past_credential_lifetime() {
        let config = Config {
            proactive_refresh_secs: 3600,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(CoreError::Config(_))));
    }

    #[test]
    fn test_config_rejects_zero_poll_interval() {
        let config = Config {
            poll_interval_ms: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(CoreError::Config(_))));
    }

    #[test]
    fn test_config_rejects_relative_login_path() {
        let config = Config {
            login_path: "login".to_string(),
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(CoreError::Config(_))));
    }
}
