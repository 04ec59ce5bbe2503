//! Configuration loading.
//!
//! Configuration is read from TOML with the following resolution order:
//! 1. explicit path (`--config <path>`)
//! 2. `~/.threatsync/config.toml`
//! 3. built-in defaults
//!
//! `THREATSYNC_API_URL`, when set, overrides `api.base_url`.
//!
//! ```toml
//! [api]
//! base_url = "https://dashboard.example/api"
//! request_timeout_secs = 30
//!
//! [cache]
//! freshness_window_secs = 30
//! gc_grace_secs = 300
//! fetch_timeout_secs = 20
//!
//! [session]
//! credential_path = "/home/analyst/.cache/threatsync/credential"
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::cache::QueryConfig;
use crate::session::default_credential_path;
use crate::transport::{DEFAULT_BASE_URL, TransportConfig};
use crate::{Result, SyncError};

/// Environment variable overriding the API base URL.
pub const API_URL_ENV: &str = "THREATSYNC_API_URL";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// API root (default: http://localhost:8000/api).
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Request timeout in seconds (default: 30).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_request_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Seconds a fetched value stays fresh (default: 30).
    #[serde(default = "default_freshness_window")]
    pub freshness_window_secs: u64,
    /// Seconds an unobserved entry survives (default: 300).
    #[serde(default = "default_gc_grace")]
    pub gc_grace_secs: u64,
    /// Engine-level bound on a single fetch; unset leaves it to the
    /// request timeout.
    #[serde(default)]
    pub fetch_timeout_secs: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            freshness_window_secs: default_freshness_window(),
            gc_grace_secs: default_gc_grace(),
            fetch_timeout_secs: None,
        }
    }
}

fn default_freshness_window() -> u64 {
    30
}

fn default_gc_grace() -> u64 {
    300
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionConfig {
    /// Where the credential is persisted (default: user cache dir).
    #[serde(default)]
    pub credential_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the standard locations, falling back to
    /// defaults when no file exists.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let mut config = match Self::resolve_config_path(explicit_path)? {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        if let Ok(url) = std::env::var(API_URL_ENV)
            && !url.trim().is_empty()
        {
            config.api.base_url = url;
        }
        config.validate()?;
        Ok(config)
    }

    /// Parse a single TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            SyncError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        Self::parse(&content).map_err(|e| match e {
            SyncError::Configuration(msg) => {
                SyncError::Configuration(format!("Failed to parse config file {path:?}: {msg}"))
            }
            other => other,
        })
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| SyncError::Configuration(e.to_string()))
    }

    fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            return Err(SyncError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".threatsync").join("config.toml");
            if user_config.exists() {
                return Ok(Some(user_config));
            }
        }

        Ok(None)
    }

    fn validate(&self) -> Result<()> {
        let url = self.api.base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(SyncError::Configuration(format!(
                "api.base_url must be an http(s) URL, got {url:?}"
            )));
        }
        if self.api.request_timeout_secs == 0 {
            return Err(SyncError::Configuration(
                "api.request_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig::new(self.api.base_url.clone())
            .request_timeout(Duration::from_secs(self.api.request_timeout_secs))
    }

    pub fn query_config(&self) -> QueryConfig {
        let config = QueryConfig::new()
            .freshness_window(Duration::from_secs(self.cache.freshness_window_secs))
            .gc_grace(Duration::from_secs(self.cache.gc_grace_secs));
        match self.cache.fetch_timeout_secs {
            Some(secs) => config.fetch_timeout(Duration::from_secs(secs)),
            None => config,
        }
    }

    pub fn credential_path(&self) -> PathBuf {
        self.session
            .credential_path
            .clone()
            .unwrap_or_else(default_credential_path)
    }
}
