//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.ochat/config.json`) and environment.
//! Only backend connection settings live here; chats are never persisted.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Backend URL used when neither env nor config provide one.
pub const DEFAULT_BASE_URL: &str = "http://localhost:5000";

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Remote backend settings.
    #[serde(default)]
    pub backend: BackendConfig,
}

/// Where the backend lives and how often to ask it for status.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendConfig {
    /// Base URL of the backend. Overridden by OCHAT_API_URL env.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Seconds between status polls (default 5).
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Per-request timeout for status polls in seconds (default 4).
    #[serde(default = "default_status_timeout_secs")]
    pub status_timeout_secs: u64,
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_status_timeout_secs() -> u64 {
    4
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            poll_interval_secs: default_poll_interval_secs(),
            status_timeout_secs: default_status_timeout_secs(),
        }
    }
}

/// Resolve the backend base URL: env OCHAT_API_URL overrides config, then the loopback default.
pub fn resolve_base_url(config: &Config) -> String {
    base_url_from(std::env::var("OCHAT_API_URL").ok(), config)
}

/// Blank values at either level fall through to the next one. Trailing `/` is stripped.
fn base_url_from(env_url: Option<String>, config: &Config) -> String {
    let non_blank = |s: &str| {
        let t = s.trim();
        (!t.is_empty()).then(|| t.to_string())
    };
    env_url
        .as_deref()
        .and_then(non_blank)
        .or_else(|| config.backend.base_url.as_deref().and_then(non_blank))
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
        .trim_end_matches('/')
        .to_string()
}

/// Interval between status polls; never shorter than one second.
pub fn poll_interval(config: &Config) -> Duration {
    Duration::from_secs(config.backend.poll_interval_secs.max(1))
}

/// Timeout applied to each status request; never shorter than one second.
pub fn status_timeout(config: &Config) -> Duration {
    Duration::from_secs(config.backend.status_timeout_secs.max(1))
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("OCHAT_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".ochat").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

/// Load config from the given path, or the default path (or OCHAT_CONFIG_PATH). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}
