use crate::providers::registry::DEFAULT_CATALOG_URL;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub provider_catalog_url: String,
    pub user_agent: String,
    /// Per-request timeout in seconds.
    pub timeout: u64,
    /// Sent to providers that want to know who is calling (WordPress.com).
    pub client_name: String,
    /// Cache snapshot file. Persistence is off when unset.
    pub cache_path: Option<PathBuf>,
    pub write_retries: usize,
    /// Delay between write retries, in milliseconds.
    pub write_retry_delay: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider_catalog_url: DEFAULT_CATALOG_URL.to_string(),
            user_agent: format!("embedcard/{}", env!("CARGO_PKG_VERSION")),
            timeout: 15,
            client_name: "embedcard".to_string(),
            cache_path: None,
            write_retries: 3,
            write_retry_delay: 3000,
        }
    }
}

impl Config {
    /// Reads a TOML config file. A missing file (or no path) gives the defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("Invalid config {}", path.display()))
    }
}
