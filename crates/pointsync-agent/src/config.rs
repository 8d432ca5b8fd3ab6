//! Agent configuration.

use anyhow::{Context, Result};
use pointsync_adapter_haystack::HaystackClientConfig;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Agent configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Store connection parameters
    pub store: HaystackClientConfig,

    /// Store account username
    pub username: String,

    /// Store account password
    pub password: String,

    /// Path to the JSON inventory file
    pub inventory_path: PathBuf,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            store: HaystackClientConfig::default(),
            username: String::new(),
            password: String::new(),
            inventory_path: PathBuf::from("./inventory.json"),
        }
    }
}

impl AgentConfig {
    /// Load configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `POINTSYNC_BASE_URL`: Store API base URL
    /// - `POINTSYNC_PROJECT`: Project name
    /// - `POINTSYNC_USERNAME`: Account username
    /// - `POINTSYNC_PASSWORD`: Account password
    /// - `POINTSYNC_INVENTORY`: Path to the JSON inventory file
    /// - `POINTSYNC_TIMEOUT_SECS`: HTTP request timeout in seconds
    ///
    /// Credentials are passed through as-is; an empty credential fails at
    /// the handshake, before any network call.
    ///
    /// # Errors
    ///
    /// Returns error if the base URL or timeout does not parse.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(base_url) = std::env::var("POINTSYNC_BASE_URL") {
            Url::parse(&base_url).context("Invalid POINTSYNC_BASE_URL")?;
            config.store.base_url = base_url.trim_end_matches('/').to_string();
        }

        if let Ok(project) = std::env::var("POINTSYNC_PROJECT") {
            config.store.project = project;
        }

        if let Ok(username) = std::env::var("POINTSYNC_USERNAME") {
            config.username = username;
        }

        if let Ok(password) = std::env::var("POINTSYNC_PASSWORD") {
            config.password = password;
        }

        if let Ok(path) = std::env::var("POINTSYNC_INVENTORY") {
            config.inventory_path = PathBuf::from(path);
        }

        if let Ok(timeout) = std::env::var("POINTSYNC_TIMEOUT_SECS") {
            let seconds: u64 = timeout.parse().context("Invalid POINTSYNC_TIMEOUT_SECS")?;
            config.store.timeout = Duration::from_secs(seconds);
        }

        Ok(config)
    }
}
