use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::namespace::{DEFAULT_ROOT_PATH, NamespaceScheme};
use crate::sharding::ShardKeyStrategy;

const ENV_PREFIX: &str = "COORD_";

/// Settings shared by every process that talks to the coordination store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinationConfig {
    /// Run the store inside this process instead of connecting to one.
    /// The `monitor` command ignores it.
    pub embedded: bool,
    /// Base URL of a served store, e.g. `http://127.0.0.1:2181`.
    pub store_url: String,
    /// Address the `serve` command binds to.
    pub bind_addr: String,
    pub session_timeout_ms: u64,
    pub connection_timeout_ms: u64,
    /// Longest time a heartbeat poll is held open by the server.
    pub poll_wait_ms: u64,
    pub root_path: String,
    pub path_separator: char,
    pub shard_count: u32,
    pub shard_key_strategy: ShardKeyStrategy,
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            embedded: true,
            store_url: "http://127.0.0.1:2181".to_string(),
            bind_addr: "127.0.0.1:2181".to_string(),
            session_timeout_ms: 6_000,
            connection_timeout_ms: 3_000,
            poll_wait_ms: 1_000,
            root_path: DEFAULT_ROOT_PATH.to_string(),
            path_separator: '/',
            shard_count: 10,
            shard_key_strategy: ShardKeyStrategy::default(),
        }
    }
}

impl CoordinationConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw).context("Invalid coordination config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = Self::from_toml_str(&raw)?;
        tracing::info!("Loaded coordination config from {}", path.display());
        Ok(config)
    }

    /// Defaults overridden by `COORD_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides looked up by variable name (`COORD_STORE_URL`, ...).
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        if let Some(v) = get("EMBEDDED") {
            self.embedded = parse_var("EMBEDDED", &v)?;
        }
        if let Some(v) = get("STORE_URL") {
            self.store_url = v;
        }
        if let Some(v) = get("BIND_ADDR") {
            self.bind_addr = v;
        }
        if let Some(v) = get("SESSION_TIMEOUT_MS") {
            self.session_timeout_ms = parse_var("SESSION_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = get("CONNECTION_TIMEOUT_MS") {
            self.connection_timeout_ms = parse_var("CONNECTION_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = get("POLL_WAIT_MS") {
            self.poll_wait_ms = parse_var("POLL_WAIT_MS", &v)?;
        }
        if let Some(v) = get("ROOT_PATH") {
            self.root_path = v;
        }
        if let Some(v) = get("PATH_SEPARATOR") {
            self.path_separator = parse_var("PATH_SEPARATOR", &v)?;
        }
        if let Some(v) = get("SHARD_COUNT") {
            self.shard_count = parse_var("SHARD_COUNT", &v)?;
        }
        if let Some(v) = get("SHARD_KEY_STRATEGY") {
            self.shard_key_strategy = parse_var("SHARD_KEY_STRATEGY", &v)?;
        }

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.session_timeout_ms == 0 {
            anyhow::bail!("session_timeout_ms must be positive");
        }
        if self.shard_count == 0 {
            anyhow::bail!("shard_count must be positive");
        }
        // The store only addresses `/`-separated paths.
        if self.path_separator != '/' {
            anyhow::bail!(
                "path_separator must be '/', got '{}'",
                self.path_separator
            );
        }
        if self.poll_wait_ms >= self.session_timeout_ms {
            anyhow::bail!(
                "poll_wait_ms ({}) must be shorter than session_timeout_ms ({})",
                self.poll_wait_ms,
                self.session_timeout_ms
            );
        }
        Ok(())
    }

    pub fn namespace(&self) -> NamespaceScheme {
        NamespaceScheme::new(&self.root_path, self.path_separator)
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout_ms)
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    pub fn poll_wait(&self) -> Duration {
        Duration::from_millis(self.poll_wait_ms)
    }
}

fn parse_var<T>(name: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid value for {}{}: {}", ENV_PREFIX, name, e))
}
