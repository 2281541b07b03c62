//! Server configuration.
//!
//! Loaded from the YAML file named by `ONVIF_CONFIG`, falling back to
//! built-in defaults. `LISTEN` overrides the listen address either way.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::auth::Credential;
use crate::pool::{DEFAULT_BUFFER_SIZE, DEFAULT_POOL_SIZE};

pub const CONFIG_ENV: &str = "ONVIF_CONFIG";
pub const LISTEN_ENV: &str = "LISTEN";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub buffer_pool: BufferPoolConfig,
    pub ptz: PtzConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub worker_count: usize,
    pub max_connections: usize,
    pub idle_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub max_requests_per_connection: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            worker_count: 4,
            max_connections: 32,
            idle_timeout_ms: 15_000,
            poll_interval_ms: 100,
            max_requests_per_connection: 100,
        }
    }
}

impl ServerConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub enabled: bool,
    pub realm: String,
    pub nonce_validity_secs: u64,
    pub allow_basic: bool,
    pub users: Vec<Credential>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            realm: "ONVIF Server".to_string(),
            nonce_validity_secs: 300,
            allow_basic: false,
            users: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferPoolConfig {
    pub buffers: usize,
    pub buffer_size: usize,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self {
            buffers: DEFAULT_POOL_SIZE,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PtzConfig {
    /// YAML file holding presets; kept in memory only when unset
    pub presets_path: Option<PathBuf>,
}

impl Config {
    /// Reads `ONVIF_CONFIG` (if set), applies `LISTEN`, and validates.
    pub fn load() -> anyhow::Result<Self> {
        let mut cfg = match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };

        if let Ok(listen) = std::env::var(LISTEN_ENV) {
            cfg.server.listen_addr = listen;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn from_yaml_str(text: &str) -> anyhow::Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let s = &self.server;
        if s.listen_addr.trim().is_empty() {
            anyhow::bail!("server.listen_addr must not be empty");
        }
        if s.worker_count == 0 {
            anyhow::bail!("server.worker_count must be at least 1");
        }
        if s.max_connections == 0 {
            anyhow::bail!("server.max_connections must be at least 1");
        }
        if s.idle_timeout_ms == 0 || s.poll_interval_ms == 0 {
            anyhow::bail!("server timeouts must be non-zero");
        }
        if s.max_requests_per_connection == 0 {
            anyhow::bail!("server.max_requests_per_connection must be at least 1");
        }
        if self.auth.enabled && self.auth.realm.is_empty() {
            anyhow::bail!("auth.realm must not be empty");
        }
        if self.auth.nonce_validity_secs == 0 {
            anyhow::bail!("auth.nonce_validity_secs must be non-zero");
        }
        if self.buffer_pool.buffers == 0 || self.buffer_pool.buffer_size == 0 {
            anyhow::bail!("buffer_pool needs non-zero buffers and buffer_size");
        }
        Ok(())
    }
}
