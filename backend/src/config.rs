//! Server settings, read from a TOML file with defaults for anything missing.

use pv_core::EditorConfig;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Overrides `addr` when set.
pub const ADDR_ENV: &str = "PV_BACKEND_ADDR";
/// Path of the TOML file, `pv-backend.toml` otherwise.
pub const CONFIG_ENV: &str = "PV_BACKEND_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "pv-backend.toml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    /// Served at `/` when set.
    pub static_dir: Option<String>,
    /// How long to wait for the client to answer one elevation batch.
    pub elevation_timeout_ms: u64,
    /// Minimum gap between consecutive elevation batches.
    pub elevation_batch_delay_ms: u64,
    pub editor: EditorConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            static_dir: None,
            elevation_timeout_ms: 15_000,
            elevation_batch_delay_ms: 100,
            editor: EditorConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Read `path`, falling back to defaults when the file is missing or
    /// invalid.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => match Self::from_toml_str(&text) {
                Ok(config) => {
                    info!("loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    warn!("invalid config {}: {}, using defaults", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => {
                info!("no config at {}, using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Settings for this process: file from `PV_BACKEND_CONFIG`, address
    /// from `PV_BACKEND_ADDR`.
    pub fn from_env() -> Self {
        let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load(Path::new(&path)).with_addr_override(std::env::var(ADDR_ENV).ok().as_deref())
    }

    pub fn with_addr_override(mut self, addr: Option<&str>) -> Self {
        if let Some(raw) = addr {
            match raw.parse() {
                Ok(addr) => self.addr = addr,
                Err(_) => warn!("ignoring {}={:?}, not a socket address", ADDR_ENV, raw),
            }
        }
        self
    }

    pub fn elevation_timeout(&self) -> Duration {
        Duration::from_millis(self.elevation_timeout_ms)
    }

    pub fn elevation_batch_delay(&self) -> Duration {
        Duration::from_millis(self.elevation_batch_delay_ms)
    }
}
