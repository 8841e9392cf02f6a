//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The config file is optional; without one the pool runs on defaults and
//! keeps its snapshot in `credential-pool.json`.

use credential_pool::PoolSettings;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Root configuration
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub pool: PoolSettings,
}

/// Snapshot location
#[derive(Debug, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("credential-pool.json")
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// A missing file yields defaults. `POOL_STORE_PATH` overrides `store.path`.
    pub fn load(path: &Path) -> common::Result<Self> {
        let mut config: Config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str(&contents)?
        } else {
            Config::default()
        };

        if let Ok(store_path) = std::env::var("POOL_STORE_PATH") {
            let store_path = store_path.trim();
            if !store_path.is_empty() {
                config.store.path = PathBuf::from(store_path);
            }
        }

        config
            .pool
            .validate()
            .map_err(|e| common::Error::Config(format!("[pool] {e}")))?;

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&Path>) -> PathBuf {
        if let Some(p) = cli_path {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("poolctl.toml")
    }
}
