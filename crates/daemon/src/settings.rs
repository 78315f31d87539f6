//! Configuration loading
//!
//! Sources, later ones winning:
//! 1. the YAML/TOML/JSON file named by `RELAY_CONFIG` (default `~/.relay/relay.yaml`, optional)
//! 2. `RELAY__`-prefixed environment variables, `__` separating nested keys
//!    (e.g. `RELAY__JOBS__NUM_POLLERS=4`)

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use relay_api_rpc::RpcServerConfig;
use relay_core::JobsConfig;
use serde::Deserialize;

const CONFIG_PATH_ENV: &str = "RELAY_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "~/.relay/relay.yaml";
const ENV_PREFIX: &str = "RELAY";
const ENV_SEPARATOR: &str = "__";

#[derive(Debug, Default, Deserialize)]
pub struct Settings {
    /// Absent section = jobs service disabled
    #[serde(default)]
    pub jobs: Option<JobsConfig>,
    #[serde(default)]
    pub rpc: RpcServerConfig,
}

pub fn load() -> Result<Settings> {
    let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    load_from(&shellexpand::tilde(&path))
}

pub fn load_from(path: &str) -> Result<Settings> {
    Config::builder()
        .add_source(File::with_name(path).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator(ENV_SEPARATOR)
                .try_parsing(true),
        )
        .build()
        .with_context(|| format!("Failed to load configuration from {}", path))?
        .try_deserialize()
        .context("Invalid configuration")
}
