//! Application configuration.
//!
//! Settings come from `<config_dir>/railsim/config.toml` with `RAILSIM__*`
//! environment variables layered on top, e.g. `RAILSIM__FLEET_SIZE=20` or
//! `RAILSIM__TUNING__BREAKDOWN_CHANCE=0`.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{network::Network, sim::engine::DEFAULT_FLEET_SIZE, sim::tuning::Tuning};

/// Directory under the platform config dir that holds our files.
pub const CONFIG_DIR_NAME: &str = "railsim";
/// Config file name.
pub const CONFIG_FILE_NAME: &str = "config.toml";
/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "RAILSIM";

const DEFAULT_CONFIG: &str = r#"# railsim configuration

# Trains created when the simulation starts or is reset.
fleet_size = 10

# Dashboard refresh interval in milliseconds.
refresh_interval_ms = 1000

# Fixed seed for reproducible runs. Leave unset for a random run.
# seed = 42

# JSON topology file. Leave unset for the built-in six-station line.
# network_path = "/path/to/network.json"

[tuning]
disruption_chance = 0.15
breakdown_chance = 0.05
priority_delay_chance = 0.2
restriction_toggle_chance = 0.1
initial_restriction_chance = 0.2
"#;

/// Runtime settings for the simulation and dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Trains created on initialization.
    pub fleet_size: usize,
    /// Seed for the random source; `None` uses entropy.
    pub seed: Option<u64>,
    /// How often the dashboard pulls a snapshot.
    pub refresh_interval_ms: u64,
    /// Optional JSON network file.
    pub network_path: Option<PathBuf>,
    /// Probabilities and ranges.
    pub tuning: Tuning,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            fleet_size: DEFAULT_FLEET_SIZE,
            seed: None,
            refresh_interval_ms: 1000,
            network_path: None,
            tuning: Tuning::default(),
        }
    }
}

impl AppConfig {
    /// Load from the default location plus environment overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(&default_path()?)
    }

    /// Load from `path` plus environment overrides. A missing file yields
    /// the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::from(path).required(false))
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: AppConfig = settings
            .try_deserialize()
            .with_context(|| format!("Invalid config {}", path.display()))?;
        Ok(config)
    }

    /// Network to simulate: the configured file, or the built-in line.
    pub fn network(&self) -> Result<Network> {
        match &self.network_path {
            Some(path) => Network::load(path),
            None => Ok(Network::default()),
        }
    }
}

/// `<config_dir>/railsim/config.toml`.
pub fn default_path() -> Result<PathBuf> {
    let base = dirs::config_dir().context("Could not determine the config directory")?;
    Ok(base.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Write the default config file if none exists yet.
pub fn ensure_default_config() -> Result<PathBuf> {
    let path = default_path()?;
    ensure_config_at(&path)?;
    Ok(path)
}

/// Write the default config to `path` unless a file is already there.
/// Returns whether a file was written.
pub fn ensure_config_at(path: &Path) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(path, DEFAULT_CONFIG)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!(path = %path.display(), "Wrote default config");
    Ok(true)
}
