//! Network configuration.
//!
//! One JSON file describes every network the orchestrator can target:
//!
//! ```json
//! {
//!   "networks": {
//!     "localhost": {
//!       "environment": "local-test",
//!       "rpc_url": "http://127.0.0.1:8545",
//!       "deployer": "0x...",
//!       "addresses": { "AddressesProvider": "0x..." },
//!       "wiring": [{ "token": "APE", "spenders": ["SwapRouter", "CompoundingVault"] }],
//!       "artifacts": "artifacts",
//!       "registry": "deployed-contracts.redb"
//!     }
//!   }
//! }
//! ```
//!
//! Relative `artifacts` and `registry` paths resolve against the directory of
//! the configuration file.

use cutwright_core::{Address, DeployContext, Environment, Features, TxOverrides, WiringRule};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("network `{name}` not found in config (available: {available})")]
    UnknownNetwork { name: String, available: String },

    #[error("network `{network}`: {reason}")]
    Invalid { network: String, reason: String },
}

/// Receipt polling bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Confirmations {
    pub poll_interval_ms: u64,
    pub max_polls: u32,
}

impl Default for Confirmations {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            max_polls: 120,
        }
    }
}

/// Settings for one network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub environment: Environment,

    /// JSON-RPC endpoint. Not needed for dry runs.
    #[serde(default)]
    pub rpc_url: Option<String>,

    /// Account the node signs transactions with.
    #[serde(default)]
    pub deployer: Option<Address>,

    #[serde(default)]
    pub addresses: BTreeMap<String, Address>,

    #[serde(default)]
    pub mockable: BTreeSet<String>,

    #[serde(default)]
    pub features: Features,

    #[serde(default)]
    pub wiring: Vec<WiringRule>,

    #[serde(default)]
    pub overrides: TxOverrides,

    #[serde(default)]
    pub confirmations: Confirmations,

    /// Build artifact directory.
    pub artifacts: PathBuf,

    /// Registry database file.
    pub registry: PathBuf,

    /// Artifact name overrides, keyed by default artifact name.
    #[serde(default)]
    pub artifact_names: BTreeMap<String, String>,
}

impl NetworkConfig {
    /// The immutable run context this network describes.
    #[must_use]
    pub fn context(&self, resume: bool) -> DeployContext {
        DeployContext {
            environment: self.environment,
            addresses: self.addresses.clone(),
            mockable: self.mockable.clone(),
            features: self.features.clone(),
            wiring: self.wiring.clone(),
            overrides: self.overrides.clone(),
            resume,
        }
    }

    fn validate(&self, network: &str) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::Invalid {
            network: network.to_string(),
            reason,
        };
        if self.confirmations.max_polls == 0 {
            return Err(invalid("confirmations.max_polls must be at least 1".into()));
        }
        for rule in &self.wiring {
            if rule.spenders.is_empty() {
                return Err(invalid(format!("wiring for `{}` lists no spenders", rule.token)));
            }
        }
        Ok(())
    }

    fn anchor(&mut self, base: &Path) {
        if self.artifacts.is_relative() {
            self.artifacts = base.join(&self.artifacts);
        }
        if self.registry.is_relative() {
            self.registry = base.join(&self.registry);
        }
    }
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    networks: BTreeMap<String, NetworkConfig>,
}

/// Load the settings of `network` from the config file at `path`.
pub fn load(path: &Path, network: &str) -> Result<NetworkConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut file: ConfigFile = serde_json::from_str(&raw).map_err(|source| ConfigError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    let available = file.networks.keys().cloned().collect::<Vec<_>>().join(", ");
    let mut config = file
        .networks
        .remove(network)
        .ok_or_else(|| ConfigError::UnknownNetwork {
            name: network.to_string(),
            available,
        })?;

    config.validate(network)?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    config.anchor(base);
    Ok(config)
}
