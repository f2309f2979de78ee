//! Node configuration: TOML file, environment overrides, CLI overrides
//! (highest precedence last).

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::consensus::NetworkParams;

fn default_network() -> String {
    "mainnet".to_string()
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir().unwrap_or_else(|| PathBuf::from(".")).join("nameland")
}

fn default_event_capacity() -> usize {
    1024
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Where the chain database lives.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// mainnet | testnet | regtest
    #[serde(default = "default_network")]
    pub network: String,

    /// Event bus capacity; lagging observers drop their oldest events.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            network: default_network(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl NodeConfig {
    /// Load the config file when present, then apply `NAMELAND_*` env vars
    /// and explicit CLI overrides.
    pub fn load(
        path: &Path,
        data_dir_override: Option<PathBuf>,
        network_override: Option<String>,
    ) -> Result<Self> {
        let mut cfg = if path.exists() {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))?
        } else {
            Self::default()
        };

        if let Ok(dir) = std::env::var("NAMELAND_DATA_DIR") {
            cfg.data_dir = PathBuf::from(dir);
        }
        if let Ok(network) = std::env::var("NAMELAND_NETWORK") {
            cfg.network = network;
        }
        if let Some(dir) = data_dir_override {
            cfg.data_dir = dir;
        }
        if let Some(network) = network_override {
            cfg.network = network;
        }
        Ok(cfg)
    }

    pub fn params(&self) -> Result<NetworkParams> {
        match self.network.as_str() {
            "mainnet" => Ok(NetworkParams::mainnet()),
            "testnet" => Ok(NetworkParams::testnet()),
            "regtest" => Ok(NetworkParams::regtest()),
            other => Err(anyhow!("unknown network '{other}'")),
        }
    }
}

#[cfg(test)]
mod config_tests {
    use super::*;

    #[test]
    fn parses_toml_and_keeps_defaults() {
        let cfg: NodeConfig = toml::from_str("network = \"regtest\"").unwrap();
        assert_eq!(cfg.network, "regtest");
        assert_eq!(cfg.event_capacity, 1024);
        assert!(cfg.params().is_ok());
    }

    #[test]
    fn unknown_network_is_an_error() {
        let cfg = NodeConfig { network: "lunanet".into(), ..Default::default() };
        assert!(cfg.params().is_err());
    }
}
