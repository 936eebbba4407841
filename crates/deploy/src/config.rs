//! Deployment configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use alloy_core::primitives::Address;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::OrchestratorSettings;

/// Default name of the configuration file.
pub const CONFIG_FILENAME: &str = "Daokit.toml";

pub const DEFAULT_NETWORK: &str = "devnet";
pub const DEFAULT_RPC_URL: &str = "http://localhost:8545";

/// Where to deploy, from which account, and where the inputs live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    /// Network name, the first key of the registry.
    pub network: String,
    pub rpc_url: Url,
    /// Sender account. Defaults to the node's first unlocked account.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<Address>,
    /// Refuse to deploy when the node reports another chain id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,

    /// JSON file of known deployments.
    pub registry: PathBuf,
    /// Directory of compiled `<Contract>.json` artifacts.
    pub artifacts: PathBuf,
    /// Directory of `<template>.toml` files.
    pub templates: PathBuf,
    /// Where deployment reports are written.
    pub outdata: PathBuf,

    pub call_timeout_secs: u64,
    pub confirmation_timeout_secs: u64,
    pub poll_interval_ms: u64,
    /// How long to wait for the node to answer at startup.
    pub ready_timeout_secs: u64,
    pub verify_reused_code: bool,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            network: DEFAULT_NETWORK.to_string(),
            rpc_url: Url::parse(DEFAULT_RPC_URL).expect("default RPC URL is valid"),
            from: None,
            chain_id: None,
            registry: PathBuf::from("deployments.json"),
            artifacts: PathBuf::from("build/contracts"),
            templates: PathBuf::from("templates"),
            outdata: PathBuf::from("deployments"),
            call_timeout_secs: 30,
            confirmation_timeout_secs: 300,
            poll_interval_ms: 1000,
            ready_timeout_secs: 60,
            verify_reused_code: false,
        }
    }
}

impl DeployConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            network: self.network.clone(),
            call_timeout: self.call_timeout(),
            confirmation_timeout: self.confirmation_timeout(),
            verify_reused_code: self.verify_reused_code,
        }
    }

    /// Save the configuration to a TOML file.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize deploy config to TOML")?;
        std::fs::write(path, content)
            .context(format!("Failed to write config to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    /// Load the configuration from a TOML file, or from `Daokit.toml` inside a
    /// directory.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(anyhow::anyhow!(
                "Configuration file or directory not found: {}",
                path.display()
            ));
        }

        let config_path = if path.is_dir() {
            path.join(CONFIG_FILENAME)
        } else {
            path.to_path_buf()
        };

        let content = std::fs::read_to_string(&config_path)
            .context(format!("Failed to read config from {}", config_path.display()))?;
        let config: Self =
            toml::from_str(&content).context("Failed to parse config file as TOML")?;
        tracing::info!(path = %config_path.display(), "Configuration loaded");
        Ok(config)
    }
}
