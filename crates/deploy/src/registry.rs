//! Known contract deployments, and the address book of a single run.

use std::collections::BTreeMap;
use std::path::Path;

use alloy_core::primitives::{Address, B256};
use anyhow::{Context, Result};
use derive_more::Deref;
use serde::{Deserialize, Serialize};

/// Lookup failure of the [`Registry`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("no known deployment of role '{role}' on network '{network}'")]
    NotFound { network: String, role: String },
}

/// Known deployments, keyed by network identifier then role name.
///
/// Stored as JSON:
///
/// ```json
/// { "rinkeby": { "dao_factory": "0x...", "ens": "0x..." } }
/// ```
///
/// The registry is read-only for the duration of a deployment; addresses
/// created by a run go to that run's [`AddressBook`] instead.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Registry {
    networks: BTreeMap<String, BTreeMap<String, Address>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a known deployment.
    pub fn with_entry(
        mut self,
        network: impl Into<String>,
        role: impl Into<String>,
        address: Address,
    ) -> Self {
        self.networks
            .entry(network.into())
            .or_default()
            .insert(role.into(), address);
        self
    }

    /// Resolve a role to its known address on `network`.
    pub fn resolve(&self, network: &str, role: &str) -> Result<Address, RegistryError> {
        self.networks
            .get(network)
            .and_then(|roles| roles.get(role))
            .copied()
            .ok_or_else(|| RegistryError::NotFound {
                network: network.to_string(),
                role: role.to_string(),
            })
    }

    /// Known roles of a network, sorted by name.
    pub fn roles(&self, network: &str) -> impl Iterator<Item = (&str, Address)> {
        self.networks
            .get(network)
            .into_iter()
            .flat_map(|roles| roles.iter().map(|(role, addr)| (role.as_str(), *addr)))
    }

    /// Load the registry from a JSON file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read registry from {}", path.display()))?;
        let registry: Self =
            serde_json::from_str(&content).context("Failed to parse registry JSON")?;

        tracing::debug!(
            path = %path.display(),
            networks = registry.networks.len(),
            "Registry loaded"
        );
        Ok(registry)
    }

    /// Load the registry, treating a missing file as an empty registry.
    pub fn load_or_empty(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!(
                path = %path.display(),
                "Registry file not found, every role will be created"
            );
            return Ok(Self::default());
        }
        Self::load_from_file(path)
    }
}

/// Where an address of the [`AddressBook`] comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum AddressOrigin {
    /// Resolved from the registry; nothing was deployed.
    Registry,
    /// Deployed by this run.
    Created { tx_hash: B256 },
}

/// An address recorded for a role during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAddress {
    pub address: Address,
    #[serde(flatten)]
    pub origin: AddressOrigin,
}

/// Run-scoped role addresses.
///
/// Filled while a plan executes and handed back with the outcome, including
/// on failure, so partially applied deployments can be inspected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Deref)]
#[serde(transparent)]
pub struct AddressBook(BTreeMap<String, RoleAddress>);

impl AddressBook {
    pub fn record_reused(&mut self, role: &str, address: Address) {
        self.0.insert(
            role.to_string(),
            RoleAddress {
                address,
                origin: AddressOrigin::Registry,
            },
        );
    }

    pub fn record_created(&mut self, role: &str, address: Address, tx_hash: B256) {
        self.0.insert(
            role.to_string(),
            RoleAddress {
                address,
                origin: AddressOrigin::Created { tx_hash },
            },
        );
    }

    pub fn address_of(&self, role: &str) -> Option<Address> {
        self.0.get(role).map(|entry| entry.address)
    }
}
