//! Compiled contract artifacts.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use alloy_core::primitives::Bytes;
use anyhow::{Context, Result};
use serde_json::Value;

/// Source of contract creation code.
///
/// Reads `<dir>/<Contract>.json` artifacts whose `bytecode` is either a hex
/// string (truffle, hardhat) or an object with an `object` field (foundry).
/// Bytecode registered with [`ArtifactStore::with_bytecode`] takes precedence.
#[derive(Debug, Clone, Default)]
pub struct ArtifactStore {
    dir: Option<PathBuf>,
    inline: BTreeMap<String, Bytes>,
}

impl ArtifactStore {
    pub fn from_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
            inline: BTreeMap::new(),
        }
    }

    pub fn with_bytecode(mut self, contract: impl Into<String>, code: Bytes) -> Self {
        self.inline.insert(contract.into(), code);
        self
    }

    /// Creation code of `contract`.
    pub fn bytecode(&self, contract: &str) -> Result<Bytes> {
        if let Some(code) = self.inline.get(contract) {
            return Ok(code.clone());
        }

        let dir = self
            .dir
            .as_deref()
            .with_context(|| format!("No artifact registered for contract {contract}"))?;
        let code = read_artifact(&dir.join(format!("{contract}.json")))?;

        if code.is_empty() {
            anyhow::bail!("Artifact of {contract} has no bytecode (abstract contract or interface?)");
        }
        Ok(code)
    }
}

fn read_artifact(path: &Path) -> Result<Bytes> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read artifact {}", path.display()))?;
    let artifact: Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse artifact {}", path.display()))?;

    let hex = match &artifact["bytecode"] {
        Value::String(hex) => hex.as_str(),
        Value::Object(obj) => obj
            .get("object")
            .and_then(Value::as_str)
            .with_context(|| format!("No bytecode.object in {}", path.display()))?,
        _ => anyhow::bail!("No bytecode in {}", path.display()),
    };

    Bytes::from_str(hex).with_context(|| format!("Invalid bytecode hex in {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_inline_bytecode() {
        let store = ArtifactStore::default().with_bytecode("Kernel", Bytes::from(vec![0x60, 0x80]));

        assert_eq!(store.bytecode("Kernel").unwrap(), Bytes::from(vec![0x60, 0x80]));
        assert!(store.bytecode("ACL").is_err());
    }

    #[test]
    fn test_artifact_formats() {
        let temp_dir = TempDir::new("daokit-test").expect("Failed to create temp dir");
        std::fs::write(
            temp_dir.path().join("Kernel.json"),
            r#"{ "contractName": "Kernel", "bytecode": "0x6080" }"#,
        )
        .unwrap();
        std::fs::write(
            temp_dir.path().join("ACL.json"),
            r#"{ "bytecode": { "object": "0x6040", "linkReferences": {} } }"#,
        )
        .unwrap();
        std::fs::write(
            temp_dir.path().join("IForwarder.json"),
            r#"{ "bytecode": "0x" }"#,
        )
        .unwrap();

        let store = ArtifactStore::from_dir(temp_dir.path());
        assert_eq!(store.bytecode("Kernel").unwrap(), Bytes::from(vec![0x60, 0x80]));
        assert_eq!(store.bytecode("ACL").unwrap(), Bytes::from(vec![0x60, 0x40]));
        assert!(store.bytecode("IForwarder").is_err());
        assert!(store.bytecode("Missing").is_err());
    }
}
