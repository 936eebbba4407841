use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
    AddressBook, DeploymentOutcome, DeploymentResult, PermissionEdge, StepRecord, TemplateSpec,
};

/// SHA-256 of a template's canonical JSON form.
///
/// Identifies exactly which template produced a deployment. Two templates that
/// only differ in TOML formatting or comments share a fingerprint.
pub struct TemplateFingerprint;

impl TemplateFingerprint {
    pub fn compute(spec: &TemplateSpec) -> Result<String> {
        let json = serde_json::to_string(spec).context("Failed to serialize template")?;

        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        Ok(hex::encode(hasher.finalize()))
    }
}

/// Record of one deployment run, saved to
/// `{outdata}/{template}.deployment.json` whether it succeeded or not.
///
/// Written for operators inspecting partial deployments. Never read back to
/// resume a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentReport {
    pub template: String,
    pub template_fingerprint: String,
    pub primary: String,
    pub network: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub result: DeploymentResult,
    pub steps: Vec<StepRecord>,
    pub addresses: AddressBook,
    pub applied_edges: Vec<PermissionEdge>,
    /// Daokit version that ran the deployment
    pub daokit_version: String,
}

impl DeploymentReport {
    pub fn from_outcome(
        spec: &TemplateSpec,
        network: &str,
        started_at: DateTime<Utc>,
        outcome: &DeploymentOutcome,
    ) -> Result<Self> {
        Ok(Self {
            template: outcome.template.clone(),
            template_fingerprint: TemplateFingerprint::compute(spec)?,
            primary: outcome.primary.clone(),
            network: network.to_string(),
            started_at,
            finished_at: Utc::now(),
            result: outcome.result.clone(),
            steps: outcome.steps.clone(),
            addresses: outcome.addresses.clone(),
            applied_edges: outcome.applied_edges.clone(),
            daokit_version: env!("CARGO_PKG_VERSION").to_string(),
        })
    }

    pub fn file_name(template: &str) -> String {
        format!("{template}.deployment.json")
    }

    /// Write the report into `dir`, creating it if needed.
    pub fn save_to_dir(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)
            .context(format!("Failed to create output directory {}", dir.display()))?;
        let path = dir.join(Self::file_name(&self.template));
        self.save_to_file(&path)?;
        Ok(path)
    }

    /// Save the report as formatted JSON.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json =
            serde_json::to_string_pretty(self).context("Failed to serialize deployment report")?;

        std::fs::write(path, json).context(format!(
            "Failed to write deployment report to {}",
            path.display()
        ))?;

        tracing::info!(path = %path.display(), "Deployment report saved");
        Ok(())
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("Deployment report does not exist: {}", path.display());
        }

        let content = std::fs::read_to_string(path).context(format!(
            "Failed to read deployment report from {}",
            path.display()
        ))?;

        serde_json::from_str(&content).context("Failed to parse deployment report JSON")
    }
}
