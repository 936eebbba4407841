use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;

use crate::{
    ArtifactStore, CancelSignal, ChainClient, DeployConfig, DeploymentOutcome, DeploymentPlan,
    DeploymentReport, Orchestrator, OrchestratorSettings, Registry, RpcChainClient, TemplateSpec,
    planner,
};

/// Entry point of a deployment: template name and target contract in, one
/// outcome out.
///
/// Holds the chain client and the read-only inputs shared by every run. Runs
/// do not mutate the deployer, so one instance can serve concurrent
/// deployments of different templates.
pub struct TemplateDeployer<C> {
    client: C,
    registry: Registry,
    artifacts: ArtifactStore,
    templates_dir: PathBuf,
    settings: OrchestratorSettings,
    /// Where reports are written. No report when unset.
    outdata: Option<PathBuf>,
}

impl<C: ChainClient> TemplateDeployer<C> {
    pub fn new(
        client: C,
        registry: Registry,
        artifacts: ArtifactStore,
        templates_dir: impl Into<PathBuf>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            client,
            registry,
            artifacts,
            templates_dir: templates_dir.into(),
            settings,
            outdata: None,
        }
    }

    pub fn with_outdata(mut self, outdata: impl Into<PathBuf>) -> Self {
        self.outdata = Some(outdata.into());
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    pub fn load_template(&self, template: &str) -> Result<TemplateSpec> {
        TemplateSpec::load(&self.templates_dir, template)
    }

    /// Load and plan a template without touching the network.
    pub fn plan_template(&self, template: &str, contract: Option<&str>) -> Result<DeploymentPlan> {
        let spec = self.load_template(template)?;
        planner::plan_for_target(&spec, contract)
            .with_context(|| format!("Failed to plan template {template}"))
    }

    /// Deploy `template` and report the address of the role deploying
    /// `contract`.
    ///
    /// Loading and planning problems are returned as errors before any network
    /// call. Once execution starts, the outcome is always returned, including
    /// failures; a report is written next to it when an output directory is
    /// configured.
    pub async fn deploy_template(
        &self,
        template: &str,
        contract: &str,
        cancel: &CancelSignal,
    ) -> Result<DeploymentOutcome> {
        let spec = self.load_template(template)?;
        let plan = planner::plan_for_target(&spec, Some(contract))
            .with_context(|| format!("Failed to plan template {template}"))?;

        tracing::info!(
            template = %template,
            contract = %contract,
            primary = %plan.primary,
            steps = plan.len(),
            external = ?plan.external_roles,
            "Deployment plan ready"
        );

        let started_at = Utc::now();
        let outcome = Orchestrator::new(&self.registry, &self.artifacts, &self.settings)
            .deploy(&plan, &self.client, cancel)
            .await;

        if let Some(outdata) = &self.outdata {
            let saved = DeploymentReport::from_outcome(&spec, &self.settings.network, started_at, &outcome)
                .and_then(|report| report.save_to_dir(outdata));
            if let Err(e) = saved {
                tracing::warn!(error = %e, "Failed to write deployment report");
            }
        }

        Ok(outcome)
    }
}

impl TemplateDeployer<RpcChainClient> {
    /// Connect to the configured node and load the registry and artifacts.
    pub async fn from_config(config: &DeployConfig) -> Result<Self> {
        let registry = Registry::load_or_empty(&config.registry)?;
        let client = RpcChainClient::connect(config)
            .await
            .context("Failed to connect to the chain client")?;

        Ok(Self::new(
            client,
            registry,
            ArtifactStore::from_dir(&config.artifacts),
            &config.templates,
            config.orchestrator_settings(),
        )
        .with_outdata(&config.outdata))
    }
}
