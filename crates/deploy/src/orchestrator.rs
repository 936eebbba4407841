//! Plan execution.
//!
//! The orchestrator runs the steps of a [`DeploymentPlan`] strictly in order,
//! one transaction at a time, and stops at the first failure. Nothing is rolled
//! back: on-chain effects of confirmed steps stay in place and are reported in
//! the [`DeploymentOutcome`] for an operator to inspect.

use std::time::Duration;

use alloy_core::primitives::{Address, B256, Bytes};
use serde::{Deserialize, Serialize};

use crate::{
    abi,
    artifacts::ArtifactStore,
    cancel::CancelSignal,
    chain::{ChainClient, ChainError, Confirmation, Receipt, StateQuery, TxPayload},
    planner::{DeploymentPlan, Step},
    registry::{AddressBook, Registry},
    template::{ConstructorParam, PermissionEdge},
};

/// Default bound on a single submit or read call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);
/// Default bound on waiting for a transaction to be included.
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(300);

/// Execution settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorSettings {
    /// Network identifier used for registry lookups.
    pub network: String,
    pub call_timeout: Duration,
    pub confirmation_timeout: Duration,
    /// Check that a registry-resolved role has code before reusing it.
    pub verify_reused_code: bool,
}

impl OrchestratorSettings {
    pub fn new(network: impl Into<String>) -> Self {
        Self {
            network: network.into(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
            verify_reused_code: false,
        }
    }
}

/// Why a step failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    /// The client refused the transaction before inclusion.
    #[error("submission rejected: {0}")]
    Submission(String),
    #[error("transaction reverted: {}", .0.as_deref().unwrap_or("no reason given"))]
    Reverted(Option<String>),
    /// Confirmation was not observed in time. The transaction may still land.
    #[error("timed out waiting for confirmation")]
    TimedOut,
    #[error("role '{role}' has no known deployment")]
    NotFound { role: String },
    #[error("cancelled")]
    Cancelled,
    /// The client failed at the transport level; the chain state is unknown.
    #[error("chain client error: {0}")]
    Transport(String),
    #[error("creation receipt carries no contract address")]
    MissingContractAddress,
    #[error("cannot build transaction: {0}")]
    Encoding(String),
}

/// Terminal value of a deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeploymentResult {
    Success { primary_address: Address },
    Failure { step_index: usize, reason: FailureReason },
}

/// Lifecycle of a step.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Submitted,
    Confirmed,
    Failed,
}

/// Execution record of one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: Step,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<B256>,
    /// Create step satisfied by a registry entry.
    #[serde(default)]
    pub reused: bool,
}

/// A failed deployment, as an error value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("step {step_index} ({step}) failed: {reason}")]
pub struct DeploymentFailure {
    pub step_index: usize,
    pub step: String,
    pub reason: FailureReason,
}

/// Everything a run produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentOutcome {
    pub template: String,
    pub primary: String,
    pub result: DeploymentResult,
    /// Addresses recorded before the run ended, including on failure.
    pub addresses: AddressBook,
    pub steps: Vec<StepRecord>,
    pub applied_edges: Vec<PermissionEdge>,
}

impl DeploymentOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.result, DeploymentResult::Success { .. })
    }

    pub fn primary_address(&self) -> Option<Address> {
        match self.result {
            DeploymentResult::Success { primary_address } => Some(primary_address),
            DeploymentResult::Failure { .. } => None,
        }
    }

    /// Address on success, the failed step otherwise.
    pub fn into_result(self) -> Result<Address, DeploymentFailure> {
        match self.result {
            DeploymentResult::Success { primary_address } => Ok(primary_address),
            DeploymentResult::Failure { step_index, reason } => Err(DeploymentFailure {
                step_index,
                step: self
                    .steps
                    .get(step_index)
                    .map(|record| record.step.to_string())
                    .unwrap_or_default(),
                reason,
            }),
        }
    }
}

/// Executes deployment plans.
///
/// Stateless apart from borrowed, read-only inputs: one orchestrator can drive
/// any number of concurrent runs.
#[derive(Debug, Clone, Copy)]
pub struct Orchestrator<'a> {
    registry: &'a Registry,
    artifacts: &'a ArtifactStore,
    settings: &'a OrchestratorSettings,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        registry: &'a Registry,
        artifacts: &'a ArtifactStore,
        settings: &'a OrchestratorSettings,
    ) -> Self {
        Self {
            registry,
            artifacts,
            settings,
        }
    }

    /// Execute `plan` against `client`.
    ///
    /// Always returns exactly one outcome; errors are carried in
    /// [`DeploymentOutcome::result`].
    pub async fn deploy<C: ChainClient>(
        &self,
        plan: &DeploymentPlan,
        client: &C,
        cancel: &CancelSignal,
    ) -> DeploymentOutcome {
        let mut run = Run {
            orchestrator: *self,
            plan,
            client,
            cancel,
            records: plan
                .steps
                .iter()
                .map(|step| StepRecord {
                    step: step.clone(),
                    status: StepStatus::Pending,
                    tx_hash: None,
                    reused: false,
                })
                .collect(),
            addresses: AddressBook::default(),
            applied_edges: Vec::new(),
        };

        tracing::info!(
            template = %plan.template,
            network = %self.settings.network,
            steps = plan.len(),
            "Starting deployment"
        );

        let result = match run.execute().await {
            Ok(primary_address) => {
                tracing::info!(
                    template = %plan.template,
                    primary = %plan.primary,
                    address = %primary_address,
                    "Deployment complete"
                );
                DeploymentResult::Success { primary_address }
            }
            Err((step_index, reason)) => {
                if let Some(record) = run.records.get_mut(step_index) {
                    record.status = StepStatus::Failed;
                }
                tracing::error!(
                    template = %plan.template,
                    step = step_index,
                    reason = %reason,
                    "Deployment failed, confirmed steps are left in place"
                );
                DeploymentResult::Failure { step_index, reason }
            }
        };

        DeploymentOutcome {
            template: plan.template.clone(),
            primary: plan.primary.clone(),
            result,
            addresses: run.addresses,
            steps: run.records,
            applied_edges: run.applied_edges,
        }
    }
}

/// State of one execution.
struct Run<'r, C> {
    orchestrator: Orchestrator<'r>,
    plan: &'r DeploymentPlan,
    client: &'r C,
    cancel: &'r CancelSignal,
    records: Vec<StepRecord>,
    addresses: AddressBook,
    applied_edges: Vec<PermissionEdge>,
}

impl<C: ChainClient> Run<'_, C> {
    fn settings(&self) -> &OrchestratorSettings {
        self.orchestrator.settings
    }

    async fn execute(&mut self) -> Result<Address, (usize, FailureReason)> {
        self.resolve_external_roles()?;

        let plan = self.plan;
        for (index, step) in plan.steps.iter().enumerate() {
            let outcome = match step {
                Step::Create {
                    role,
                    contract,
                    params,
                } => self.create(index, role, contract, params).await,
                Step::Wire(edge) => self.wire(index, edge).await,
            };
            outcome.map_err(|reason| (index, reason))?;
        }

        let primary = &self.plan.primary;
        self.addresses.address_of(primary).ok_or_else(|| {
            (
                self.plan.steps.len().saturating_sub(1),
                FailureReason::NotFound {
                    role: primary.clone(),
                },
            )
        })
    }

    /// Resolve roles the template references without declaring them. Runs
    /// before any network call.
    fn resolve_external_roles(&mut self) -> Result<(), (usize, FailureReason)> {
        let network = &self.orchestrator.settings.network;
        for role in &self.plan.external_roles {
            match self.orchestrator.registry.resolve(network, role) {
                Ok(address) => {
                    tracing::debug!(role = %role, address = %address, "External role resolved");
                    self.addresses.record_reused(role, address);
                }
                Err(err) => {
                    tracing::error!(error = %err, "External role cannot be resolved");
                    let index = self.plan.first_step_referencing(role).unwrap_or(0);
                    return Err((index, FailureReason::NotFound { role: role.clone() }));
                }
            }
        }
        Ok(())
    }

    async fn create(
        &mut self,
        index: usize,
        role: &str,
        contract: &str,
        params: &[ConstructorParam],
    ) -> Result<(), FailureReason> {
        if let Ok(address) = self
            .orchestrator
            .registry
            .resolve(&self.settings().network, role)
        {
            if self.settings().verify_reused_code {
                let code = self.read(address, StateQuery::Code).await?;
                if code.is_empty() {
                    tracing::error!(role = %role, address = %address, "Registry entry has no code");
                    return Err(FailureReason::NotFound {
                        role: role.to_string(),
                    });
                }
            }

            tracing::info!(
                step = index,
                role = %role,
                address = %address,
                "Role already deployed, reusing registry entry"
            );
            self.addresses.record_reused(role, address);
            let record = &mut self.records[index];
            record.status = StepStatus::Confirmed;
            record.reused = true;
            return Ok(());
        }

        let code = self
            .orchestrator
            .artifacts
            .bytecode(contract)
            .map_err(|e| FailureReason::Encoding(format!("{e:#}")))?;
        let args = params
            .iter()
            .map(|param| self.encode_param(param))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::info!(step = index, role = %role, contract = %contract, "Deploying contract");
        let receipt = self
            .submit_and_confirm(
                index,
                TxPayload::Deploy {
                    contract: contract.to_string(),
                    code: abi::encode_constructor(&code, &args),
                },
            )
            .await?;

        let address = receipt
            .contract_address
            .ok_or(FailureReason::MissingContractAddress)?;
        self.addresses.record_created(role, address, receipt.tx_hash);

        tracing::info!(
            step = index,
            role = %role,
            address = %address,
            block = receipt.block_number,
            "Contract deployed"
        );
        Ok(())
    }

    async fn wire(&mut self, index: usize, edge: &PermissionEdge) -> Result<(), FailureReason> {
        let grantor = self.address_of(&edge.grantor)?;
        let grantee = self.address_of(&edge.grantee)?;
        let data = abi::encode_call(
            &self.plan.permission_fn,
            &[abi::address_word(grantee), abi::permission_id(&edge.permission)],
        );

        tracing::info!(step = index, edge = %edge, "Granting permission");
        let receipt = self
            .submit_and_confirm(index, TxPayload::Call { to: grantor, data })
            .await?;

        self.applied_edges.push(edge.clone());
        tracing::info!(step = index, edge = %edge, block = receipt.block_number, "Permission granted");
        Ok(())
    }

    fn address_of(&self, role: &str) -> Result<Address, FailureReason> {
        self.addresses
            .address_of(role)
            .ok_or_else(|| FailureReason::Encoding(format!("role '{role}' has no address yet")))
    }

    fn encode_param(&self, param: &ConstructorParam) -> Result<B256, FailureReason> {
        Ok(match param {
            ConstructorParam::Role(role) => abi::address_word(self.address_of(role)?),
            ConstructorParam::Address(address) => abi::address_word(*address),
            ConstructorParam::Uint(value) => abi::uint_word(value).map_err(FailureReason::Encoding)?,
            ConstructorParam::Bool(value) => abi::bool_word(*value),
            ConstructorParam::Bytes32(value) => *value,
            ConstructorParam::Permission(name) => abi::permission_id(name),
        })
    }

    async fn read(&self, address: Address, query: StateQuery) -> Result<Bytes, FailureReason> {
        match tokio::time::timeout(
            self.settings().call_timeout,
            self.client.read_state(address, query),
        )
        .await
        {
            Err(_) => Err(FailureReason::TimedOut),
            Ok(result) => result.map_err(|e| FailureReason::Transport(e.to_string())),
        }
    }

    /// Submit one transaction and wait for it. Cancellation is honoured before
    /// submission and while waiting; a submitted transaction is never withdrawn.
    async fn submit_and_confirm(
        &mut self,
        index: usize,
        payload: TxPayload,
    ) -> Result<Receipt, FailureReason> {
        if self.cancel.is_cancelled() {
            tracing::warn!(step = index, "Cancelled before submission");
            return Err(FailureReason::Cancelled);
        }

        let settings = self.settings().clone();
        let handle = match tokio::time::timeout(settings.call_timeout, self.client.submit(payload)).await {
            Err(_) => return Err(FailureReason::TimedOut),
            Ok(Err(ChainError::Rejected(reason))) => return Err(FailureReason::Submission(reason)),
            Ok(Err(ChainError::Transport(reason))) => return Err(FailureReason::Transport(reason)),
            Ok(Ok(handle)) => handle,
        };

        let record = &mut self.records[index];
        record.status = StepStatus::Submitted;
        record.tx_hash = Some(handle.hash);
        tracing::debug!(step = index, tx = %handle.hash, "Awaiting confirmation");

        // The client is asked to give up at the confirmation bound; the outer
        // timeout only catches clients that overrun it.
        let bound = settings.confirmation_timeout + settings.call_timeout;
        let confirmation = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                tracing::warn!(
                    step = index,
                    tx = %handle.hash,
                    "Cancelled while awaiting confirmation, the transaction may still be included"
                );
                return Err(FailureReason::Cancelled);
            }
            confirmation = tokio::time::timeout(
                bound,
                self.client.await_confirmation(&handle, settings.confirmation_timeout),
            ) => confirmation,
        };

        let receipt = match confirmation {
            Err(_) | Ok(Ok(Confirmation::TimedOut)) => return Err(FailureReason::TimedOut),
            Ok(Err(err)) => return Err(FailureReason::Transport(err.to_string())),
            Ok(Ok(Confirmation::Reverted(reason))) => return Err(FailureReason::Reverted(reason)),
            Ok(Ok(Confirmation::Confirmed(receipt))) => receipt,
        };

        self.records[index].status = StepStatus::Confirmed;
        Ok(receipt)
    }
}
