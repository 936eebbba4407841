//! daokit-deploy - Deployment library for governance templates.
//!
//! This crate plans and executes the deployment of a network of interdependent
//! contracts described by a template: contracts are created in dependency
//! order, permissions are wired once both ends exist, and every run ends in a
//! single [`DeploymentResult`].

pub mod abi;

mod artifacts;
pub use artifacts::ArtifactStore;

mod cancel;
pub use cancel::{CancelHandle, CancelSignal, cancel_pair};

pub mod chain;
pub use chain::{
    ChainClient, ChainError, Confirmation, Receipt, RpcChainClient, StateQuery, TxHandle,
    TxPayload,
};

mod config;
pub use config::{CONFIG_FILENAME, DEFAULT_NETWORK, DEFAULT_RPC_URL, DeployConfig};

mod deployer;
pub use deployer::TemplateDeployer;

mod orchestrator;
pub use orchestrator::{
    DEFAULT_CALL_TIMEOUT, DEFAULT_CONFIRMATION_TIMEOUT, DeploymentFailure, DeploymentOutcome,
    DeploymentResult, FailureReason, Orchestrator, OrchestratorSettings, StepRecord, StepStatus,
};

pub mod planner;
pub use planner::{DeploymentPlan, PlanError, Step, plan, plan_for_target};

mod registry;
pub use registry::{AddressBook, AddressOrigin, Registry, RegistryError, RoleAddress};

mod report;
pub use report::{DeploymentReport, TemplateFingerprint};

pub mod rpc;

mod template;
pub use template::{
    ConstructorParam, DEFAULT_PERMISSION_FN, PermissionEdge, PermissionRef, RoleNode,
    TemplateSpec,
};
