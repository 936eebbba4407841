//! Shared fixtures: a scripted in-memory chain and small templates.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use alloy_core::primitives::{Address, B256, Bytes};
use daokit_deploy::{
    ArtifactStore, ChainClient, ChainError, Confirmation, ConstructorParam, OrchestratorSettings,
    Receipt, RoleNode, StateQuery, TemplateSpec, TxHandle, TxPayload,
};

pub const NETWORK: &str = "devnet";

/// What happens to the n-th submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scripted {
    Confirm,
    Revert(Option<String>),
    /// The client reports that no receipt showed up in time.
    TimeOut,
    /// The client refuses the transaction outright.
    Reject(String),
    /// Confirmation never resolves.
    Hang,
    /// The submission itself never resolves.
    HangOnSubmit,
    /// The confirmation call fails at the transport level.
    Broken(String),
}

#[derive(Debug, Default)]
struct FakeState {
    submitted: Vec<TxPayload>,
    reads: Vec<(Address, StateQuery)>,
}

/// In-memory chain that plays a script of confirmation behaviours, one per
/// submission, and records every call.
#[derive(Debug, Default)]
pub struct FakeChain {
    script: HashMap<usize, Scripted>,
    code: HashMap<Address, Bytes>,
    /// State reads never resolve.
    stalled_reads: bool,
    state: Mutex<FakeState>,
}

impl FakeChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the behaviour of the submission at `index` (0-based). Unscripted
    /// submissions confirm.
    pub fn on_submission(mut self, index: usize, behaviour: Scripted) -> Self {
        self.script.insert(index, behaviour);
        self
    }

    pub fn with_code(mut self, address: Address, code: Bytes) -> Self {
        self.code.insert(address, code);
        self
    }

    pub fn with_stalled_reads(mut self) -> Self {
        self.stalled_reads = true;
        self
    }

    pub fn submitted(&self) -> Vec<TxPayload> {
        self.state.lock().unwrap().submitted.clone()
    }

    pub fn submission_count(&self) -> usize {
        self.state.lock().unwrap().submitted.len()
    }

    pub fn read_count(&self) -> usize {
        self.state.lock().unwrap().reads.len()
    }

    /// Contract names of the deploy transactions, in submission order.
    pub fn deployed_contracts(&self) -> Vec<String> {
        self.submitted()
            .into_iter()
            .filter_map(|payload| match payload {
                TxPayload::Deploy { contract, .. } => Some(contract),
                TxPayload::Call { .. } => None,
            })
            .collect()
    }

    /// Address the fake assigns to the contract created by submission `index`.
    pub fn created_address(index: usize) -> Address {
        let mut bytes = [0u8; 20];
        bytes[12..].copy_from_slice(&((index as u64) + 0x1000).to_be_bytes());
        Address::from(bytes)
    }

    pub fn tx_hash(index: usize) -> B256 {
        B256::left_padding_from(&((index as u64) + 1).to_be_bytes())
    }

    fn index_of(hash: &B256) -> usize {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&hash[24..]);
        (u64::from_be_bytes(bytes) - 1) as usize
    }
}

impl ChainClient for FakeChain {
    async fn submit(&self, payload: TxPayload) -> Result<TxHandle, ChainError> {
        let index = {
            let mut state = self.state.lock().unwrap();
            state.submitted.push(payload.clone());
            state.submitted.len() - 1
        };

        match self.script.get(&index) {
            Some(Scripted::Reject(reason)) => return Err(ChainError::Rejected(reason.clone())),
            Some(Scripted::HangOnSubmit) => std::future::pending::<()>().await,
            _ => {}
        }

        Ok(TxHandle {
            hash: Self::tx_hash(index),
            payload,
        })
    }

    async fn await_confirmation(
        &self,
        handle: &TxHandle,
        _timeout: Duration,
    ) -> Result<Confirmation, ChainError> {
        let index = Self::index_of(&handle.hash);

        match self.script.get(&index).cloned().unwrap_or(Scripted::Confirm) {
            Scripted::Confirm | Scripted::Reject(_) | Scripted::HangOnSubmit => {
                let contract_address = match handle.payload {
                    TxPayload::Deploy { .. } => Some(Self::created_address(index)),
                    TxPayload::Call { .. } => None,
                };
                Ok(Confirmation::Confirmed(Receipt {
                    tx_hash: handle.hash,
                    block_number: index as u64 + 1,
                    contract_address,
                }))
            }
            Scripted::Revert(reason) => Ok(Confirmation::Reverted(reason)),
            Scripted::TimeOut => Ok(Confirmation::TimedOut),
            Scripted::Hang => std::future::pending().await,
            Scripted::Broken(reason) => Err(ChainError::Transport(reason)),
        }
    }

    async fn read_state(&self, address: Address, query: StateQuery) -> Result<Bytes, ChainError> {
        self.state
            .lock()
            .unwrap()
            .reads
            .push((address, query.clone()));

        if self.stalled_reads {
            std::future::pending::<()>().await;
        }

        match query {
            StateQuery::Code => Ok(self.code.get(&address).cloned().unwrap_or_default()),
            StateQuery::Call(_) => Ok(Bytes::new()),
        }
    }
}

/// Route library logs to the test output.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// A random address, for registry entries.
pub fn random_address() -> Address {
    Address::from(rand::random::<[u8; 20]>())
}

pub fn settings() -> OrchestratorSettings {
    OrchestratorSettings {
        call_timeout: Duration::from_secs(2),
        confirmation_timeout: Duration::from_secs(2),
        ..OrchestratorSettings::new(NETWORK)
    }
}

/// Inline bytecode for every contract the fixtures use.
pub fn artifacts() -> ArtifactStore {
    ["A", "B", "C", "D", "E", "Kernel", "ACL", "Vault", "Finance"]
        .into_iter()
        .fold(ArtifactStore::default(), |store, contract| {
            store.with_bytecode(contract, Bytes::from(vec![0x60, 0x80, 0x60, 0x40]))
        })
}

/// A, B(needs A), Wire(A -> B, EXECUTE).
pub fn basic_template() -> TemplateSpec {
    TemplateSpec::new("basic")
        .role(RoleNode::new("a", "A"))
        .role(
            RoleNode::new("b", "B")
                .param(ConstructorParam::Role("a".to_string()))
                .receive("a", "EXECUTE"),
        )
}

/// Five steps: three creates then two wires.
pub fn five_step_template() -> TemplateSpec {
    TemplateSpec::new("five")
        .role(RoleNode::new("kernel", "Kernel"))
        .role(RoleNode::new("acl", "ACL").param(ConstructorParam::Role("kernel".to_string())))
        .role(
            RoleNode::new("vault", "Vault")
                .param(ConstructorParam::Role("kernel".to_string()))
                .receive("kernel", "APP_MANAGER")
                .receive("acl", "CREATE_PERMISSIONS"),
        )
        .primary("vault")
}
