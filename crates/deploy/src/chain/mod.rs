//! Chain client abstraction consumed by the orchestrator.

mod rpc;

use std::future::Future;
use std::time::Duration;

use alloy_core::primitives::{Address, B256, Bytes};
use serde::{Deserialize, Serialize};

pub use rpc::RpcChainClient;

/// A transaction to submit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TxPayload {
    /// Contract creation: creation code followed by encoded constructor args.
    Deploy { contract: String, code: Bytes },
    /// Call into an existing contract.
    Call { to: Address, data: Bytes },
}

/// Handle to a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxHandle {
    pub hash: B256,
    /// The submitted payload, kept to replay the call when looking up a revert reason.
    pub payload: TxPayload,
}

/// Receipt of a successfully executed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub tx_hash: B256,
    pub block_number: u64,
    /// Set for contract creations.
    pub contract_address: Option<Address>,
}

/// Outcome of waiting for a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed(Receipt),
    /// Included, but execution reverted.
    Reverted(Option<String>),
    /// Not observed within the bound. The transaction may still be included later.
    TimedOut,
}

/// A state read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateQuery {
    /// Deployed runtime code.
    Code,
    /// Read-only call with the given calldata.
    Call(Bytes),
}

/// Errors raised by a [`ChainClient`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    /// The node refused the transaction before inclusion.
    #[error("transaction rejected: {0}")]
    Rejected(String),
    /// The node could not be reached or answered garbage.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Primitives the orchestrator needs from a chain.
///
/// Implementations are shared by reference across concurrent deployments, so
/// they must serialize transaction submission per signing account themselves
/// (the node does this for node-managed accounts).
pub trait ChainClient: Send + Sync {
    /// Submit a transaction.
    fn submit(&self, tx: TxPayload) -> impl Future<Output = Result<TxHandle, ChainError>> + Send;

    /// Wait at most `timeout` for the transaction to be included.
    fn await_confirmation(
        &self,
        handle: &TxHandle,
        timeout: Duration,
    ) -> impl Future<Output = Result<Confirmation, ChainError>> + Send;

    /// Read contract state.
    fn read_state(
        &self,
        address: Address,
        query: StateQuery,
    ) -> impl Future<Output = Result<Bytes, ChainError>> + Send;
}
