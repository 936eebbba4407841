//! [`ChainClient`] over Ethereum JSON-RPC.
//!
//! Transactions are sent with `eth_sendTransaction` from a node-managed
//! account, so signing and nonce sequencing stay with the node.

use std::time::Duration;

use alloy_core::primitives::{Address, B256, Bytes};
use anyhow::Context;
use backon::{ConstantBuilder, Retryable};
use serde::Deserialize;
use serde_json::{Value, json};
use url::Url;

use super::{ChainClient, ChainError, Confirmation, Receipt, StateQuery, TxHandle, TxPayload};
use crate::{
    DeployConfig, abi,
    rpc::{self, RpcError, deserialize_u64_from_hex},
};

/// Default interval between receipt polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Receipt as returned by `eth_getTransactionReceipt`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: B256,
    #[serde(deserialize_with = "deserialize_u64_from_hex")]
    block_number: u64,
    /// `0x1` on success, `0x0` on revert. Absent before Byzantium.
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    contract_address: Option<Address>,
}

impl RpcReceipt {
    fn reverted(&self) -> bool {
        self.status.as_deref() == Some("0x0")
    }
}

/// Error raised while polling for a receipt.
#[derive(Debug, thiserror::Error)]
enum PollError {
    #[error("receipt not available yet")]
    Pending,
    #[error(transparent)]
    Rpc(#[from] RpcError),
}

impl PollError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            PollError::Pending | PollError::Rpc(RpcError::Transport { .. })
        )
    }
}

/// JSON-RPC chain client.
#[derive(Debug, Clone)]
pub struct RpcChainClient {
    http: reqwest::Client,
    url: Url,
    from: Address,
    poll_interval: Duration,
}

impl RpcChainClient {
    /// Create a client sending transactions from `from`.
    pub fn new(url: Url, from: Address, call_timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            http: rpc::create_client(call_timeout)?,
            url,
            from,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// The account transactions are sent from.
    pub fn from_address(&self) -> Address {
        self.from
    }

    /// Connect to the node described by `config`.
    ///
    /// Waits for the node to answer `eth_chainId`, checks the chain id when the
    /// configuration pins one, and falls back to the node's first account when
    /// no sender is configured.
    pub async fn connect(config: &DeployConfig) -> anyhow::Result<Self> {
        let http = rpc::create_client(config.call_timeout())?;
        let url = config.rpc_url.clone();

        let chain_id = {
            let (ready_http, ready_url) = (http.clone(), url.clone());
            rpc::wait_until_ready(config.rpc_url.as_str(), config.ready_timeout_secs, move || {
                let http = ready_http.clone();
                let url = ready_url.clone();
                async move {
                    let _: String =
                        rpc::json_rpc_call(&http, url.as_str(), "eth_chainId", vec![]).await?;
                    Ok(())
                }
            })
            .await?;

            let chain_id: String =
                rpc::json_rpc_call(&http, url.as_str(), "eth_chainId", vec![]).await?;
            rpc::parse_hex_u64(&chain_id).context("Invalid eth_chainId response")?
        };

        if let Some(expected) = config.chain_id {
            if expected != chain_id {
                anyhow::bail!(
                    "Chain id mismatch: node at {} reports {}, configuration expects {}",
                    url,
                    chain_id,
                    expected
                );
            }
        }

        let from = match config.from {
            Some(from) => from,
            None => {
                let accounts: Vec<Address> =
                    rpc::json_rpc_call(&http, url.as_str(), "eth_accounts", vec![])
                        .await
                        .context("Failed to list node accounts")?;
                *accounts
                    .first()
                    .context("Node manages no account and no sender address is configured")?
            }
        };

        tracing::info!(
            url = %url,
            chain_id,
            from = %from,
            "Connected to chain"
        );

        Ok(Self {
            http,
            url,
            from,
            poll_interval: config.poll_interval(),
        })
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, RpcError> {
        rpc::json_rpc_call(&self.http, self.url.as_str(), method, params).await
    }

    /// Transaction object for a payload.
    fn tx_object(&self, payload: &TxPayload) -> Value {
        match payload {
            TxPayload::Deploy { code, .. } => json!({ "from": self.from, "data": code }),
            TxPayload::Call { to, data } => json!({ "from": self.from, "to": to, "data": data }),
        }
    }

    async fn poll_receipt(&self, hash: B256) -> Result<RpcReceipt, PollError> {
        let receipt: Option<RpcReceipt> = self
            .call("eth_getTransactionReceipt", vec![json!(hash)])
            .await?;
        receipt.ok_or(PollError::Pending)
    }

    /// Best-effort revert reason: replay the transaction with `eth_call` on the
    /// state preceding its block.
    async fn revert_reason(&self, handle: &TxHandle, block_number: u64) -> Option<String> {
        let block = format!("0x{:x}", block_number.saturating_sub(1));
        let replay: Result<Bytes, RpcError> = self
            .call("eth_call", vec![self.tx_object(&handle.payload), json!(block)])
            .await;

        match replay {
            Err(err @ RpcError::Node { .. }) => err
                .revert_data()
                .and_then(|data| abi::decode_revert_reason(&data))
                .or_else(|| match err {
                    RpcError::Node { message, .. } => Some(message),
                    _ => None,
                }),
            Err(err) => {
                tracing::debug!(error = %err, tx = %handle.hash, "Failed to replay reverted transaction");
                None
            }
            Ok(_) => None,
        }
    }
}

impl ChainClient for RpcChainClient {
    async fn submit(&self, tx: TxPayload) -> Result<TxHandle, ChainError> {
        let hash: B256 = self
            .call("eth_sendTransaction", vec![self.tx_object(&tx)])
            .await
            .map_err(|e| match e {
                RpcError::Node { message, .. } => ChainError::Rejected(message),
                other => ChainError::Transport(other.to_string()),
            })?;

        tracing::debug!(tx = %hash, "Transaction submitted");
        Ok(TxHandle { hash, payload: tx })
    }

    async fn await_confirmation(
        &self,
        handle: &TxHandle,
        timeout: Duration,
    ) -> Result<Confirmation, ChainError> {
        let interval_ms = self.poll_interval.as_millis().max(1);
        let attempts = usize::try_from(timeout.as_millis() / interval_ms).unwrap_or(usize::MAX);

        let polling = (|| self.poll_receipt(handle.hash))
            .retry(
                ConstantBuilder::default()
                    .with_delay(self.poll_interval)
                    .with_max_times(attempts),
            )
            .when(PollError::is_retryable)
            .notify(|err, after| {
                tracing::trace!(tx = %handle.hash, error = %err, ?after, "Receipt not found, polling again");
            });

        let receipt = match tokio::time::timeout(timeout, polling).await {
            Err(_) | Ok(Err(PollError::Pending)) => return Ok(Confirmation::TimedOut),
            Ok(Err(PollError::Rpc(e))) => return Err(ChainError::Transport(e.to_string())),
            Ok(Ok(receipt)) => receipt,
        };

        if receipt.reverted() {
            let reason = self.revert_reason(handle, receipt.block_number).await;
            return Ok(Confirmation::Reverted(reason));
        }

        Ok(Confirmation::Confirmed(Receipt {
            tx_hash: receipt.transaction_hash,
            block_number: receipt.block_number,
            contract_address: receipt.contract_address,
        }))
    }

    async fn read_state(&self, address: Address, query: StateQuery) -> Result<Bytes, ChainError> {
        let result = match query {
            StateQuery::Code => {
                self.call("eth_getCode", vec![json!(address), json!("latest")])
                    .await
            }
            StateQuery::Call(data) => {
                self.call(
                    "eth_call",
                    vec![json!({ "to": address, "data": data }), json!("latest")],
                )
                .await
            }
        };

        result.map_err(|e| ChainError::Transport(e.to_string()))
    }
}
