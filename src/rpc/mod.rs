use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use jsonrpsee::core::client::{ClientT, Error as ClientError};
use jsonrpsee::core::params::ArrayParams;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::rpc_params;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::abi::{from_hex_data, to_hex_data};
use crate::error::ChainError;
use crate::wallet::{AccountId, WalletProvider};

/// JSON-RPC connection to an EIP-1193 style wallet provider. Account
/// requests, contract calls and transaction submission all travel through it.
#[derive(Clone)]
pub struct RpcClient {
    inner: HttpClient,
    timeout: Duration,
}

impl RpcClient {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        assert!(!endpoint.is_empty(), "RPC endpoint must be provided");
        assert!(
            timeout >= Duration::from_millis(100),
            "Timeout below 100ms is unsafe"
        );

        let client = HttpClientBuilder::default()
            .request_timeout(timeout)
            .build(endpoint)
            .with_context(|| format!("Failed to build RPC client for {endpoint}"))?;

        Ok(Self {
            inner: client,
            timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn request<R: DeserializeOwned>(
        &self,
        method: &'static str,
        params: ArrayParams,
    ) -> Result<R, ChainError> {
        debug!(method, "RPC request");
        self.inner
            .request(method, params)
            .await
            .map_err(|err| classify_error(method, err))
    }
}

/// Chain access the contract gateway needs: calls, transaction submission,
/// receipt lookup and the provider's chain id.
pub trait ContractTransport: Send + Sync + 'static {
    /// `eth_call` against the latest block, returning the raw return data.
    fn eth_call(
        &self,
        to: &str,
        data: &[u8],
    ) -> impl Future<Output = Result<Vec<u8>, ChainError>> + Send;

    /// Hands the transaction to the wallet for signing and broadcast.
    /// Returns the transaction hash.
    fn send_transaction(
        &self,
        from: AccountId,
        to: &str,
        data: &[u8],
    ) -> impl Future<Output = Result<String, ChainError>> + Send;

    /// `None` until the transaction is mined.
    fn transaction_receipt(
        &self,
        tx_hash: &str,
    ) -> impl Future<Output = Result<Option<TransactionReceipt>, ChainError>> + Send;

    fn fetch_chain_id(&self) -> impl Future<Output = Result<String, ChainError>> + Send;
}

impl ContractTransport for RpcClient {
    async fn eth_call(&self, to: &str, data: &[u8]) -> Result<Vec<u8>, ChainError> {
        let call = CallRequest {
            from: None,
            to: to.to_string(),
            data: to_hex_data(data),
        };
        let raw: String = self
            .request("eth_call", rpc_params![call, "latest"])
            .await?;
        from_hex_data(&raw)
    }

    async fn send_transaction(
        &self,
        from: AccountId,
        to: &str,
        data: &[u8],
    ) -> Result<String, ChainError> {
        let transaction = CallRequest {
            from: Some(from.to_string()),
            to: to.to_string(),
            data: to_hex_data(data),
        };
        let tx_hash: String = self
            .request("eth_sendTransaction", rpc_params![transaction])
            .await?;
        if tx_hash.trim().is_empty() {
            return Err(ChainError::decode(
                "transaction hash",
                "provider returned an empty hash",
            ));
        }
        Ok(tx_hash)
    }

    async fn transaction_receipt(
        &self,
        tx_hash: &str,
    ) -> Result<Option<TransactionReceipt>, ChainError> {
        self.request("eth_getTransactionReceipt", rpc_params![tx_hash])
            .await
    }

    async fn fetch_chain_id(&self) -> Result<String, ChainError> {
        self.request("eth_chainId", rpc_params![]).await
    }
}

impl WalletProvider for RpcClient {
    async fn request_accounts(&self) -> Result<Vec<String>, ChainError> {
        self.request("eth_requestAccounts", rpc_params![]).await
    }

    async fn accounts(&self) -> Result<Vec<String>, ChainError> {
        self.request("eth_accounts", rpc_params![]).await
    }

    async fn chain_id(&self) -> Result<String, ChainError> {
        ContractTransport::fetch_chain_id(self).await
    }
}

fn classify_error(method: &str, err: ClientError) -> ChainError {
    match err {
        ClientError::Call(call) => ChainError::Rpc {
            code: call.code(),
            message: call.message().to_string(),
        },
        other => ChainError::Transport(format!("{method}: {other}")),
    }
}

#[derive(Debug, Serialize)]
struct CallRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    from: Option<String>,
    to: String,
    data: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: String,
    pub block_number: Option<String>,
    /// `0x1` success, `0x0` revert; absent on pre-Byzantium chains.
    pub status: Option<String>,
}
