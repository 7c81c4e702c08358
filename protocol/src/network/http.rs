//! JSON-RPC over HTTP.
//!
//! [`HttpLedgerNode`] speaks the API described in [`super::rpc`] using a
//! pooled `reqwest` client. Transport failures (refused connections,
//! timeouts, 5xx from a proxy) are reported as
//! [`NodeError::Connectivity`]; anything the node itself says is passed on
//! as [`NodeError::Rpc`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

use super::node::{Connector, LedgerNode, NodeError, NodeHandle};
use super::rpc::{parse_quantity, RpcMethod, RpcRequest, RpcResponse};
use crate::config::DEFAULT_REQUEST_TIMEOUT;
use crate::crypto::Address;
use crate::transaction::{FinalizationRecord, SignedTransaction, TxHash};

/// A ledger node reached over HTTP.
#[derive(Clone, Debug)]
pub struct HttpLedgerNode {
    url: Url,
    client: Client,
    last_id: Arc<AtomicU64>,
}

impl HttpLedgerNode {
    pub fn new(url: Url, timeout: Duration) -> Result<Self, NodeError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NodeError::Connectivity(e.to_string()))?;
        Ok(Self {
            url,
            client,
            last_id: Arc::new(AtomicU64::new(0)),
        })
    }

    async fn call_raw(
        &self,
        method: RpcMethod,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, NodeError> {
        let id = self.last_id.fetch_add(1, Ordering::SeqCst);
        let request = RpcRequest::new(id.into(), method, params);
        debug!(method = method.as_str(), id, "rpc call");

        let response = self
            .client
            .post(self.url.clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| NodeError::Connectivity(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(NodeError::Connectivity(format!("http status {}", status)));
        }
        if !status.is_success() {
            return Err(NodeError::Decode(format!("http status {}", status)));
        }

        let body: RpcResponse = response.json().await.map_err(|e| {
            if e.is_decode() {
                NodeError::Decode(e.to_string())
            } else {
                NodeError::Connectivity(e.to_string())
            }
        })?;

        if let Some(error) = body.error {
            return Err(error.into());
        }
        Ok(body.result.unwrap_or(serde_json::Value::Null))
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: RpcMethod,
        params: serde_json::Value,
    ) -> Result<T, NodeError> {
        let value = self.call_raw(method, params).await?;
        serde_json::from_value(value)
            .map_err(|e| NodeError::Decode(format!("{}: {}", method.as_str(), e)))
    }

    async fn call_quantity(
        &self,
        method: RpcMethod,
        params: serde_json::Value,
    ) -> Result<u128, NodeError> {
        let value = self.call_raw(method, params).await?;
        parse_quantity(&value).map_err(NodeError::Decode)
    }
}

#[async_trait]
impl LedgerNode for HttpLedgerNode {
    async fn chain_id(&self) -> Result<u64, NodeError> {
        self.call(RpcMethod::ChainId, json!([])).await
    }

    async fn pending_sequence_number(&self, account: &Address) -> Result<u64, NodeError> {
        self.call(RpcMethod::GetPendingNonce, json!([account])).await
    }

    async fn suggested_fee_unit_price(&self) -> Result<u128, NodeError> {
        self.call_quantity(RpcMethod::FeeUnitPrice, json!([])).await
    }

    async fn broadcast(&self, tx: &SignedTransaction) -> Result<TxHash, NodeError> {
        let raw = tx
            .to_raw()
            .map_err(|e| NodeError::Decode(e.to_string()))?;
        self.call(RpcMethod::SendRawTransaction, json!([raw])).await
    }

    async fn finalization_record(
        &self,
        hash: &TxHash,
    ) -> Result<Option<FinalizationRecord>, NodeError> {
        self.call(RpcMethod::GetFinalizationRecord, json!([hash]))
            .await
    }

    async fn account_token_balance(
        &self,
        token: &Address,
        account: &Address,
    ) -> Result<u128, NodeError> {
        self.call_quantity(RpcMethod::GetTokenBalance, json!([token, account]))
            .await
    }

    async fn token_decimals(&self, token: &Address) -> Result<u8, NodeError> {
        self.call(RpcMethod::GetTokenDecimals, json!([token])).await
    }
}

// ---------------------------------------------------------------------------
// HttpConnector
// ---------------------------------------------------------------------------

/// Dials [`HttpLedgerNode`]s.
///
/// HTTP has no session to open, so a dial is a `ledger_chainId` probe: the
/// handle is only handed out once the node has actually answered.
#[derive(Debug, Clone)]
pub struct HttpConnector {
    request_timeout: Duration,
}

impl HttpConnector {
    pub fn new(request_timeout: Duration) -> Self {
        Self { request_timeout }
    }
}

impl Default for HttpConnector {
    fn default() -> Self {
        Self::new(DEFAULT_REQUEST_TIMEOUT)
    }
}

#[async_trait]
impl Connector for HttpConnector {
    fn validate(&self, endpoint: &Url) -> Result<(), String> {
        match endpoint.scheme() {
            "http" | "https" if endpoint.host_str().is_some() => Ok(()),
            "http" | "https" => Err(format!("endpoint {} has no host", endpoint)),
            other => Err(format!("unsupported endpoint scheme {:?}", other)),
        }
    }

    async fn connect(&self, endpoint: &Url) -> Result<NodeHandle, NodeError> {
        let node = HttpLedgerNode::new(endpoint.clone(), self.request_timeout)?;
        let chain_id = node.chain_id().await?;
        debug!(endpoint = %endpoint, chain_id, "node answered probe");
        Ok(Arc::new(node))
    }
}
