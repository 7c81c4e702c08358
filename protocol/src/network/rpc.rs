//! # JSON-RPC API Definitions
//!
//! Request/response types for the ledger node's JSON-RPC 2.0 API. The
//! client side lives in [`super::http`]; the development node in the CLI
//! serves the same methods over axum.
//!
//! Method names are prefixed with `ledger_`.
//!
//! ## Method Index
//!
//! | Method                          | Params                 | Result                     |
//! |---------------------------------|------------------------|----------------------------|
//! | `ledger_chainId`                | none                   | `u64`                      |
//! | `ledger_getPendingNonce`        | `[account]`            | `u64`                      |
//! | `ledger_feeUnitPrice`           | none                   | quantity                   |
//! | `ledger_sendRawTransaction`     | `[raw_tx]`             | tx hash                    |
//! | `ledger_getFinalizationRecord`  | `[tx_hash]`            | record or `null`           |
//! | `ledger_getTokenBalance`        | `[token, account]`     | quantity                   |
//! | `ledger_getTokenDecimals`       | `[token]`              | `u8`                       |
//!
//! A "quantity" is a `u128` written as a decimal string, because JSON
//! numbers lose precision past 2^53 in most clients.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// RPC Method Enumeration
// ---------------------------------------------------------------------------

/// Supported JSON-RPC methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RpcMethod {
    #[serde(rename = "ledger_chainId")]
    ChainId,
    /// Next nonce for an account, counting transactions still in the pool.
    #[serde(rename = "ledger_getPendingNonce")]
    GetPendingNonce,
    #[serde(rename = "ledger_feeUnitPrice")]
    FeeUnitPrice,
    /// Submit a raw signed transaction. Rejections use code `-32003`.
    #[serde(rename = "ledger_sendRawTransaction")]
    SendRawTransaction,
    /// `null` while the transaction is not yet finalized.
    #[serde(rename = "ledger_getFinalizationRecord")]
    GetFinalizationRecord,
    #[serde(rename = "ledger_getTokenBalance")]
    GetTokenBalance,
    #[serde(rename = "ledger_getTokenDecimals")]
    GetTokenDecimals,
}

impl RpcMethod {
    /// Wire name, as it appears in the `method` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ChainId => "ledger_chainId",
            Self::GetPendingNonce => "ledger_getPendingNonce",
            Self::FeeUnitPrice => "ledger_feeUnitPrice",
            Self::SendRawTransaction => "ledger_sendRawTransaction",
            Self::GetFinalizationRecord => "ledger_getFinalizationRecord",
            Self::GetTokenBalance => "ledger_getTokenBalance",
            Self::GetTokenDecimals => "ledger_getTokenDecimals",
        }
    }
}

// ---------------------------------------------------------------------------
// RPC Request / Response
// ---------------------------------------------------------------------------

/// A JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    /// JSON-RPC version. Always "2.0".
    pub jsonrpc: String,
    /// Request identifier. Echoed back in the response.
    pub id: serde_json::Value,
    pub method: RpcMethod,
    /// Positional parameters.
    #[serde(default)]
    pub params: serde_json::Value,
}

impl RpcRequest {
    pub fn new(id: serde_json::Value, method: RpcMethod, params: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method,
            params,
        }
    }
}

/// A JSON-RPC 2.0 response.
///
/// Exactly one of `result` or `error` is set by a conforming node. A
/// finalization-record lookup that finds nothing answers with an explicit
/// `"result": null`, so `result` is serialized even when it is `null`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: serde_json::Value,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn success(id: serde_json::Value, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: serde_json::Value, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

// ---------------------------------------------------------------------------
// RPC Errors
// ---------------------------------------------------------------------------

/// JSON-RPC 2.0 error object.
///
/// Standard codes `-32700..=-32600`; application codes start at `-32000`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl RpcError {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
    pub const ACCOUNT_NOT_FOUND: i32 = -32002;
    pub const TRANSACTION_REJECTED: i32 = -32003;
    pub const UNAVAILABLE: i32 = -32004;

    fn with_code(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn parse_error(msg: impl Into<String>) -> Self {
        Self::with_code(Self::PARSE_ERROR, msg)
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::with_code(Self::INVALID_REQUEST, msg)
    }

    pub fn method_not_found(method: impl Into<String>) -> Self {
        Self::with_code(
            Self::METHOD_NOT_FOUND,
            format!("method not found: {}", method.into()),
        )
    }

    pub fn invalid_params(msg: impl Into<String>) -> Self {
        Self::with_code(Self::INVALID_PARAMS, msg)
    }

    pub fn internal_error(msg: impl Into<String>) -> Self {
        Self::with_code(Self::INTERNAL_ERROR, msg)
    }

    /// The token contract is unknown to the node.
    pub fn account_not_found(address: &str) -> Self {
        Self::with_code(
            Self::ACCOUNT_NOT_FOUND,
            format!("account not found: {}", address),
        )
    }

    /// The node refused a submitted transaction.
    pub fn transaction_rejected(reason: impl Into<String>) -> Self {
        Self::with_code(Self::TRANSACTION_REJECTED, reason)
    }

    /// The node is up but cannot serve this request right now.
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::with_code(Self::UNAVAILABLE, msg)
    }
}

// ---------------------------------------------------------------------------
// Quantities
// ---------------------------------------------------------------------------

/// Encodes a `u128` quantity for the wire.
pub fn quantity(value: u128) -> serde_json::Value {
    serde_json::Value::String(value.to_string())
}

/// Decodes a quantity. Plain JSON integers are accepted too, since some
/// nodes send small values unquoted.
pub fn parse_quantity(value: &serde_json::Value) -> Result<u128, String> {
    match value {
        serde_json::Value::String(s) => s
            .parse::<u128>()
            .map_err(|e| format!("invalid quantity {:?}: {}", s, e)),
        serde_json::Value::Number(n) => n
            .as_u64()
            .map(u128::from)
            .ok_or_else(|| format!("invalid quantity {}", n)),
        other => Err(format!("expected quantity, got {}", other)),
    }
}
