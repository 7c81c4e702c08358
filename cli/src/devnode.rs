//! # Development Node
//!
//! Serves an [`InMemoryLedger`] over the same JSON-RPC dialect
//! [`HttpLedgerNode`](dropship_protocol::network::HttpLedgerNode) speaks, so
//! `dropship distribute` can be pointed at a local process instead of a
//! real network.
//!
//! ## Endpoints
//!
//! | Method | Path      | Description          |
//! |--------|-----------|----------------------|
//! | GET    | `/health` | Liveness probe       |
//! | POST   | `/`       | JSON-RPC 2.0 gateway |
//! | POST   | `/rpc`    | Same gateway         |

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;
use tracing::debug;

use dropship_protocol::crypto::Address;
use dropship_protocol::network::rpc::quantity;
use dropship_protocol::network::{InMemoryLedger, LedgerNode, NodeError, RpcError, RpcMethod, RpcResponse};
use dropship_protocol::transaction::{SignedTransaction, TxHash};

/// Shared state for all handlers.
#[derive(Clone)]
pub struct DevnodeState {
    pub ledger: Arc<InMemoryLedger>,
}

pub fn create_router(state: DevnodeState) -> Router {
    Router::new()
        .route("/", post(rpc_handler))
        .route("/rpc", post(rpc_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_handler(State(state): State<DevnodeState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({ "status": "ok", "chain_id": state.ledger.chain_id_value() })),
    )
}

/// `POST /` — JSON-RPC 2.0 gateway.
///
/// The body is taken as raw JSON so that an unknown method still gets a
/// proper `-32601` answer with the caller's id.
async fn rpc_handler(State(state): State<DevnodeState>, Json(req): Json<Value>) -> impl IntoResponse {
    let id = req.get("id").cloned().unwrap_or(Value::Null);

    if req.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
        return Json(RpcResponse::error(
            id,
            RpcError::invalid_request("jsonrpc must be \"2.0\""),
        ));
    }
    let Some(name) = req.get("method").and_then(Value::as_str) else {
        return Json(RpcResponse::error(id, RpcError::invalid_request("missing method")));
    };
    let Ok(method) = serde_json::from_value::<RpcMethod>(Value::String(name.to_string())) else {
        return Json(RpcResponse::error(id, RpcError::method_not_found(name)));
    };
    let params = req.get("params").cloned().unwrap_or(Value::Array(Vec::new()));

    debug!(method = method.as_str(), %id, "devnode rpc");
    let response = match dispatch(&state.ledger, method, params).await {
        Ok(result) => RpcResponse::success(id, result),
        Err(error) => RpcResponse::error(id, error),
    };
    Json(response)
}

async fn dispatch(ledger: &InMemoryLedger, method: RpcMethod, params: Value) -> Result<Value, RpcError> {
    match method {
        RpcMethod::ChainId => Ok(json!(ledger.chain_id().await.map_err(to_rpc)?)),
        RpcMethod::GetPendingNonce => {
            let (account,): (Address,) = parse_params(params)?;
            Ok(json!(ledger.pending_sequence_number(&account).await.map_err(to_rpc)?))
        }
        RpcMethod::FeeUnitPrice => Ok(quantity(
            ledger.suggested_fee_unit_price().await.map_err(to_rpc)?,
        )),
        RpcMethod::SendRawTransaction => {
            let (raw,): (String,) = parse_params(params)?;
            let tx = SignedTransaction::from_raw(&raw)
                .map_err(|e| RpcError::invalid_params(e.to_string()))?;
            Ok(json!(ledger.broadcast(&tx).await.map_err(to_rpc)?))
        }
        RpcMethod::GetFinalizationRecord => {
            let (hash,): (TxHash,) = parse_params(params)?;
            Ok(json!(ledger.finalization_record(&hash).await.map_err(to_rpc)?))
        }
        RpcMethod::GetTokenBalance => {
            let (token, account): (Address, Address) = parse_params(params)?;
            Ok(quantity(
                ledger
                    .account_token_balance(&token, &account)
                    .await
                    .map_err(to_rpc)?,
            ))
        }
        RpcMethod::GetTokenDecimals => {
            let (token,): (Address,) = parse_params(params)?;
            Ok(json!(ledger.token_decimals(&token).await.map_err(to_rpc)?))
        }
    }
}

fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T, RpcError> {
    serde_json::from_value(params).map_err(|e| RpcError::invalid_params(e.to_string()))
}

fn to_rpc(e: NodeError) -> RpcError {
    match e {
        NodeError::Rpc { code, message } => RpcError {
            code,
            message,
            data: None,
        },
        NodeError::Connectivity(msg) => RpcError::unavailable(msg),
        NodeError::Decode(msg) => RpcError::internal_error(msg),
    }
}
