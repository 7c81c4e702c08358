//! # Ledger Node Interface
//!
//! [`LedgerNode`] is the seam between the dispatch engine and whatever
//! actually talks to the ledger. Every query the engine issues goes through
//! it, so the HTTP client and the in-memory ledger are interchangeable.
//!
//! [`Connector`] produces node handles. The
//! [`ConnectionSupervisor`](super::ConnectionSupervisor) owns one connector
//! and calls it again whenever the current handle reports a connectivity
//! failure.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use super::rpc::RpcError;
use crate::crypto::Address;
use crate::transaction::{FinalizationRecord, SignedTransaction, TxHash};

// ---------------------------------------------------------------------------
// NodeError
// ---------------------------------------------------------------------------

/// Failures reported by a [`LedgerNode`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NodeError {
    /// The node could not be reached or the link dropped mid-request.
    /// Only this variant makes the supervisor reconnect.
    #[error("node unreachable: {0}")]
    Connectivity(String),

    /// The node answered with a JSON-RPC error.
    #[error("node error {code}: {message}")]
    Rpc { code: i32, message: String },

    /// The node answered with something this client cannot interpret.
    #[error("malformed node response: {0}")]
    Decode(String),
}

impl NodeError {
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connectivity(_))
    }

    /// `true` if the node explicitly refused a submitted transaction.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Rpc { code, .. } if *code == RpcError::TRANSACTION_REJECTED)
    }
}

impl From<RpcError> for NodeError {
    fn from(e: RpcError) -> Self {
        Self::Rpc {
            code: e.code,
            message: e.message,
        }
    }
}

// ---------------------------------------------------------------------------
// LedgerNode
// ---------------------------------------------------------------------------

/// Queries and submissions the dispatch engine needs from a ledger node.
#[async_trait]
pub trait LedgerNode: Send + Sync {
    /// Identifier of the ledger, bound into every signature.
    async fn chain_id(&self) -> Result<u64, NodeError>;

    /// Next sequence number for `account`, counting transactions the node
    /// has accepted but not yet finalized.
    async fn pending_sequence_number(&self, account: &Address) -> Result<u64, NodeError>;

    /// Current price per computational unit.
    async fn suggested_fee_unit_price(&self) -> Result<u128, NodeError>;

    /// Submits a signed transaction and returns the hash the node assigned.
    ///
    /// Must be idempotent: the supervisor replays this call after a dropped
    /// connection, so a transaction the node already holds has to come back
    /// as `Ok` with its hash. An implementation whose node answers "already
    /// known" with an error code maps that answer to `Ok` itself; left as an
    /// error it reads as [`NodeError::Rpc`] and the recipient is reported as
    /// refused although the transfer went through.
    async fn broadcast(&self, tx: &SignedTransaction) -> Result<TxHash, NodeError>;

    /// Finalization record for `hash`, or `None` while it is still pending
    /// (or unknown to the node).
    async fn finalization_record(
        &self,
        hash: &TxHash,
    ) -> Result<Option<FinalizationRecord>, NodeError>;

    /// `account`'s balance on the `token` contract.
    async fn account_token_balance(
        &self,
        token: &Address,
        account: &Address,
    ) -> Result<u128, NodeError>;

    async fn token_decimals(&self, token: &Address) -> Result<u8, NodeError>;
}

/// Shared handle to a connected node.
pub type NodeHandle = Arc<dyn LedgerNode>;

// ---------------------------------------------------------------------------
// Connector
// ---------------------------------------------------------------------------

/// Dials a ledger node.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Checks that `endpoint` is something this connector can dial at all.
    /// Called once, before the first dial; a failure here is a
    /// configuration error and is never retried.
    fn validate(&self, endpoint: &reqwest::Url) -> Result<(), String> {
        let _ = endpoint;
        Ok(())
    }

    /// One dial attempt. Returning [`NodeError::Connectivity`] makes the
    /// supervisor wait and try again; any other error also counts as a
    /// failed attempt.
    async fn connect(&self, endpoint: &reqwest::Url) -> Result<NodeHandle, NodeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_is_recognized_by_code() {
        let rejected: NodeError = RpcError::transaction_rejected("nonce too low").into();
        assert!(rejected.is_rejection());
        assert!(!rejected.is_connectivity());

        let internal: NodeError = RpcError::internal_error("boom").into();
        assert!(!internal.is_rejection());
    }

    #[test]
    fn connectivity_is_not_rejection() {
        let err = NodeError::Connectivity("reset by peer".into());
        assert!(err.is_connectivity());
        assert!(!err.is_rejection());
    }

    #[test]
    fn display_includes_code() {
        let err = NodeError::Rpc {
            code: -32003,
            message: "insufficient funds".into(),
        };
        assert_eq!(err.to_string(), "node error -32003: insufficient funds");
    }
}
