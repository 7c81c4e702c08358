//! Error types for the dispatch pipeline.
//!
//! Every per-recipient failure is one of these. The distributor converts
//! them into [`TransactionResult`](super::TransactionResult)s, so only
//! configuration problems ever escape a batch.

use thiserror::Error;

use super::result::Stage;
use crate::network::SupervisorError;

/// Errors that can occur while dispatching one transaction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The sender's next sequence number could not be determined.
    #[error("sequence number unavailable: {0}")]
    Sequencing(String),

    /// Fee lookup, assembly or signing failed. Nothing was sent.
    #[error("transaction construction failed: {0}")]
    Construction(String),

    /// The node refused the transaction. It will not be retried.
    #[error("transaction rejected: {0}")]
    Rejection(String),

    /// The transaction may or may not have been applied.
    #[error("outcome unknown: {0}")]
    Indeterminate(String),

    /// The node stayed unreachable past the reconnect bound.
    #[error("node unreachable: {0}")]
    Connectivity(String),

    #[error("cancelled")]
    Cancelled,

    /// The batch cannot run as configured. Raised before any recipient is
    /// touched.
    #[error("invalid configuration: {0}")]
    Configuration(String),
}

impl DispatchError {
    /// Maps a supervisor failure. Errors the node itself reported are
    /// wrapped by `on_node`, which names the step that was running.
    pub fn from_supervisor(err: SupervisorError, on_node: impl FnOnce(String) -> Self) -> Self {
        match err {
            SupervisorError::Cancelled => Self::Cancelled,
            SupervisorError::RetriesExhausted { .. } => Self::Connectivity(err.to_string()),
            SupervisorError::InvalidEndpoint { .. } => Self::Configuration(err.to_string()),
            SupervisorError::Node(e) => on_node(e.to_string()),
        }
    }

    /// The pipeline step a definite failure is attributed to. `None` for
    /// errors that do not mean the transaction failed.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Sequencing(_) => Some(Stage::Sequencing),
            Self::Construction(_) | Self::Configuration(_) => Some(Stage::Construction),
            Self::Rejection(_) => Some(Stage::Broadcast),
            Self::Connectivity(_) => Some(Stage::Connection),
            Self::Indeterminate(_) | Self::Cancelled => None,
        }
    }
}
