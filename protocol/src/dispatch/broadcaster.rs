//! Submission of signed transactions.
//!
//! A lost response is replayed by the supervisor, which relies on
//! [`LedgerNode::broadcast`](crate::network::LedgerNode::broadcast) being
//! idempotent.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::error::DispatchError;
use crate::cancel::CancelToken;
use crate::crypto::Address;
use crate::network::{ConnectionSupervisor, SupervisorError};
use crate::transaction::{SignedTransaction, TxHash};

/// Proof that the node accepted a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub hash: TxHash,
    pub recipient: Address,
    pub nonce: u64,
    pub submitted_at: DateTime<Utc>,
}

/// Sends signed transactions through the supervisor.
#[derive(Debug)]
pub struct Broadcaster {
    supervisor: Arc<ConnectionSupervisor>,
}

impl Broadcaster {
    pub fn new(supervisor: Arc<ConnectionSupervisor>) -> Self {
        Self { supervisor }
    }

    /// Submits `signed` and returns once the node has accepted it. Does not
    /// wait for finalization.
    ///
    /// A connection that drops mid-submission is replayed by the
    /// supervisor; if it never comes back the transaction may or may not
    /// have reached the node, so that case is indeterminate rather than a
    /// failure.
    pub async fn submit(
        &self,
        signed: SignedTransaction,
        recipient: Address,
        cancel: &CancelToken,
    ) -> Result<TransactionRecord, DispatchError> {
        let local_hash = signed.hash();
        let tx = &signed;
        let result = self
            .supervisor
            .call(cancel, move |node| async move { node.broadcast(tx).await })
            .await;

        let hash = match result {
            Ok(hash) => hash,
            Err(SupervisorError::Node(e)) if e.is_rejection() => {
                warn!(%recipient, hash = %local_hash, error = %e, "transaction rejected");
                return Err(DispatchError::Rejection(e.to_string()));
            }
            Err(SupervisorError::Node(e)) => {
                return Err(DispatchError::Indeterminate(format!(
                    "broadcast answer unreadable: {}",
                    e
                )));
            }
            Err(SupervisorError::Cancelled) => {
                return Err(DispatchError::Indeterminate(
                    "cancelled during broadcast".into(),
                ));
            }
            Err(e) => return Err(DispatchError::Indeterminate(e.to_string())),
        };

        if hash != local_hash {
            warn!(%hash, %local_hash, "node reported a different transaction hash");
        }
        info!(%recipient, %hash, nonce = signed.transaction.nonce, "transaction broadcast");

        Ok(TransactionRecord {
            hash,
            recipient,
            nonce: signed.transaction.nonce,
            submitted_at: Utc::now(),
        })
    }
}
