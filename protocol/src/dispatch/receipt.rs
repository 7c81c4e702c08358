//! Waiting for a transaction's finalization record.
//!
//! The tracker polls immediately, then every `poll_interval` for as long as
//! the node answers "not found". A failing query does not mean the
//! transaction failed, so it ends tracking with an indeterminate error
//! instead of a failure.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::broadcaster::TransactionRecord;
use super::error::DispatchError;
use crate::cancel::CancelToken;
use crate::config::ReceiptConfig;
use crate::network::{ConnectionSupervisor, SupervisorError};

/// How tracking ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReceiptOutcome {
    /// The ledger recorded a verdict.
    Finalized { succeeded: bool, resource_cost: u64 },
    /// Tracking stopped without a verdict.
    Unknown(String),
}

/// Polls the node for finalization records.
#[derive(Debug)]
pub struct ReceiptTracker {
    supervisor: Arc<ConnectionSupervisor>,
    config: ReceiptConfig,
}

impl ReceiptTracker {
    pub fn new(supervisor: Arc<ConnectionSupervisor>, config: ReceiptConfig) -> Self {
        Self { supervisor, config }
    }

    pub async fn await_receipt(
        &self,
        record: &TransactionRecord,
        cancel: &CancelToken,
    ) -> Result<ReceiptOutcome, DispatchError> {
        let hash = &record.hash;
        let mut polls: u32 = 0;

        loop {
            let found = self
                .supervisor
                .call(cancel, move |node| async move {
                    node.finalization_record(hash).await
                })
                .await;
            polls += 1;

            match found {
                Ok(Some(finalized)) => {
                    info!(
                        %hash,
                        succeeded = finalized.succeeded,
                        resource_used = finalized.resource_used,
                        polls,
                        "transaction finalized"
                    );
                    return Ok(ReceiptOutcome::Finalized {
                        succeeded: finalized.succeeded,
                        resource_cost: finalized.resource_used,
                    });
                }
                Ok(None) => {
                    debug!(%hash, polls, "not finalized yet");
                }
                Err(SupervisorError::Cancelled) => {
                    return Ok(ReceiptOutcome::Unknown("cancelled".into()));
                }
                Err(e) => {
                    return Err(DispatchError::Indeterminate(format!(
                        "finalization query failed: {}",
                        e
                    )));
                }
            }

            if self.config.max_polls.is_some_and(|max| polls >= max) {
                return Ok(ReceiptOutcome::Unknown(format!(
                    "not finalized after {} polls",
                    polls
                )));
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                _ = cancel.cancelled() => {
                    return Ok(ReceiptOutcome::Unknown("cancelled".into()));
                }
            }
        }
    }
}
