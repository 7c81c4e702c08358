//! Per-recipient results and the progress events streamed while a batch
//! runs.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::DispatchError;
use crate::crypto::Address;
use crate::transaction::TxHash;

// ---------------------------------------------------------------------------
// Stage / Outcome
// ---------------------------------------------------------------------------

/// Where in the pipeline a transaction failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Connection,
    Sequencing,
    Construction,
    Broadcast,
    /// Included in the ledger, but execution failed.
    Execution,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Connection => "connection",
            Self::Sequencing => "sequencing",
            Self::Construction => "construction",
            Self::Broadcast => "broadcast",
            Self::Execution => "execution",
        };
        f.write_str(s)
    }
}

/// Final verdict for one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Succeeded,
    Failed { stage: Stage },
    /// The ledger never gave a verdict we could observe. The transaction
    /// may still land.
    Unknown { reason: String },
    /// Never started, because the batch was cancelled first.
    Skipped,
}

// ---------------------------------------------------------------------------
// TransactionResult
// ---------------------------------------------------------------------------

/// What happened to one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionResult {
    /// Position in the input list.
    pub index: usize,
    pub recipient: Address,
    /// Set once a transaction was signed.
    pub hash: Option<TxHash>,
    pub outcome: Outcome,
    /// Computational units consumed, from the finalization record.
    pub resource_cost: Option<u64>,
    pub error: Option<String>,
    /// Recipient's token balance after a successful token transfer.
    #[serde(with = "opt_quantity")]
    pub balance_after: Option<u128>,
}

impl TransactionResult {
    pub(crate) fn new(index: usize, recipient: Address, outcome: Outcome) -> Self {
        Self {
            index,
            recipient,
            hash: None,
            outcome,
            resource_cost: None,
            error: None,
            balance_after: None,
        }
    }

    pub fn skipped(index: usize, recipient: Address) -> Self {
        Self::new(index, recipient, Outcome::Skipped)
    }

    /// Result for a recipient whose pipeline stopped with `err`.
    ///
    /// Cancellation before anything was broadcast counts as skipped;
    /// indeterminate errors are unknown, not failed.
    pub fn from_error(
        index: usize,
        recipient: Address,
        hash: Option<TxHash>,
        err: DispatchError,
    ) -> Self {
        let outcome = match (&err, err.stage()) {
            (DispatchError::Cancelled, _) if hash.is_none() => Outcome::Skipped,
            (_, Some(stage)) => Outcome::Failed { stage },
            (_, None) => Outcome::Unknown {
                reason: err.to_string(),
            },
        };
        Self {
            hash,
            error: Some(err.to_string()),
            ..Self::new(index, recipient, outcome)
        }
    }

    pub fn succeeded(&self) -> bool {
        self.outcome == Outcome::Succeeded
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self.outcome, Outcome::Unknown { .. })
    }
}

impl fmt::Display for TransactionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: ", self.index, self.recipient)?;
        match &self.outcome {
            Outcome::Succeeded => write!(f, "succeeded")?,
            Outcome::Failed { stage } => write!(f, "failed at {}", stage)?,
            Outcome::Unknown { reason } => write!(f, "outcome unknown ({})", reason)?,
            Outcome::Skipped => write!(f, "skipped")?,
        }
        if let Some(hash) = &self.hash {
            write!(f, ", tx {}", hash)?;
        }
        if let Some(cost) = self.resource_cost {
            write!(f, ", cost {}", cost)?;
        }
        if let Some(balance) = self.balance_after {
            write!(f, ", balance {}", balance)?;
        }
        if let (Some(err), Outcome::Failed { .. }) = (&self.error, &self.outcome) {
            write!(f, ": {}", err)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Pipeline progress for one recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Signing,
    Broadcasting,
    AwaitingConfirmation,
    Finished,
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Signing => "signing transaction",
            Self::Broadcasting => "broadcasting transaction",
            Self::AwaitingConfirmation => "awaiting confirmation",
            Self::Finished => "finished",
        };
        f.write_str(s)
    }
}

/// What a running batch reports to its observer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BatchEvent {
    Status {
        index: usize,
        recipient: Address,
        status: BatchStatus,
    },
    Result(TransactionResult),
}

impl fmt::Display for BatchEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status {
                index,
                recipient,
                status,
            } => write!(f, "[{}] {}: {}", index, recipient, status),
            Self::Result(result) => write!(f, "{}", result),
        }
    }
}

// ---------------------------------------------------------------------------
// BatchSummary
// ---------------------------------------------------------------------------

/// Counts over a finished batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub unknown: usize,
    pub skipped: usize,
    pub resource_cost: u64,
}

impl BatchSummary {
    pub fn from_results(results: &[TransactionResult]) -> Self {
        let mut summary = Self {
            total: results.len(),
            ..Self::default()
        };
        for result in results {
            match result.outcome {
                Outcome::Succeeded => summary.succeeded += 1,
                Outcome::Failed { .. } => summary.failed += 1,
                Outcome::Unknown { .. } => summary.unknown += 1,
                Outcome::Skipped => summary.skipped += 1,
            }
            summary.resource_cost = summary
                .resource_cost
                .saturating_add(result.resource_cost.unwrap_or(0));
        }
        summary
    }

    /// `true` if every recipient succeeded.
    pub fn all_succeeded(&self) -> bool {
        self.succeeded == self.total
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} recipients: {} succeeded, {} failed, {} unknown, {} skipped (resource cost {})",
            self.total, self.succeeded, self.failed, self.unknown, self.skipped, self.resource_cost
        )
    }
}

/// `Option<u128>` as an optional decimal string, matching the RPC quantity
/// format.
mod opt_quantity {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &Option<u128>, s: S) -> Result<S::Ok, S::Error> {
        match v {
            Some(n) => s.serialize_some(&n.to_string()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u128>, D::Error> {
        Option::<String>::deserialize(d)?
            .map(|s| s.parse().map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bob() -> Address {
        Address::from_bytes([0xbb; 20])
    }

    #[test]
    fn rejection_is_a_broadcast_failure() {
        let r = TransactionResult::from_error(
            1,
            bob(),
            None,
            DispatchError::Rejection("nonce too low".into()),
        );
        assert_eq!(r.outcome, Outcome::Failed { stage: Stage::Broadcast });
        assert!(!r.succeeded());
        assert!(r.to_string().contains("failed at broadcast"));
        assert!(r.to_string().contains("nonce too low"));
    }

    #[test]
    fn indeterminate_is_unknown() {
        let r = TransactionResult::from_error(
            0,
            bob(),
            Some(TxHash::from_bytes([1; 32])),
            DispatchError::Indeterminate("record query failed".into()),
        );
        assert!(r.is_unknown());
        assert!(r.hash.is_some());
    }

    #[test]
    fn cancellation_before_broadcast_is_skipped() {
        let r = TransactionResult::from_error(0, bob(), None, DispatchError::Cancelled);
        assert_eq!(r.outcome, Outcome::Skipped);

        let after = TransactionResult::from_error(
            0,
            bob(),
            Some(TxHash::from_bytes([1; 32])),
            DispatchError::Cancelled,
        );
        assert!(after.is_unknown());
    }

    #[test]
    fn summary_counts_each_outcome() {
        let mut ok = TransactionResult::new(0, bob(), Outcome::Succeeded);
        ok.resource_cost = Some(21_000);
        let results = vec![
            ok,
            TransactionResult::from_error(1, bob(), None, DispatchError::Rejection("x".into())),
            TransactionResult::new(2, bob(), Outcome::Unknown { reason: "cancelled".into() }),
            TransactionResult::skipped(3, bob()),
        ];
        let summary = BatchSummary::from_results(&results);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.unknown, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.resource_cost, 21_000);
        assert!(!summary.all_succeeded());
    }

    #[test]
    fn result_json_shape() {
        let mut r = TransactionResult::new(0, bob(), Outcome::Succeeded);
        r.balance_after = Some(5_000_000_000_000_000_000);
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["outcome"]["status"], "succeeded");
        assert_eq!(json["balance_after"], "5000000000000000000");
        let back: TransactionResult = serde_json::from_value(json).unwrap();
        assert_eq!(back, r);
    }

    #[test]
    fn status_event_display() {
        let ev = BatchEvent::Status {
            index: 2,
            recipient: bob(),
            status: BatchStatus::AwaitingConfirmation,
        };
        assert_eq!(
            ev.to_string(),
            format!("[2] {}: awaiting confirmation", bob())
        );
    }
}
