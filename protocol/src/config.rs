//! # Dispatch Configuration & Constants
//!
//! Every magic number in the dispatch engine lives here, next to the
//! runtime knobs that let callers override them. Constants describe the
//! defaults the engine ships with; the `*Config` structs are what actually
//! flows into the supervisor, receipt tracker and distributor.
//!
//! All config structs implement `Default` and serde so the CLI can fill
//! them from flags, environment variables or a JSON file.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Timing Constants
// ---------------------------------------------------------------------------

/// Wait between two dial attempts when the node is unreachable.
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(1);

/// Wait between two finalization-record polls.
pub const DEFAULT_RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Per-request timeout for the HTTP transport. A request that hangs longer
/// than this is treated as a dropped connection.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Fee Parameters
// ---------------------------------------------------------------------------

/// Resource budget attached to every outbound transaction, in computational
/// units. Deliberately generous: an under-provisioned transaction fails
/// on-chain and still burns its nonce.
pub const DEFAULT_FEE_BUDGET: u64 = 3_000_000;

/// Resource cost of a plain value transfer on the reference ledger.
pub const BASE_TRANSFER_COST: u64 = 21_000;

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Account address length in bytes.
pub const ADDRESS_LENGTH: usize = 20;

/// Ed25519 secret key length in bytes.
pub const SECRET_KEY_LENGTH: usize = 32;

/// Ed25519 signature length in bytes.
pub const SIGNATURE_LENGTH: usize = 64;

/// Version tag written into every signed transaction.
pub const TRANSACTION_VERSION: u16 = 1;

/// Selector of the token contract's `transfer(address,uint256)` entry point.
pub const TOKEN_TRANSFER_SELECTOR: [u8; 4] = [0xa9, 0x05, 0x9c, 0xbb];

/// Selector of the token contract's `addToken(address,uint256)` entry point,
/// which issues new supply to an account. Only the token's minter may call it.
pub const TOKEN_MINT_SELECTOR: [u8; 4] = [0xaf, 0x81, 0xc5, 0xb9];

/// Largest number of token decimals the distributor will scale by.
/// `10^38` is the largest power of ten that fits in a `u128`.
pub const MAX_TOKEN_DECIMALS: u8 = 38;

/// Capacity of the event channel handed out by `BatchDistributor::spawn`.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// Runtime Configuration
// ---------------------------------------------------------------------------

/// Reconnect policy for the [`ConnectionSupervisor`](crate::network::ConnectionSupervisor).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Wait between dial attempts.
    #[serde(with = "duration_ms")]
    pub reconnect_interval: Duration,

    /// Give up after this many consecutive failures. `None` retries
    /// forever.
    pub max_reconnect_attempts: Option<u32>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            max_reconnect_attempts: None,
        }
    }
}

/// Polling policy for the [`ReceiptTracker`](crate::dispatch::ReceiptTracker).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiptConfig {
    /// Wait between finalization-record polls.
    #[serde(with = "duration_ms")]
    pub poll_interval: Duration,

    /// Stop polling after this many "not found" answers and report the
    /// outcome as unknown. `None` polls until the ledger answers.
    pub max_polls: Option<u32>,
}

impl Default for ReceiptConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_RECEIPT_POLL_INTERVAL,
            max_polls: None,
        }
    }
}

/// Knobs for the [`BatchDistributor`](crate::dispatch::BatchDistributor).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributorConfig {
    /// Resource budget attached to every transaction.
    pub fee_budget: u64,

    /// Number of recipients processed concurrently. `1` is strictly
    /// sequential. Results are emitted in input order either way.
    pub max_in_flight: usize,

    /// Multiply token amounts by `10^decimals` of the token contract, so the
    /// caller can speak in whole tokens.
    pub scale_by_decimals: bool,

    /// Query the recipient's token balance after a successful transfer.
    pub report_balances: bool,
}

impl Default for DistributorConfig {
    fn default() -> Self {
        Self {
            fee_budget: DEFAULT_FEE_BUDGET,
            max_in_flight: 1,
            scale_by_decimals: true,
            report_balances: true,
        }
    }
}

/// Everything the engine needs, in one serializable bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub supervisor: SupervisorConfig,
    pub receipt: ReceiptConfig,
    pub distributor: DistributorConfig,
}

impl DispatchConfig {
    /// Parses a JSON config document. Missing fields fall back to defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Durations travel as integer milliseconds in config files.
mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_constants() {
        let cfg = DispatchConfig::default();
        assert_eq!(cfg.supervisor.reconnect_interval, DEFAULT_RECONNECT_INTERVAL);
        assert_eq!(cfg.supervisor.max_reconnect_attempts, None);
        assert_eq!(cfg.receipt.poll_interval, DEFAULT_RECEIPT_POLL_INTERVAL);
        assert_eq!(cfg.receipt.max_polls, None);
        assert_eq!(cfg.distributor.fee_budget, DEFAULT_FEE_BUDGET);
        assert_eq!(cfg.distributor.max_in_flight, 1);
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let cfg = DispatchConfig::from_json(
            r#"{ "receipt": { "poll_interval": 500, "max_polls": 10 } }"#,
        )
        .unwrap();
        assert_eq!(cfg.receipt.poll_interval, Duration::from_millis(500));
        assert_eq!(cfg.receipt.max_polls, Some(10));
        assert_eq!(cfg.supervisor, SupervisorConfig::default());
        assert_eq!(cfg.distributor, DistributorConfig::default());
    }

    #[test]
    fn empty_json_is_default() {
        assert_eq!(DispatchConfig::from_json("{}").unwrap(), DispatchConfig::default());
    }

    #[test]
    fn durations_travel_as_milliseconds() {
        let cfg = DispatchConfig {
            supervisor: SupervisorConfig {
                reconnect_interval: Duration::from_millis(1_500),
                max_reconnect_attempts: Some(4),
            },
            receipt: ReceiptConfig {
                poll_interval: Duration::from_millis(250),
                max_polls: None,
            },
            ..DispatchConfig::default()
        };

        let json = serde_json::to_value(&cfg).unwrap();
        assert_eq!(json["supervisor"]["reconnect_interval"], 1_500);
        assert_eq!(json["receipt"]["poll_interval"], 250);

        let back: DispatchConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, cfg);
    }
}
