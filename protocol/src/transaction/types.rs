//! Core value types for outbound transactions.
//!
//! Kept small and `Copy`-friendly; they are passed around per recipient
//! and cloned into events.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::crypto::Address;

// ---------------------------------------------------------------------------
// Transfer
// ---------------------------------------------------------------------------

/// What each recipient receives.
///
/// Amounts are integers in the smallest unit the ledger knows. Token
/// amounts may be given in whole tokens and scaled by the distributor, see
/// [`DistributorConfig::scale_by_decimals`](crate::config::DistributorConfig).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transfer {
    /// Plain value transfer straight to the recipient.
    Native { value: u128 },
    /// `transfer(recipient, amount)` call on a token contract.
    Token { contract: Address, amount: u128 },
    /// `addToken(recipient, amount)` call on a token contract: new supply is
    /// issued to the recipient. The sender must be the token's minter.
    Mint { contract: Address, amount: u128 },
}

impl Transfer {
    /// The amount carried per recipient, whatever the kind.
    pub fn amount(&self) -> u128 {
        match self {
            Self::Native { value } => *value,
            Self::Token { amount, .. } | Self::Mint { amount, .. } => *amount,
        }
    }

    /// The token contract called, `None` for native transfers.
    pub fn token_contract(&self) -> Option<Address> {
        match self {
            Self::Native { .. } => None,
            Self::Token { contract, .. } | Self::Mint { contract, .. } => Some(*contract),
        }
    }

    /// The same transfer with a different amount.
    pub fn with_amount(self, amount: u128) -> Self {
        match self {
            Self::Native { .. } => Self::Native { value: amount },
            Self::Token { contract, .. } => Self::Token { contract, amount },
            Self::Mint { contract, .. } => Self::Mint { contract, amount },
        }
    }
}

impl fmt::Display for Transfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native { value } => write!(f, "{} native", value),
            Self::Token { contract, amount } => write!(f, "{} of token {}", amount, contract),
            Self::Mint { contract, amount } => write!(f, "{} newly minted of token {}", amount, contract),
        }
    }
}

// ---------------------------------------------------------------------------
// TxHash
// ---------------------------------------------------------------------------

/// Identifier the node hands back for an accepted transaction.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxHash([u8; 32]);

impl TxHash {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxHash({})", self)
    }
}

impl FromStr for TxHash {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s.trim().trim_start_matches("0x");
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(body, &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl Serialize for TxHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for TxHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// FinalizationRecord
// ---------------------------------------------------------------------------

/// The ledger's durable verdict on a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizationRecord {
    /// Whether execution succeeded.
    pub succeeded: bool,
    /// Computational units consumed.
    pub resource_used: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_amount_accessors() {
        let native = Transfer::Native { value: 5 };
        assert_eq!(native.amount(), 5);
        assert_eq!(native.token_contract(), None);

        let token = Transfer::Token {
            contract: Address::from_bytes([1u8; 20]),
            amount: 7,
        };
        assert_eq!(token.amount(), 7);
        assert_eq!(token.token_contract(), Some(Address::from_bytes([1u8; 20])));
        assert_eq!(token.with_amount(70).amount(), 70);

        let mint = Transfer::Mint {
            contract: Address::from_bytes([2u8; 20]),
            amount: 3,
        };
        assert_eq!(mint.token_contract(), Some(Address::from_bytes([2u8; 20])));
        assert_eq!(
            mint.with_amount(30),
            Transfer::Mint {
                contract: Address::from_bytes([2u8; 20]),
                amount: 30
            }
        );
    }

    #[test]
    fn tx_hash_string_roundtrip() {
        let hash = TxHash::from_bytes([0xab; 32]);
        let s = hash.to_string();
        assert!(s.starts_with("0x"));
        assert_eq!(s.len(), 66);
        assert_eq!(s.parse::<TxHash>().unwrap(), hash);
    }

    #[test]
    fn tx_hash_rejects_short_input() {
        assert!("0x1234".parse::<TxHash>().is_err());
    }

    #[test]
    fn transfer_json_roundtrip() {
        let transfer = Transfer::Native { value: 5 };
        let json = serde_json::to_string(&transfer).unwrap();
        assert_eq!(json, r#"{"native":{"value":5}}"#);
        assert_eq!(serde_json::from_str::<Transfer>(&json).unwrap(), transfer);
    }
}
