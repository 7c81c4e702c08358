//! Account addresses.
//!
//! An address is the last 20 bytes of `BLAKE3(public_key)`, written as
//! `0x` followed by 40 hex characters. Parsing is case-insensitive and
//! tolerates surrounding whitespace; display is always lowercase, so two
//! spellings of the same account compare equal once parsed.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use super::hash::blake3_hash;
use crate::config::ADDRESS_LENGTH;

/// Reasons an address string was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("address must start with 0x: {0:?}")]
    MissingPrefix(String),

    #[error("address must be {expected} hex characters after 0x, got {got}")]
    WrongLength { expected: usize, got: usize },

    #[error("address contains non-hex characters: {0:?}")]
    InvalidHex(String),
}

/// A 20-byte ledger account address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; ADDRESS_LENGTH]);

impl Address {
    /// The all-zero address. Never a valid transfer target.
    pub const ZERO: Address = Address([0u8; ADDRESS_LENGTH]);

    pub fn from_bytes(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Derives the account address owned by an Ed25519 public key.
    pub fn from_public_key(public_key: &[u8; 32]) -> Self {
        let digest = blake3_hash(public_key);
        let mut bytes = [0u8; ADDRESS_LENGTH];
        bytes.copy_from_slice(&digest[32 - ADDRESS_LENGTH..]);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LENGTH] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; ADDRESS_LENGTH]
    }

    /// Left-pads the address to a 32-byte word, the layout contract
    /// calldata expects.
    pub fn to_word(&self) -> [u8; 32] {
        let mut word = [0u8; 32];
        word[32 - ADDRESS_LENGTH..].copy_from_slice(&self.0);
        word
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let hex_part = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or_else(|| AddressError::MissingPrefix(trimmed.to_string()))?;

        if hex_part.len() != ADDRESS_LENGTH * 2 {
            return Err(AddressError::WrongLength {
                expected: ADDRESS_LENGTH * 2,
                got: hex_part.len(),
            });
        }

        let mut bytes = [0u8; ADDRESS_LENGTH];
        hex::decode_to_slice(hex_part, &mut bytes)
            .map_err(|_| AddressError::InvalidHex(trimmed.to_string()))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_string())
        } else {
            serializer.serialize_bytes(&self.0)
        }
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            s.parse().map_err(serde::de::Error::custom)
        } else {
            let bytes = <Vec<u8>>::deserialize(deserializer)?;
            let arr: [u8; ADDRESS_LENGTH] = bytes.as_slice().try_into().map_err(|_| {
                serde::de::Error::invalid_length(bytes.len(), &"20 address bytes")
            })?;
            Ok(Self(arr))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

    #[test]
    fn parse_and_display_roundtrip() {
        let addr: Address = SAMPLE.parse().unwrap();
        assert_eq!(addr.to_string(), SAMPLE);
    }

    #[test]
    fn parsing_is_case_insensitive() {
        let lower: Address = SAMPLE.parse().unwrap();
        let upper: Address = "0XAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA".parse().unwrap();
        assert_eq!(lower, upper);
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        let addr: Address = format!("  {}\r", SAMPLE).parse().unwrap();
        assert_eq!(addr.to_string(), SAMPLE);
    }

    #[test]
    fn missing_prefix_rejected() {
        let err = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa".parse::<Address>().unwrap_err();
        assert!(matches!(err, AddressError::MissingPrefix(_)));
    }

    #[test]
    fn wrong_length_rejected() {
        let err = "0xabcd".parse::<Address>().unwrap_err();
        assert_eq!(err, AddressError::WrongLength { expected: 40, got: 4 });
    }

    #[test]
    fn non_hex_rejected() {
        let err = "0xzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzz".parse::<Address>().unwrap_err();
        assert!(matches!(err, AddressError::InvalidHex(_)));
    }

    #[test]
    fn derivation_is_deterministic_and_key_specific() {
        let a = Address::from_public_key(&[1u8; 32]);
        let b = Address::from_public_key(&[1u8; 32]);
        let c = Address::from_public_key(&[2u8; 32]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(!a.is_zero());
    }

    #[test]
    fn word_is_left_padded() {
        let addr: Address = SAMPLE.parse().unwrap();
        let word = addr.to_word();
        assert!(word[..12].iter().all(|b| *b == 0));
        assert!(word[12..].iter().all(|b| *b == 0xaa));
    }

    #[test]
    fn json_uses_hex_string() {
        let addr: Address = SAMPLE.parse().unwrap();
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, format!("\"{}\"", SAMPLE));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }
}
