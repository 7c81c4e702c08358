//! Transaction signing and the raw wire encoding.
//!
//! Signing is a separate step from building so construction can be tested
//! without key material. The signed data is [`Transaction::signable_bytes`];
//! the hash the node reports back is SHA-256 over those bytes followed by the
//! signature, so any change to either yields a different hash.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::builder::Transaction;
use super::types::TxHash;
use crate::crypto::{sha256_multi, Address, Credential, PublicKey, Signature};

/// Errors decoding a raw transaction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RawTransactionError {
    #[error("raw transaction is not valid hex: {0}")]
    Hex(String),

    #[error("raw transaction is malformed: {0}")]
    Encoding(String),
}

/// A transaction together with the key and signature that authorize it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub transaction: Transaction,
    pub sender_public_key: PublicKey,
    pub signature: Signature,
}

/// Signs `tx` with `credential`.
pub fn sign_transaction(tx: Transaction, credential: &Credential) -> SignedTransaction {
    let signature = credential.sign(&tx.signable_bytes());
    SignedTransaction {
        transaction: tx,
        sender_public_key: credential.public_key(),
        signature,
    }
}

impl SignedTransaction {
    /// Identifier of this transaction on the ledger.
    pub fn hash(&self) -> TxHash {
        let signable = self.transaction.signable_bytes();
        TxHash::from_bytes(sha256_multi(&[&signable, self.signature.as_bytes()]))
    }

    /// The account that pays for and sends this transaction.
    pub fn sender(&self) -> Address {
        self.sender_public_key.address()
    }

    /// Checks the signature against the embedded public key.
    pub fn verify(&self) -> bool {
        self.sender_public_key
            .verify(&self.transaction.signable_bytes(), &self.signature)
    }

    /// `0x`-prefixed hex of the bincode encoding, the form the node accepts.
    pub fn to_raw(&self) -> Result<String, RawTransactionError> {
        let bytes =
            bincode::serialize(self).map_err(|e| RawTransactionError::Encoding(e.to_string()))?;
        Ok(format!("0x{}", hex::encode(bytes)))
    }

    /// Inverse of [`to_raw`](Self::to_raw).
    pub fn from_raw(raw: &str) -> Result<Self, RawTransactionError> {
        let body = raw.trim().trim_start_matches("0x");
        let bytes = hex::decode(body).map_err(|e| RawTransactionError::Hex(e.to_string()))?;
        bincode::deserialize(&bytes).map_err(|e| RawTransactionError::Encoding(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
