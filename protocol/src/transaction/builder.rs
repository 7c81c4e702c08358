//! Transaction construction via the builder pattern.
//!
//! The [`TransactionBuilder`] assembles an unsigned [`Transaction`] from a
//! nonce, a fee price and a [`Transfer`]. It does not sign and it does not
//! talk to the node; [`TransactionFactory`](crate::dispatch::TransactionFactory)
//! gathers the inputs and [`super::signing`] produces the signature. That
//! separation keeps construction testable without key material or a ledger.

use serde::{Deserialize, Serialize};

use super::call::{encode_token_call, TokenCall};
use super::types::Transfer;
use crate::config::{DEFAULT_FEE_BUDGET, TRANSACTION_VERSION};
use crate::crypto::Address;

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

/// An unsigned ledger transaction.
///
/// # Canonical Byte Format
///
/// [`Transaction::signable_bytes`] serializes, in order: version, chain id,
/// nonce, target, value, fee budget, fee unit price, and the payload
/// (length-prefixed). Fixed-width little-endian integers, no serde, so the
/// signed bytes cannot drift with a serialization library upgrade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Encoding version, lets nodes pick the right verification rules.
    pub version: u16,

    /// Ledger identifier. Binding it into the signature stops a transaction
    /// from being replayed on another network.
    pub chain_id: u64,

    /// Per-sender sequence number.
    pub nonce: u64,

    /// Call target: the recipient for native transfers, the token contract
    /// for token transfers and mints.
    pub to: Address,

    /// Native value moved with the call.
    pub value: u128,

    /// Maximum computational units the sender authorizes.
    pub fee_budget: u64,

    /// Price per computational unit, as suggested by the node.
    pub fee_unit_price: u128,

    /// Contract calldata, `None` for plain transfers.
    pub payload: Option<Vec<u8>>,
}

impl Transaction {
    /// Returns the canonical byte representation used for signing.
    pub fn signable_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(128);

        buf.extend_from_slice(&self.version.to_le_bytes());
        buf.extend_from_slice(&self.chain_id.to_le_bytes());
        buf.extend_from_slice(&self.nonce.to_le_bytes());
        buf.extend_from_slice(self.to.as_bytes());
        buf.extend_from_slice(&self.value.to_le_bytes());
        buf.extend_from_slice(&self.fee_budget.to_le_bytes());
        buf.extend_from_slice(&self.fee_unit_price.to_le_bytes());

        if let Some(ref payload) = self.payload {
            buf.push(0x01);
            buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
            buf.extend_from_slice(payload);
        } else {
            buf.push(0x00);
        }

        buf
    }

    /// Returns `true` if the transaction calls a contract.
    pub fn is_contract_call(&self) -> bool {
        self.payload.is_some()
    }
}

// ---------------------------------------------------------------------------
// TransactionBuilder
// ---------------------------------------------------------------------------

/// Fluent builder for unsigned [`Transaction`]s.
///
/// ```rust
/// use dropship_protocol::crypto::Address;
/// use dropship_protocol::transaction::{Transfer, TransactionBuilder};
///
/// let recipient: Address = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb".parse().unwrap();
/// let tx = TransactionBuilder::new(recipient, Transfer::Native { value: 5 })
///     .chain_id(7)
///     .nonce(3)
///     .fee_unit_price(20)
///     .build();
/// assert_eq!(tx.to, recipient);
/// ```
pub struct TransactionBuilder {
    recipient: Address,
    transfer: Transfer,
    chain_id: u64,
    nonce: u64,
    fee_budget: u64,
    fee_unit_price: u128,
}

impl TransactionBuilder {
    /// Starts a transaction delivering `transfer` to `recipient`.
    ///
    /// Defaults: chain id 0, nonce 0, fee price 0, fee budget
    /// [`DEFAULT_FEE_BUDGET`].
    pub fn new(recipient: Address, transfer: Transfer) -> Self {
        Self {
            recipient,
            transfer,
            chain_id: 0,
            nonce: 0,
            fee_budget: DEFAULT_FEE_BUDGET,
            fee_unit_price: 0,
        }
    }

    pub fn chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = chain_id;
        self
    }

    pub fn nonce(mut self, nonce: u64) -> Self {
        self.nonce = nonce;
        self
    }

    pub fn fee_budget(mut self, fee_budget: u64) -> Self {
        self.fee_budget = fee_budget;
        self
    }

    pub fn fee_unit_price(mut self, price: u128) -> Self {
        self.fee_unit_price = price;
        self
    }

    /// Consumes the builder. Token transfers and mints become a zero-value
    /// call to the contract carrying `transfer(recipient, amount)` or
    /// `addToken(recipient, amount)` calldata.
    pub fn build(self) -> Transaction {
        let (to, value, payload) = match self.transfer {
            Transfer::Native { value } => (self.recipient, value, None),
            Transfer::Token { contract, amount } => (
                contract,
                0,
                Some(encode_token_call(TokenCall::Transfer, &self.recipient, amount)),
            ),
            Transfer::Mint { contract, amount } => (
                contract,
                0,
                Some(encode_token_call(TokenCall::Mint, &self.recipient, amount)),
            ),
        };

        Transaction {
            version: TRANSACTION_VERSION,
            chain_id: self.chain_id,
            nonce: self.nonce,
            to,
            value,
            fee_budget: self.fee_budget,
            fee_unit_price: self.fee_unit_price,
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::call::decode_token_call;

    fn bob() -> Address {
        Address::from_bytes([0xbb; 20])
    }

    fn token() -> Address {
        Address::from_bytes([0x70; 20])
    }

    fn sample(nonce: u64) -> Transaction {
        TransactionBuilder::new(bob(), Transfer::Native { value: 5 })
            .chain_id(1)
            .nonce(nonce)
            .fee_unit_price(10)
            .build()
    }

    #[test]
    fn native_transfer_targets_recipient() {
        let tx = sample(0);
        assert_eq!(tx.to, bob());
        assert_eq!(tx.value, 5);
        assert!(!tx.is_contract_call());
        assert_eq!(tx.fee_budget, DEFAULT_FEE_BUDGET);
    }

    #[test]
    fn token_transfer_calls_contract() {
        let tx = TransactionBuilder::new(bob(), Transfer::Token { contract: token(), amount: 9 })
            .build();
        assert_eq!(tx.to, token());
        assert_eq!(tx.value, 0);
        let payload = tx.payload.as_deref().unwrap();
        assert_eq!(
            decode_token_call(payload),
            Some((TokenCall::Transfer, bob(), 9))
        );
    }

    #[test]
    fn mint_calls_contract_with_add_token() {
        let tx = TransactionBuilder::new(bob(), Transfer::Mint { contract: token(), amount: 4 })
            .build();
        assert_eq!(tx.to, token());
        assert_eq!(tx.value, 0);
        assert!(tx.is_contract_call());
        let payload = tx.payload.as_deref().unwrap();
        assert_eq!(decode_token_call(payload), Some((TokenCall::Mint, bob(), 4)));
    }

    #[test]
    fn signable_bytes_are_deterministic() {
        assert_eq!(sample(1).signable_bytes(), sample(1).signable_bytes());
    }

    #[test]
    fn nonce_changes_signable_bytes() {
        assert_ne!(sample(1).signable_bytes(), sample(2).signable_bytes());
    }

    #[test]
    fn chain_id_changes_signable_bytes() {
        let a = sample(1);
        let mut b = sample(1);
        b.chain_id = 2;
        assert_ne!(a.signable_bytes(), b.signable_bytes());
    }

    #[test]
    fn payload_presence_changes_signable_bytes() {
        let mut with_payload = sample(1);
        with_payload.payload = Some(Vec::new());
        assert_ne!(sample(1).signable_bytes(), with_payload.signable_bytes());
    }

    #[test]
    fn fee_parameters_are_carried() {
        let tx = TransactionBuilder::new(bob(), Transfer::Native { value: 1 })
            .fee_budget(21_000)
            .fee_unit_price(3)
            .build();
        assert_eq!(tx.fee_budget, 21_000);
        assert_eq!(tx.fee_unit_price, 3);
    }
}
