//! # Outbound Transactions
//!
//! Everything needed to turn "send X to Y" into bytes the node accepts:
//!
//! - [`types`]: transfer descriptions, transaction hashes, finalization records.
//! - [`call`]: token contract calldata (`transfer` and `addToken`).
//! - [`builder`]: the unsigned [`Transaction`] and its canonical byte form.
//! - [`signing`]: signatures, hashes and the raw wire encoding.

pub mod builder;
pub mod call;
pub mod signing;
pub mod types;

pub use builder::{Transaction, TransactionBuilder};
pub use call::{decode_token_call, encode_token_call, TokenCall};
pub use signing::{sign_transaction, RawTransactionError, SignedTransaction};
pub use types::{FinalizationRecord, Transfer, TxHash};
