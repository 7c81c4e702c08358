// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Dropship — Core Library
//!
//! Dropship sends the same transfer to a list of recipients on an
//! account-based ledger and tells you, per recipient, what happened. Not
//! what probably happened. What the ledger says happened, or "unknown" when
//! it can't say.
//!
//! ## Architecture
//!
//! - **crypto** — Ed25519 credentials, addresses, hashing.
//! - **transaction** — Transaction assembly, token calldata, signing.
//! - **network** — The node interface, a JSON-RPC client, an in-process
//!   ledger, and the supervisor that keeps a connection alive.
//! - **dispatch** — Nonces, construction, broadcast, receipt tracking and
//!   the batch loop that ties them together.
//! - **cancel** — Cooperative cancellation shared by every blocking wait.
//! - **config** — Defaults and tunables.
//!
//! ## Ground Rules
//!
//! 1. Every recipient gets exactly one result, in input order.
//! 2. A nonce is never issued twice for the same account.
//! 3. A transaction that may have reached the node is never reported as
//!    failed. It is "unknown" until the ledger says otherwise.
//! 4. Anything that waits can be cancelled.

pub mod cancel;
pub mod config;
pub mod crypto;
pub mod dispatch;
pub mod network;
pub mod transaction;

pub use cancel::{CancelHandle, CancelToken};
pub use config::DispatchConfig;
pub use crypto::{Address, Credential};
pub use dispatch::{BatchDistributor, BatchEvent, BatchSummary, NonceAllocator, TransactionResult};
pub use network::{ConnectionSupervisor, HttpConnector, InMemoryLedger, MemoryConnector};
pub use transaction::Transfer;
