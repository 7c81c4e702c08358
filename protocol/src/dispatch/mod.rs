//! # Dispatch
//!
//! Everything between "send X to these recipients" and a per-recipient
//! verdict.
//!
//! ```text
//! BatchDistributor
//!   └─ per recipient:
//!        TransactionFactory ─► Broadcaster ─► ReceiptTracker
//!          (NonceAllocator)
//! ```
//!
//! All node traffic goes through one shared
//! [`ConnectionSupervisor`](crate::network::ConnectionSupervisor).

pub mod broadcaster;
pub mod distributor;
pub mod error;
pub mod factory;
pub mod nonce;
pub mod receipt;
pub mod result;

pub use broadcaster::{Broadcaster, TransactionRecord};
pub use distributor::{BatchDistributor, BatchHandle};
pub use error::DispatchError;
pub use factory::TransactionFactory;
pub use nonce::NonceAllocator;
pub use receipt::{ReceiptOutcome, ReceiptTracker};
pub use result::{BatchEvent, BatchStatus, BatchSummary, Outcome, Stage, TransactionResult};
