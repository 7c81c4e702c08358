//! # Network Module
//!
//! Everything between the dispatch engine and a ledger node.
//!
//! ## Architecture
//!
//! ```text
//! rpc.rs        — JSON-RPC method names and request/response types
//! node.rs       — LedgerNode and Connector traits, NodeError
//! http.rs       — reqwest-backed LedgerNode and its connector
//! memory.rs     — in-process ledger with fault injection
//! supervisor.rs — lazy dial, reconnect loop and replay on connection loss
//! ```
//!
//! ## Design Decisions
//!
//! - The engine only ever sees `Arc<dyn LedgerNode>`. Swapping the HTTP
//!   client for the in-memory ledger changes nothing above this module.
//! - Only [`NodeError::Connectivity`] triggers a reconnect. A node that
//!   answers with an error is healthy; retrying would just repeat the error.

pub mod http;
pub mod memory;
pub mod node;
pub mod rpc;
pub mod supervisor;

pub use http::{HttpConnector, HttpLedgerNode};
pub use memory::{InMemoryLedger, MemoryConnector};
pub use node::{Connector, LedgerNode, NodeError, NodeHandle};
pub use rpc::{RpcError, RpcMethod, RpcRequest, RpcResponse};
pub use supervisor::{ConnectionSupervisor, SupervisorError};
