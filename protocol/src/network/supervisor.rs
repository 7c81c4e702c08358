//! # Connection Supervisor
//!
//! Owns the link to one ledger node endpoint and keeps it usable.
//!
//! - The first [`acquire`](ConnectionSupervisor::acquire) dials lazily.
//!   Failed dials are retried every `reconnect_interval`, forever unless
//!   `max_reconnect_attempts` is set.
//! - [`call`](ConnectionSupervisor::call) runs an operation against the
//!   current handle. A [`NodeError::Connectivity`] drops the handle, waits,
//!   re-dials and replays the operation; every other error is handed back
//!   untouched.
//! - At most one dial is in flight: concurrent callers queue on the same
//!   `tokio::sync::Mutex` and share the handle the winner produced.
//!
//! Every wait races against a [`CancelToken`].

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use reqwest::Url;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::node::{Connector, NodeError, NodeHandle};
use crate::cancel::CancelToken;
use crate::config::SupervisorConfig;

/// Why the supervisor could not produce a result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SupervisorError {
    #[error("cancelled while waiting for the node")]
    Cancelled,

    #[error("node unreachable after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: NodeError },

    #[error("invalid node endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    /// The node answered, with an error that reconnecting would not fix.
    #[error(transparent)]
    Node(NodeError),
}

/// Keeps one endpoint connected.
pub struct ConnectionSupervisor {
    endpoint: Url,
    connector: Arc<dyn Connector>,
    config: SupervisorConfig,
    current: Mutex<Option<NodeHandle>>,
    reconnects: AtomicU64,
}

impl ConnectionSupervisor {
    /// Validates `endpoint` without dialing it.
    pub fn new(
        endpoint: &str,
        connector: Arc<dyn Connector>,
        config: SupervisorConfig,
    ) -> Result<Self, SupervisorError> {
        let invalid = |reason: String| SupervisorError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason,
        };
        let url = Url::parse(endpoint.trim()).map_err(|e| invalid(e.to_string()))?;
        connector.validate(&url).map_err(invalid)?;

        Ok(Self {
            endpoint: url,
            connector,
            config,
            current: Mutex::new(None),
            reconnects: AtomicU64::new(0),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Number of times an established connection was dropped and replaced.
    pub fn reconnect_count(&self) -> u64 {
        self.reconnects.load(Ordering::Relaxed)
    }

    pub async fn is_connected(&self) -> bool {
        self.current.lock().await.is_some()
    }

    /// Returns the current handle, dialing first if there is none.
    pub async fn acquire(&self, cancel: &CancelToken) -> Result<NodeHandle, SupervisorError> {
        let mut current = self.current.lock().await;
        if let Some(node) = current.as_ref() {
            return Ok(node.clone());
        }

        let mut attempts: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(SupervisorError::Cancelled);
            }

            attempts += 1;
            match self.connector.connect(&self.endpoint).await {
                Ok(node) => {
                    info!(endpoint = %self.endpoint, attempts, "connected to node");
                    *current = Some(node.clone());
                    return Ok(node);
                }
                Err(e) => {
                    warn!(
                        endpoint = %self.endpoint,
                        attempt = attempts,
                        error = %e,
                        "failed to connect to node, retrying"
                    );
                    if self
                        .config
                        .max_reconnect_attempts
                        .is_some_and(|max| attempts >= max)
                    {
                        return Err(SupervisorError::RetriesExhausted {
                            attempts,
                            last_error: e,
                        });
                    }
                }
            }

            self.wait(cancel).await?;
        }
    }

    /// Drops `stale` if it is still the current handle. A handle some other
    /// caller already replaced is left alone.
    pub async fn invalidate(&self, stale: &NodeHandle) {
        let mut current = self.current.lock().await;
        let is_current = current
            .as_ref()
            .is_some_and(|node| same_handle(node, stale));
        if is_current {
            *current = None;
            self.reconnects.fetch_add(1, Ordering::Relaxed);
            debug!(endpoint = %self.endpoint, "dropped broken node connection");
        }
    }

    /// Runs `op` against the node, reconnecting and replaying it after
    /// connectivity failures.
    ///
    /// `op` may run more than once, so it must be safe to repeat. Queries
    /// are; a broadcast is, because resubmitting an identical signed
    /// transaction yields the same hash.
    pub async fn call<T, F, Fut>(&self, cancel: &CancelToken, mut op: F) -> Result<T, SupervisorError>
    where
        F: FnMut(NodeHandle) -> Fut,
        Fut: Future<Output = Result<T, NodeError>>,
    {
        let mut failures: u32 = 0;
        loop {
            let node = self.acquire(cancel).await?;
            match op(node.clone()).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_connectivity() => {
                    failures += 1;
                    warn!(
                        endpoint = %self.endpoint,
                        failures,
                        error = %e,
                        "node connection lost, reconnecting"
                    );
                    self.invalidate(&node).await;
                    if self
                        .config
                        .max_reconnect_attempts
                        .is_some_and(|max| failures >= max)
                    {
                        return Err(SupervisorError::RetriesExhausted {
                            attempts: failures,
                            last_error: e,
                        });
                    }
                    self.wait(cancel).await?;
                }
                Err(e) => return Err(SupervisorError::Node(e)),
            }
        }
    }

    async fn wait(&self, cancel: &CancelToken) -> Result<(), SupervisorError> {
        tokio::select! {
            _ = tokio::time::sleep(self.config.reconnect_interval) => Ok(()),
            _ = cancel.cancelled() => Err(SupervisorError::Cancelled),
        }
    }
}

impl std::fmt::Debug for ConnectionSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSupervisor")
            .field("endpoint", &self.endpoint.as_str())
            .field("config", &self.config)
            .field("reconnects", &self.reconnect_count())
            .finish()
    }
}

fn same_handle(a: &NodeHandle, b: &NodeHandle) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}
