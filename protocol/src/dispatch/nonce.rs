//! Sequence-number allocation.
//!
//! The node's pending nonce alone is not enough when transactions are
//! issued faster than the node indexes them: two back-to-back queries can
//! return the same value. The allocator remembers the last nonce it handed
//! out per account and never issues anything at or below it.
//!
//! One `tokio::sync::Mutex` covers the whole map and is held across the
//! node query, so callers are served strictly one after another.

use std::collections::HashMap;

use tokio::sync::Mutex;
use tracing::debug;

use super::error::DispatchError;
use crate::cancel::CancelToken;
use crate::crypto::Address;
use crate::network::ConnectionSupervisor;

/// Issues strictly increasing nonces per account.
#[derive(Debug, Default)]
pub struct NonceAllocator {
    issued: Mutex<HashMap<Address, u64>>,
}

impl NonceAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next nonce for `account`.
    ///
    /// `max(queried, last_issued + 1)`, or the queried value for an account
    /// seen for the first time. A failed query leaves the state untouched.
    pub async fn next_nonce(
        &self,
        supervisor: &ConnectionSupervisor,
        account: &Address,
        cancel: &CancelToken,
    ) -> Result<u64, DispatchError> {
        let mut issued = self.issued.lock().await;

        let queried = supervisor
            .call(cancel, move |node| async move {
                node.pending_sequence_number(account).await
            })
            .await
            .map_err(|e| DispatchError::from_supervisor(e, DispatchError::Sequencing))?;

        let nonce = match issued.get(account) {
            Some(&last) => {
                let floor = last.checked_add(1).ok_or_else(|| {
                    DispatchError::Sequencing(format!("nonce space exhausted for {}", account))
                })?;
                queried.max(floor)
            }
            None => queried,
        };
        if nonce != queried {
            debug!(%account, queried, nonce, "node nonce behind local view, bumped");
        }

        issued.insert(*account, nonce);
        Ok(nonce)
    }

    /// Last nonce handed out for `account`, if any.
    pub async fn last_issued(&self, account: &Address) -> Option<u64> {
        self.issued.lock().await.get(account).copied()
    }
}
