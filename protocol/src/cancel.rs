//! Cooperative cancellation.
//!
//! A [`CancelHandle`] flips a `tokio::sync::watch` flag; every
//! [`CancelToken`] subscribed to it observes the flip. Long waits (reconnect
//! back-off, receipt polling, the gap between two recipients) race against
//! [`CancelToken::cancelled`] in a `tokio::select!`.
//!
//! Dropping the handle without calling [`CancelHandle::cancel`] does not
//! cancel anything.

use std::sync::Arc;

use tokio::sync::watch;

/// The triggering side. Cheap to clone.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

/// The observing side. Cheap to clone.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// A new token observing this handle.
    pub fn token(&self) -> CancelToken {
        CancelToken {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    /// A token that is never cancelled.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested. Never resolves if the handle
    /// is dropped first.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn token_observes_cancel() {
        let handle = CancelHandle::new();
        let token = handle.token();
        assert!(!token.is_cancelled());
        handle.cancel();
        assert!(token.is_cancelled());
        assert!(handle.is_cancelled());
    }

    #[test]
    fn tokens_created_after_cancel_are_cancelled() {
        let handle = CancelHandle::new();
        handle.cancel();
        assert!(handle.token().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_resolves_on_cancel() {
        let handle = CancelHandle::new();
        let token = handle.token();
        let waiter = tokio::spawn(async move { token.cancelled().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.cancel();
        waiter.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn never_token_stays_pending() {
        let token = CancelToken::never();
        let res = tokio::time::timeout(Duration::from_secs(60), token.cancelled()).await;
        assert!(res.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_handle_does_not_cancel() {
        let handle = CancelHandle::new();
        let token = handle.token();
        drop(handle);
        assert!(!token.is_cancelled());
        let res = tokio::time::timeout(Duration::from_secs(5), token.cancelled()).await;
        assert!(res.is_err());
    }
}
