//! Cooperative cancellation.
//!
//! A `CancelToken` is a shared flag backed by a watch channel. Suspension points
//! (debounce timer, retry backoff, connectivity wait) race against
//! [`CancelToken::cancelled`]; synchronous code polls [`CancelToken::is_cancelled`].
//! A future raced through [`CancelToken::run`] is dropped when the token fires,
//! so an in-flight call is abandoned and its late result never observed.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;
use warden_common::WardenError;

/// Shared, clonable cancellation flag
#[derive(Clone, Debug)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Mark the token cancelled. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_if_modified(|cancelled| {
            if *cancelled {
                false
            } else {
                *cancelled = true;
                true
            }
        });
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the token is cancelled
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this only returns on cancel.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    /// Fail with `Cancelled` if the token has fired
    pub fn check(&self) -> Result<(), WardenError> {
        if self.is_cancelled() {
            Err(WardenError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Run `fut` unless the token fires first
    pub async fn run<F, T>(&self, fut: F) -> Result<T, WardenError>
    where
        F: Future<Output = T>,
    {
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(WardenError::Cancelled),
            out = fut => Ok(out),
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
