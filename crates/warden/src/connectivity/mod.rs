//! Connectivity tracking.
//!
//! Maintains a single `online` flag fed by a platform signal (the background
//! [`probe`] worker in production, direct calls in tests). Listeners are only
//! notified on an actual state change, so a flickering signal that keeps
//! reporting the same value produces no fan-out.

mod probe;

pub use probe::{ProbeConfig, connectivity_probe_worker};

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::watch;
use warden_common::WardenError;

use crate::cancel::CancelToken;

type Listener = Arc<dyn Fn(bool) + Send + Sync>;

/// Online/offline state with change fan-out
pub struct ConnectivityMonitor {
    state: watch::Sender<bool>,
    listeners: Mutex<BTreeMap<u64, Listener>>,
    next_listener_id: AtomicU64,
    transitions: AtomicU64,
}

impl ConnectivityMonitor {
    pub fn new(initially_online: bool) -> Arc<Self> {
        let (state, _) = watch::channel(initially_online);
        Arc::new(Self {
            state,
            listeners: Mutex::new(BTreeMap::new()),
            next_listener_id: AtomicU64::new(0),
            transitions: AtomicU64::new(0),
        })
    }

    pub fn is_online(&self) -> bool {
        *self.state.borrow()
    }

    /// Number of observed state changes
    pub fn transitions(&self) -> u64 {
        self.transitions.load(Ordering::Relaxed)
    }

    /// Feed one platform signal. Returns true if the state changed.
    pub fn report(&self, online: bool) -> bool {
        let changed = self.state.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });

        if changed {
            self.transitions.fetch_add(1, Ordering::Relaxed);
            if online {
                tracing::info!("Connectivity restored");
            } else {
                tracing::warn!("Connectivity lost");
            }

            // Snapshot so listeners can (un)subscribe from inside the callback.
            let listeners: Vec<Listener> = self.lock_listeners().values().cloned().collect();
            for listener in listeners {
                listener(online);
            }
        }

        changed
    }

    /// Register a change listener. Dropping the handle unsubscribes.
    pub fn subscribe<F>(self: &Arc<Self>, listener: F) -> Subscription
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.lock_listeners().insert(id, Arc::new(listener));
        Subscription {
            id,
            monitor: Arc::downgrade(self),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.lock_listeners().len()
    }

    /// Suspend until online, failing with `Timeout` after `timeout` or
    /// `Cancelled` if the token fires first.
    pub async fn wait_for_online(
        &self,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<(), WardenError> {
        let mut rx = self.state.subscribe();
        let wait = async {
            // The sender is owned by `self`, which outlives this future.
            let _ = rx.wait_for(|online| *online).await;
        };

        match cancel.run(tokio::time::timeout(timeout, wait)).await? {
            Ok(()) => Ok(()),
            Err(_) => Err(WardenError::Timeout(format!(
                "still offline after {}ms",
                timeout.as_millis()
            ))),
        }
    }

    fn lock_listeners(&self) -> std::sync::MutexGuard<'_, BTreeMap<u64, Listener>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Listener registration handle
#[must_use = "dropping a Subscription unsubscribes the listener"]
pub struct Subscription {
    id: u64,
    monitor: Weak<ConnectivityMonitor>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(monitor) = self.monitor.upgrade() {
            monitor.lock_listeners().remove(&self.id);
        }
    }
}
