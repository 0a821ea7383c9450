//! Debounced validation of a changing value.
//!
//! ```text
//! on_value_change → local requirements published immediately
//!                 → (qualifies) Pending → debounce → Checking → Resolved
//! any new value, cancel() or reset() bumps the generation and fires the
//! previous CancelToken; results from an older generation are dropped.
//! Resolved(offline) → parked in the offline queue, re-checked on reconnect
//! ```
//!
//! Spawned tasks hold only a weak reference, so dropping the last handle
//! cancels whatever is pending.
//!
//! All snapshot writes happen under the state lock, so subscribers observe
//! versions in the order the triggering events were issued.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::watch;
use warden_common::{ValidationSnapshot, WardenError};

use super::requirements::{LocalReport, UserContext, evaluate_local};
use super::snapshot::{RemoteStatus, compose};
use crate::cancel::CancelToken;
use crate::client::{VerificationClient, VerificationOutcome};
use crate::fingerprint::Fingerprint;
use crate::offline::{OfflineQueue, QueueOptions};

struct State {
    value: Option<String>,
    local: Option<LocalReport>,
    generation: u64,
    version: u64,
    cancel: CancelToken,
}

/// Owns the validation snapshot for one input
pub struct ValidationOrchestrator {
    client: Arc<VerificationClient>,
    user: UserContext,
    debounce: Duration,
    /// Where offline checks wait for connectivity
    offline: Option<Arc<OfflineQueue>>,
    state: Mutex<State>,
    snapshots: watch::Sender<Arc<ValidationSnapshot>>,
}

impl ValidationOrchestrator {
    pub fn new(
        client: Arc<VerificationClient>,
        user: UserContext,
        debounce: Duration,
        offline: Option<Arc<OfflineQueue>>,
    ) -> Arc<Self> {
        let (snapshots, _) = watch::channel(Arc::new(ValidationSnapshot::fresh()));
        Arc::new(Self {
            client,
            user,
            debounce,
            offline,
            state: Mutex::new(State {
                value: None,
                local: None,
                generation: 0,
                version: 0,
                cancel: CancelToken::new(),
            }),
            snapshots,
        })
    }

    /// Latest snapshot
    pub fn snapshot(&self) -> Arc<ValidationSnapshot> {
        self.snapshots.borrow().clone()
    }

    /// Change notifications; the receiver always holds the latest snapshot
    pub fn subscribe(&self) -> watch::Receiver<Arc<ValidationSnapshot>> {
        self.snapshots.subscribe()
    }

    /// Re-evaluate for a new value. Must be called within a Tokio runtime.
    pub fn on_value_change(self: &Arc<Self>, value: impl Into<String>) {
        let value = value.into();
        let local = evaluate_local(&value, &self.user, self.client.min_length());
        let qualifies = local.all_passed();

        let (generation, cancel) = {
            let mut state = self.lock();
            let (generation, cancel) = Self::supersede(&mut state);
            state.value = Some(value.clone());
            state.local = Some(local.clone());
            let remote = if qualifies {
                RemoteStatus::Pending
            } else {
                RemoteStatus::Idle
            };
            self.publish(&mut state, &local, remote);
            (generation, cancel)
        };

        if qualifies {
            self.spawn_check(generation, cancel, value, Some(self.debounce));
        }
    }

    /// Bypass the debounce window. Returns false if the current value does
    /// not qualify for a breach check.
    pub fn recheck(self: &Arc<Self>) -> bool {
        let (generation, cancel, value) = {
            let mut state = self.lock();
            let (Some(value), Some(local)) = (state.value.clone(), state.local.clone()) else {
                return false;
            };
            if !local.all_passed() {
                return false;
            }
            let (generation, cancel) = Self::supersede(&mut state);
            (generation, cancel, value)
        };

        self.spawn_check(generation, cancel, value, None);
        true
    }

    /// Abandon any pending or in-flight check; local results stay
    pub fn cancel(&self) {
        let mut state = self.lock();
        Self::supersede(&mut state);
        if let Some(local) = state.local.clone() {
            self.publish(&mut state, &local, RemoteStatus::Idle);
        }
    }

    /// Cancel everything and return to an empty snapshot
    pub fn reset(&self) {
        let mut state = self.lock();
        Self::supersede(&mut state);
        state.value = None;
        state.local = None;
        state.version += 1;
        let mut fresh = ValidationSnapshot::fresh();
        fresh.version = state.version;
        self.snapshots.send_replace(Arc::new(fresh));
    }

    /// Fire the current token and hand out a new generation
    fn supersede(state: &mut State) -> (u64, CancelToken) {
        state.cancel.cancel();
        state.generation += 1;
        state.cancel = CancelToken::new();
        (state.generation, state.cancel.clone())
    }

    fn spawn_check(
        self: &Arc<Self>,
        generation: u64,
        cancel: CancelToken,
        value: String,
        delay: Option<Duration>,
    ) {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            if let Some(delay) = delay {
                if cancel.run(tokio::time::sleep(delay)).await.is_err() {
                    return;
                }
            }
            let Some(client) = Self::begin_check(&weak, generation) else {
                return;
            };

            let outcome = client.check(&value, &cancel).await;
            let Some(this) = weak.upgrade() else {
                return;
            };
            this.apply(generation, &value, &outcome);
            if outcome.is_offline() {
                this.defer_until_online(generation, value, cancel);
            }
        });
    }

    /// Publish `Checking` and hand back the client, unless the orchestrator
    /// is gone or `generation` was superseded.
    fn begin_check(weak: &Weak<Self>, generation: u64) -> Option<Arc<VerificationClient>> {
        let this = weak.upgrade()?;
        this.mark_checking(generation).then(|| Arc::clone(&this.client))
    }

    /// Re-run the check for `generation` after the next reconnect.
    ///
    /// Resolves as done once the orchestrator is dropped or a newer value
    /// arrived; reports `Offline` to the queue while still disconnected.
    fn defer_until_online(self: &Arc<Self>, generation: u64, value: String, cancel: CancelToken) {
        let Some(queue) = &self.offline else {
            return;
        };
        let weak = Arc::downgrade(self);
        let value = Arc::new(value);

        queue.enqueue(
            Arc::new(move || {
                let weak = weak.clone();
                let value = Arc::clone(&value);
                let cancel = cancel.clone();
                async move {
                    let Some(client) = Self::begin_check(&weak, generation) else {
                        return Ok(());
                    };
                    let outcome = client.check(&value, &cancel).await;
                    let Some(this) = weak.upgrade() else {
                        return Ok(());
                    };
                    this.apply(generation, &value, &outcome);
                    if outcome.is_offline() {
                        Err(WardenError::Offline)
                    } else {
                        Ok(())
                    }
                }
                .boxed()
            }),
            self.client.provider(),
            QueueOptions::default(),
        );
        tracing::debug!(generation = generation, "Breach check deferred until back online");
    }

    fn mark_checking(&self, generation: u64) -> bool {
        let mut state = self.lock();
        if state.generation != generation {
            return false;
        }
        let Some(local) = state.local.clone() else {
            return false;
        };
        self.publish(&mut state, &local, RemoteStatus::Checking);
        true
    }

    fn apply(&self, generation: u64, value: &str, outcome: &VerificationOutcome) {
        let mut state = self.lock();
        if state.generation != generation {
            tracing::debug!(generation = generation, "Discarding superseded breach result");
            return;
        }
        let Some(local) = state.local.clone() else {
            return;
        };
        let fingerprint = Fingerprint::of(value);
        self.publish(
            &mut state,
            &local,
            RemoteStatus::Resolved {
                outcome,
                fingerprint: fingerprint.short(),
            },
        );
    }

    fn publish(&self, state: &mut State, local: &LocalReport, remote: RemoteStatus<'_>) {
        state.version += 1;
        let snapshot = compose(state.version, local, remote);
        tracing::trace!(
            version = snapshot.version,
            hibp = ?snapshot.hibp,
            valid = snapshot.is_valid,
            "Validation snapshot updated"
        );
        self.snapshots.send_replace(Arc::new(snapshot));
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ValidationOrchestrator {
    fn drop(&mut self) {
        self.lock().cancel.cancel();
    }
}

/// One-shot evaluation without debounce: local requirements, then the
/// breach check when they all pass.
pub async fn evaluate(
    client: &VerificationClient,
    value: &str,
    user: &UserContext,
    cancel: &CancelToken,
) -> ValidationSnapshot {
    let local = evaluate_local(value, user, client.min_length());
    if !local.all_passed() {
        return compose(1, &local, RemoteStatus::Idle);
    }

    let outcome = client.check(value, cancel).await;
    let fingerprint = Fingerprint::of(value);
    compose(
        1,
        &local,
        RemoteStatus::Resolved {
            outcome: &outcome,
            fingerprint: fingerprint.short(),
        },
    )
}
