//! Offline replay queue.
//!
//! Operations that need the network are parked here while offline and
//! replayed in FIFO order when connectivity returns. Every online transition
//! bumps an epoch; an item runs at most once per epoch, so a failure during a
//! drain waits for the next transition instead of spinning.
//!
//! ```text
//! enqueue (offline) → eligible at epoch + 1
//! enqueue (online)  → eligible now, drain kicked
//! online transition → epoch += 1, drain
//! drain: Ok → done; retryable Err with attempts left → tail, epoch + 1; else dropped
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::BoxFuture;
use tokio::runtime::Handle;
use tokio::time::Instant;
use warden_common::WardenError;

use crate::config::OfflineConfig;
use crate::connectivity::{ConnectivityMonitor, Subscription};
use crate::resilience::RetryPolicy;

/// A replayable unit of work. Called once per attempt.
pub type QueuedOperation = Arc<dyn Fn() -> BoxFuture<'static, Result<(), WardenError>> + Send + Sync>;

/// Identifies a queued operation
pub type QueueId = u64;

/// Per-item replay settings
#[derive(Debug, Clone, Default)]
pub struct QueueOptions {
    /// Overrides the queue's attempt budget and retryability predicate
    pub retry: Option<RetryPolicy>,
}

struct QueuedItem {
    id: QueueId,
    op: QueuedOperation,
    provider: String,
    attempts: u32,
    retry: Option<RetryPolicy>,
    eligible_epoch: u64,
    enqueued_at: Instant,
}

/// Totals from one drain call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub completed: usize,
    pub requeued: usize,
    pub dropped: usize,
}

/// FIFO queue of operations awaiting connectivity
pub struct OfflineQueue {
    items: Mutex<VecDeque<QueuedItem>>,
    monitor: Arc<ConnectivityMonitor>,
    max_attempts: u32,
    epoch: AtomicU64,
    next_id: AtomicU64,
    draining: AtomicBool,
    rerun: AtomicBool,
}

impl OfflineQueue {
    pub fn new(config: &OfflineConfig, monitor: Arc<ConnectivityMonitor>) -> Arc<Self> {
        Arc::new(Self {
            items: Mutex::new(VecDeque::new()),
            monitor,
            max_attempts: config.max_attempts.max(1),
            epoch: AtomicU64::new(0),
            next_id: AtomicU64::new(1),
            draining: AtomicBool::new(false),
            rerun: AtomicBool::new(false),
        })
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drain on every online transition until the subscription is dropped.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn attach(self: &Arc<Self>) -> Subscription {
        let queue = Arc::downgrade(self);
        let handle = Handle::current();
        self.monitor.subscribe(move |online| {
            if !online {
                return;
            }
            let Some(queue) = queue.upgrade() else {
                return;
            };
            queue.epoch.fetch_add(1, Ordering::AcqRel);
            tracing::info!(pending = queue.len(), "Back online, replaying queued operations");
            handle.spawn(async move {
                queue.drain().await;
            });
        })
    }

    /// Park `op` until it can run. Runs promptly if already online.
    pub fn enqueue(
        self: &Arc<Self>,
        op: QueuedOperation,
        provider: &str,
        options: QueueOptions,
    ) -> QueueId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let online = self.monitor.is_online();
        let epoch = self.epoch.load(Ordering::Acquire);

        self.lock().push_back(QueuedItem {
            id,
            op,
            provider: provider.to_string(),
            attempts: 0,
            retry: options.retry,
            eligible_epoch: if online { epoch } else { epoch + 1 },
            enqueued_at: Instant::now(),
        });
        tracing::debug!(id = id, provider = %provider, online = online, "Operation queued");

        if online {
            if let Ok(handle) = Handle::try_current() {
                let queue = Arc::clone(self);
                handle.spawn(async move {
                    queue.drain().await;
                });
            }
        }
        id
    }

    /// Run every currently eligible item once, in FIFO order.
    ///
    /// A drain requested while another is running folds into that one as a
    /// follow-up pass.
    pub async fn drain(&self) -> DrainReport {
        let mut report = DrainReport::default();

        loop {
            if self.draining.swap(true, Ordering::AcqRel) {
                self.rerun.store(true, Ordering::Release);
                return report;
            }

            loop {
                self.rerun.store(false, Ordering::Release);
                self.drain_pass(&mut report).await;
                if !self.rerun.swap(false, Ordering::AcqRel) {
                    break;
                }
            }

            self.draining.store(false, Ordering::Release);
            // A request may have landed between the last check and the release.
            if !self.rerun.load(Ordering::Acquire) {
                break;
            }
        }

        if report != DrainReport::default() {
            tracing::info!(
                completed = report.completed,
                requeued = report.requeued,
                dropped = report.dropped,
                "Offline queue drained"
            );
        }
        report
    }

    async fn drain_pass(&self, report: &mut DrainReport) {
        let epoch = self.epoch.load(Ordering::Acquire);
        let batch: Vec<QueuedItem> = {
            let mut items = self.lock();
            let (ready, waiting): (VecDeque<_>, VecDeque<_>) =
                items.drain(..).partition(|item| item.eligible_epoch <= epoch);
            *items = waiting;
            ready.into()
        };

        for mut item in batch {
            item.attempts += 1;
            let error = match (item.op)().await {
                Ok(()) => {
                    report.completed += 1;
                    tracing::debug!(
                        id = item.id,
                        provider = %item.provider,
                        attempts = item.attempts,
                        queued_for = ?item.enqueued_at.elapsed(),
                        "Queued operation completed"
                    );
                    continue;
                }
                Err(e) => e,
            };

            let (max_attempts, retryable) = match &item.retry {
                Some(policy) => (policy.max_attempts(), policy.is_retryable(&error)),
                None => (self.max_attempts, error.is_retryable()),
            };

            if retryable && item.attempts < max_attempts {
                tracing::debug!(
                    id = item.id,
                    attempts = item.attempts,
                    error = %error,
                    "Queued operation failed, waiting for next reconnect"
                );
                item.eligible_epoch = epoch + 1;
                self.lock().push_back(item);
                report.requeued += 1;
            } else {
                tracing::error!(
                    id = item.id,
                    provider = %item.provider,
                    attempts = item.attempts,
                    error = %error,
                    "Dropping queued operation"
                );
                report.dropped += 1;
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<QueuedItem>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    fn queue(online: bool) -> (Arc<OfflineQueue>, Arc<ConnectivityMonitor>) {
        let monitor = ConnectivityMonitor::new(online);
        (OfflineQueue::new(&OfflineConfig::default(), monitor.clone()), monitor)
    }

    fn recording(log: &Arc<Mutex<Vec<u32>>>, tag: u32) -> QueuedOperation {
        let log = log.clone();
        Arc::new(move || {
            let log = log.clone();
            async move {
                log.lock().unwrap().push(tag);
                Ok(())
            }
            .boxed()
        })
    }

    fn failing(calls: &Arc<AtomicU32>, error: WardenError) -> QueuedOperation {
        let calls = calls.clone();
        Arc::new(move || {
            calls.fetch_add(1, Ordering::SeqCst);
            let error = error.clone();
            async move { Err(error) }.boxed()
        })
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_replays_in_fifo_order_on_reconnect() {
        let (queue, monitor) = queue(false);
        let _sub = queue.attach();
        let log = Arc::new(Mutex::new(Vec::new()));

        for tag in 1..=3 {
            queue.enqueue(recording(&log, tag), "hibp", QueueOptions::default());
        }
        settle().await;
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(queue.len(), 3);

        monitor.report(true);
        settle().await;

        assert_eq!(*log.lock().unwrap(), vec![1, 2, 3]);
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_waits_for_next_transition() {
        let (queue, monitor) = queue(false);
        let _sub = queue.attach();
        let calls = Arc::new(AtomicU32::new(0));
        queue.enqueue(
            failing(&calls, WardenError::Network("down".into())),
            "hibp",
            QueueOptions::default(),
        );

        monitor.report(true);
        settle().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(queue.len(), 1);

        // Reporting the same state again is not a transition.
        monitor.report(true);
        settle().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        monitor.report(false);
        monitor.report(true);
        settle().await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_after_max_attempts() {
        let (queue, monitor) = queue(false);
        let _sub = queue.attach();
        let calls = Arc::new(AtomicU32::new(0));
        queue.enqueue(
            failing(&calls, WardenError::Timeout("slow".into())),
            "hibp",
            QueueOptions::default(),
        );

        for _ in 0..5 {
            monitor.report(true);
            settle().await;
            monitor.report(false);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_dropped_immediately() {
        let (queue, _monitor) = queue(false);
        let calls = Arc::new(AtomicU32::new(0));
        queue.enqueue(
            failing(&calls, WardenError::Rejected { status: 400 }),
            "hibp",
            QueueOptions::default(),
        );

        queue.epoch.fetch_add(1, Ordering::AcqRel);
        let report = queue.drain().await;
        assert_eq!(report.dropped, 1);
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_item_policy_overrides_queue_budget() {
        let (queue, _monitor) = queue(false);
        let calls = Arc::new(AtomicU32::new(0));
        queue.enqueue(
            failing(&calls, WardenError::Network("down".into())),
            "hibp",
            QueueOptions {
                retry: Some(RetryPolicy::no_retry()),
            },
        );

        queue.epoch.fetch_add(1, Ordering::AcqRel);
        let report = queue.drain().await;
        assert_eq!(report.dropped, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_enqueue_while_online_runs_promptly() {
        let (queue, _monitor) = queue(true);
        let log = Arc::new(Mutex::new(Vec::new()));
        queue.enqueue(recording(&log, 7), "hibp", QueueOptions::default());
        settle().await;
        assert_eq!(*log.lock().unwrap(), vec![7]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_enqueue_during_drain_runs_in_follow_up_pass() {
        let (queue, monitor) = queue(false);
        let _sub = queue.attach();
        let log = Arc::new(Mutex::new(Vec::new()));

        let slow_log = log.clone();
        let slow: QueuedOperation = Arc::new(move || {
            let log = slow_log.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                log.lock().unwrap().push(1);
                Ok(())
            }
            .boxed()
        });
        queue.enqueue(slow, "hibp", QueueOptions::default());

        monitor.report(true);
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.enqueue(recording(&log, 2), "hibp", QueueOptions::default());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(*log.lock().unwrap(), vec![1, 2]);
        assert!(queue.is_empty());
    }
}
