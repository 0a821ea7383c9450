//! Minimum spacing between outgoing provider requests.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

/// Hands out request slots at least `interval` apart.
///
/// Each caller reserves the next free slot under the lock and sleeps outside
/// it, so waiters queue up in arrival order.
pub struct Pacer {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl Pacer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_slot: Mutex::new(None),
        }
    }

    pub async fn wait(&self) {
        if self.interval.is_zero() {
            return;
        }
        let slot = {
            let mut next = self.next_slot.lock().unwrap_or_else(PoisonError::into_inner);
            let now = Instant::now();
            let slot = next.map_or(now, |n| n.max(now));
            *next = Some(slot + self.interval);
            slot
        };
        tokio::time::sleep_until(slot).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_slots_are_spaced() {
        let pacer = Pacer::new(Duration::from_millis(100));
        let started = Instant::now();
        pacer.wait().await;
        assert_eq!(started.elapsed(), Duration::ZERO);
        pacer.wait().await;
        pacer.wait().await;
        assert!(started.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_pacer_does_not_wait() {
        let pacer = Pacer::new(Duration::from_millis(100));
        pacer.wait().await;
        tokio::time::advance(Duration::from_secs(1)).await;

        let started = Instant::now();
        pacer.wait().await;
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_waiters_queue() {
        let pacer = Pacer::new(Duration::from_millis(100));
        let started = Instant::now();
        futures::future::join_all((0..5).map(|_| pacer.wait())).await;
        assert!(started.elapsed() >= Duration::from_millis(400));
    }
}
