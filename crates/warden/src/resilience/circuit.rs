//! Circuit breaker for the remote breach service.
//!
//! ```text
//! Closed   --(threshold consecutive failures)--> Open
//! Open     --(cool-down elapsed, next acquire)--> HalfOpen (one trial call)
//! HalfOpen --(trial succeeds)--> Closed (failures reset, cool-down reset)
//! HalfOpen --(trial fails)-----> Open   (cool-down grows by the multiplier, capped)
//! any      --(trip)------------> Open   (rate limiting bypasses the threshold)
//! any      --(reset)-----------> Closed
//! ```
//!
//! All transitions happen under one mutex, so concurrent checks from several
//! orchestrators observe a single consistent state.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use warden_common::{CircuitSnapshot, CircuitState, WardenError};

use crate::config::CircuitConfig;

/// How a call was admitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Circuit closed
    Normal,
    /// The single half-open trial call
    Trial,
}

struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    cooldown: Duration,
    trial_in_flight: bool,
    times_opened: u64,
}

/// Per-service failure gate
pub struct CircuitBreaker {
    service: String,
    failure_threshold: u32,
    base_cooldown: Duration,
    max_cooldown: Duration,
    cooldown_multiplier: f64,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(service: impl Into<String>, config: &CircuitConfig) -> Self {
        let base_cooldown = Duration::from_secs(config.cooldown_secs);
        Self {
            service: service.into(),
            failure_threshold: config.failure_threshold.max(1),
            base_cooldown,
            max_cooldown: Duration::from_secs(config.max_cooldown_secs).max(base_cooldown),
            cooldown_multiplier: config.cooldown_multiplier.max(1.0),
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                cooldown: base_cooldown,
                trial_in_flight: false,
                times_opened: 0,
            }),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Ask permission for one remote call.
    ///
    /// Fails with `CircuitOpen` while the cool-down runs, or while the
    /// half-open trial is still outstanding.
    pub fn try_acquire(&self) -> Result<Admission, WardenError> {
        let mut inner = self.lock();
        let now = Instant::now();

        match inner.state {
            CircuitState::Closed => Ok(Admission::Normal),
            CircuitState::Open => {
                let opened_at = inner.opened_at.unwrap_or(now);
                let elapsed = now.saturating_duration_since(opened_at);
                if elapsed >= inner.cooldown {
                    inner.state = CircuitState::HalfOpen;
                    inner.trial_in_flight = true;
                    tracing::info!(service = %self.service, "Circuit half-open, admitting trial call");
                    Ok(Admission::Trial)
                } else {
                    Err(WardenError::CircuitOpen {
                        retry_in_ms: (inner.cooldown - elapsed).as_millis() as u64,
                    })
                }
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    Err(WardenError::CircuitOpen { retry_in_ms: 0 })
                } else {
                    inner.trial_in_flight = true;
                    Ok(Admission::Trial)
                }
            }
        }
    }

    /// Record a call that reached the provider and answered.
    ///
    /// Only the trial decides a half-open circuit. A `Normal` call admitted
    /// before the circuit opened can finish late; its result is ignored.
    pub fn record_success(&self, admission: Admission) {
        let mut inner = self.lock();
        match (inner.state, admission) {
            (CircuitState::Closed, _) => inner.consecutive_failures = 0,
            (CircuitState::HalfOpen, Admission::Trial) => {
                tracing::info!(service = %self.service, "Circuit closed after successful trial");
                inner.state = CircuitState::Closed;
                inner.consecutive_failures = 0;
                inner.opened_at = None;
                inner.cooldown = self.base_cooldown;
                inner.trial_in_flight = false;
            }
            _ => {
                tracing::debug!(service = %self.service, ?admission, "Ignoring stale success");
            }
        }
    }

    pub fn record_failure(&self, admission: Admission) {
        let mut inner = self.lock();
        match (inner.state, admission) {
            (CircuitState::Closed, _) => {
                inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
                if inner.consecutive_failures >= self.failure_threshold {
                    self.open(&mut inner, "failure threshold reached");
                }
            }
            (CircuitState::HalfOpen, Admission::Trial) => {
                inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
                let grown = inner.cooldown.mul_f64(self.cooldown_multiplier);
                inner.cooldown = grown.min(self.max_cooldown);
                self.open(&mut inner, "trial call failed");
            }
            // Late failures from calls admitted before the circuit opened.
            _ => {}
        }
    }

    /// Force the circuit open regardless of the failure count.
    ///
    /// `hold_for` extends the cool-down when the provider asked for a longer pause.
    pub fn trip(&self, reason: &str, hold_for: Option<Duration>) {
        let mut inner = self.lock();
        if let Some(hold) = hold_for {
            inner.cooldown = inner.cooldown.max(hold.min(self.max_cooldown));
        }
        self.open(&mut inner, reason);
    }

    /// Give back an unused half-open trial (the call was cancelled before it resolved)
    pub fn release_trial(&self) {
        let mut inner = self.lock();
        if inner.state == CircuitState::HalfOpen {
            inner.trial_in_flight = false;
        }
    }

    /// Force Closed. Operator and test recovery.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.cooldown = self.base_cooldown;
        inner.trial_in_flight = false;
        tracing::info!(service = %self.service, "Circuit manually reset");
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let inner = self.lock();
        let retry_in_ms = match (inner.state, inner.opened_at) {
            (CircuitState::Open, Some(opened_at)) => {
                let elapsed = Instant::now().saturating_duration_since(opened_at);
                Some(inner.cooldown.saturating_sub(elapsed).as_millis() as u64)
            }
            _ => None,
        };

        CircuitSnapshot {
            service: self.service.clone(),
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            cooldown_ms: inner.cooldown.as_millis() as u64,
            retry_in_ms,
            times_opened: inner.times_opened,
        }
    }

    fn open(&self, inner: &mut Inner, reason: &str) {
        inner.state = CircuitState::Open;
        inner.opened_at = Some(Instant::now());
        inner.trial_in_flight = false;
        inner.times_opened += 1;
        tracing::warn!(
            service = %self.service,
            reason = %reason,
            failures = inner.consecutive_failures,
            cooldown_ms = inner.cooldown.as_millis() as u64,
            "Circuit opened"
        );
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(cooldown_multiplier: f64) -> CircuitConfig {
        CircuitConfig {
            failure_threshold: 3,
            cooldown_secs: 30,
            cooldown_multiplier,
            max_cooldown_secs: 120,
        }
    }

    fn open_breaker(breaker: &CircuitBreaker) {
        for _ in 0..3 {
            let admission = breaker.try_acquire().unwrap();
            breaker.record_failure(admission);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_after_threshold() {
        let breaker = CircuitBreaker::new("hibp", &config(1.0));
        breaker.record_failure(Admission::Normal);
        breaker.record_failure(Admission::Normal);
        assert_eq!(breaker.state(), CircuitState::Closed);

        breaker.record_failure(Admission::Normal);
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(matches!(breaker.try_acquire(), Err(WardenError::CircuitOpen { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_failure_count() {
        let breaker = CircuitBreaker::new("hibp", &config(1.0));
        breaker.record_failure(Admission::Normal);
        breaker.record_failure(Admission::Normal);
        breaker.record_success(Admission::Normal);
        breaker.record_failure(Admission::Normal);
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.snapshot().consecutive_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_trial_after_cooldown() {
        let breaker = CircuitBreaker::new("hibp", &config(1.0));
        open_breaker(&breaker);

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(breaker.try_acquire().is_err());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(breaker.try_acquire(), Ok(Admission::Trial));
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        // Only one trial at a time.
        assert!(breaker.try_acquire().is_err());

        breaker.record_success(Admission::Trial);
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.try_acquire(), Ok(Admission::Normal));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_trial_reopens_with_grown_cooldown() {
        let breaker = CircuitBreaker::new("hibp", &config(2.0));
        open_breaker(&breaker);

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(breaker.try_acquire(), Ok(Admission::Trial));
        breaker.record_failure(Admission::Trial);

        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.state, CircuitState::Open);
        assert_eq!(snapshot.cooldown_ms, 60_000);
        assert_eq!(snapshot.times_opened, 2);

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(breaker.try_acquire().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_trip_bypasses_threshold() {
        let breaker = CircuitBreaker::new("hibp", &config(1.0));
        breaker.trip("rate limited", Some(Duration::from_secs(45)));
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.snapshot().cooldown_ms, 45_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_trial_allows_new_trial() {
        let breaker = CircuitBreaker::new("hibp", &config(1.0));
        open_breaker(&breaker);
        tokio::time::advance(Duration::from_secs(30)).await;

        assert_eq!(breaker.try_acquire(), Ok(Admission::Trial));
        breaker.release_trial();
        assert_eq!(breaker.try_acquire(), Ok(Admission::Trial));
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_normal_results_do_not_decide_half_open() {
        let breaker = CircuitBreaker::new("hibp", &config(2.0));
        // Admitted while closed, finishes after the circuit has opened.
        let straggler = breaker.try_acquire().unwrap();
        assert_eq!(straggler, Admission::Normal);
        open_breaker(&breaker);

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(breaker.try_acquire(), Ok(Admission::Trial));

        breaker.record_success(straggler);
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(breaker.try_acquire().is_err());

        breaker.record_failure(straggler);
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert_eq!(breaker.snapshot().cooldown_ms, 30_000);

        breaker.record_failure(Admission::Trial);
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.snapshot().cooldown_ms, 60_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_success_while_open_keeps_circuit_open() {
        let breaker = CircuitBreaker::new("hibp", &config(1.0));
        open_breaker(&breaker);

        breaker.record_success(Admission::Normal);
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.snapshot().consecutive_failures, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_reset() {
        let breaker = CircuitBreaker::new("hibp", &config(1.0));
        open_breaker(&breaker);
        breaker.reset();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.snapshot().consecutive_failures, 0);
    }
}
