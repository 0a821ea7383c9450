//! Verification client.
//!
//! # Data Flow
//! ```text
//! check(candidate)
//!     → length gate (short candidates never leave the process)
//!     → cache.rs (positive hit: done; negative hit: fail fast)
//!     → source pacing (outside the attempt timeout)
//!     → circuit.rs (admit, or fail fast while open)
//!     → retry.rs + source (bounded attempts, per-attempt timeout)
//!     → verdict cached, circuit updated
//! ```
//!
//! `try_verify` surfaces the typed error; `check` never fails and maps every
//! error to an `Unknown` verdict plus the registry's handling decision.

mod hibp;
mod pacer;
mod source;

pub use hibp::{HibpSource, parse_range};
pub use pacer::Pacer;
pub use source::BreachSource;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::oneshot;
use tokio::time::Instant;
use warden_common::constants::LATENCY_WINDOW;
use warden_common::{
    ClientMetricsSnapshot, ErrorHandlingResult, UnknownReason, VerificationVerdict, WardenError,
};

use crate::cache::{CachedVerdict, ResultCache};
use crate::cancel::CancelToken;
use crate::config::AppConfig;
use crate::errors::{ErrorContext, ErrorHandlerRegistry};
use crate::fingerprint::{Fingerprint, RangeQuery};
use crate::offline::{OfflineQueue, QueueOptions};
use crate::resilience::{Admission, CircuitBreaker, RetryExecutor, RetryPolicy};

/// Per-client tuning
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Per-attempt timeout
    pub request_timeout: Duration,
    /// Candidates shorter than this are not sent
    pub min_length: usize,
    pub retry: RetryPolicy,
}

impl ClientOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        let mut retry = RetryPolicy::from_config(&config.retry);
        if config.offline.wait_for_connectivity {
            retry = retry
                .waiting_for_connectivity(Duration::from_secs(config.offline.connectivity_wait_secs));
        }
        Self {
            request_timeout: Duration::from_millis(config.verification.request_timeout_ms),
            min_length: config.verification.min_length,
            retry,
        }
    }
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Verdict plus how the failure behind it was handled
#[derive(Debug, Clone)]
pub struct VerificationOutcome {
    pub verdict: VerificationVerdict,
    /// `None` for definite verdicts and cancellations
    pub handling: Option<ErrorHandlingResult>,
    /// The failure behind an `Unknown` verdict
    pub error: Option<WardenError>,
}

impl VerificationOutcome {
    /// The check never got an answer because the host is offline
    pub fn is_offline(&self) -> bool {
        self.error == Some(WardenError::Offline)
    }
}

#[derive(Default)]
struct ClientMetrics {
    total_checks: AtomicU64,
    remote_calls: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    cache_hits: AtomicU64,
    circuit_rejections: AtomicU64,
    gate_rejections: AtomicU64,
    latencies_ms: Mutex<VecDeque<f64>>,
}

impl ClientMetrics {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn record_latency(&self, elapsed: Duration) {
        let mut window = self.latencies_ms.lock().unwrap_or_else(PoisonError::into_inner);
        if window.len() == LATENCY_WINDOW {
            window.pop_front();
        }
        window.push_back(elapsed.as_secs_f64() * 1000.0);
    }

    fn snapshot(&self) -> ClientMetricsSnapshot {
        let window = self.latencies_ms.lock().unwrap_or_else(PoisonError::into_inner);
        let average_latency_ms = if window.is_empty() {
            0.0
        } else {
            window.iter().sum::<f64>() / window.len() as f64
        };
        ClientMetricsSnapshot {
            total_checks: self.total_checks.load(Ordering::Relaxed),
            remote_calls: self.remote_calls.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            circuit_rejections: self.circuit_rejections.load(Ordering::Relaxed),
            gate_rejections: self.gate_rejections.load(Ordering::Relaxed),
            average_latency_ms,
            latency_samples: window.len(),
        }
    }
}

/// Cached, circuit-guarded, retrying breach lookups
pub struct VerificationClient {
    source: Arc<dyn BreachSource>,
    cache: Arc<ResultCache>,
    circuit: Arc<CircuitBreaker>,
    executor: RetryExecutor,
    errors: Arc<ErrorHandlerRegistry>,
    options: ClientOptions,
    /// `options.retry` with an open circuit made terminal
    policy: RetryPolicy,
    metrics: ClientMetrics,
}

impl VerificationClient {
    pub fn new(
        source: Arc<dyn BreachSource>,
        cache: Arc<ResultCache>,
        circuit: Arc<CircuitBreaker>,
        executor: RetryExecutor,
        errors: Arc<ErrorHandlerRegistry>,
        options: ClientOptions,
    ) -> Self {
        let base = options.retry.clone();
        let policy = options.retry.clone().with_predicate(move |error| {
            !matches!(error, WardenError::CircuitOpen { .. }) && base.is_retryable(error)
        });
        Self {
            source,
            cache,
            circuit,
            executor,
            errors,
            options,
            policy,
            metrics: ClientMetrics::default(),
        }
    }

    pub fn provider(&self) -> &str {
        self.source.provider()
    }

    pub fn min_length(&self) -> usize {
        self.options.min_length
    }

    pub fn circuit(&self) -> &Arc<CircuitBreaker> {
        &self.circuit
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    pub fn metrics(&self) -> ClientMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Verify `candidate`, never failing. Errors become `Unknown` verdicts.
    pub async fn check(&self, candidate: &str, cancel: &CancelToken) -> VerificationOutcome {
        match self.try_verify(candidate, cancel).await {
            Ok(verdict) => VerificationOutcome {
                verdict,
                handling: None,
                error: None,
            },
            Err(error) => {
                let verdict = VerificationVerdict::unknown(error.unknown_reason());
                let handling = (error != WardenError::Cancelled).then(|| {
                    let context = ErrorContext::new("verify")
                        .provider(self.provider())
                        .fingerprint(Fingerprint::of(candidate).short());
                    self.errors.handle_error(&error, &context, None)
                });
                VerificationOutcome {
                    verdict,
                    handling,
                    error: Some(error),
                }
            }
        }
    }

    pub async fn verify(&self, candidate: &str, cancel: &CancelToken) -> VerificationVerdict {
        self.check(candidate, cancel).await.verdict
    }

    /// Verify `candidate`, surfacing the reason a definite verdict was not reached
    pub async fn try_verify(
        &self,
        candidate: &str,
        cancel: &CancelToken,
    ) -> Result<VerificationVerdict, WardenError> {
        ClientMetrics::bump(&self.metrics.total_checks);

        if candidate.chars().count() < self.options.min_length {
            ClientMetrics::bump(&self.metrics.gate_rejections);
            return Err(WardenError::InvalidInput(format!(
                "candidate shorter than {} characters",
                self.options.min_length
            )));
        }
        cancel.check()?;

        let key = Fingerprint::of(candidate);
        match self.cache.lookup(&key) {
            Some(CachedVerdict::Positive(verdict)) => {
                ClientMetrics::bump(&self.metrics.cache_hits);
                tracing::debug!(fingerprint = %key, verdict = ?verdict, "Verdict served from cache");
                return Ok(verdict);
            }
            Some(CachedVerdict::Negative(reason)) => {
                ClientMetrics::bump(&self.metrics.cache_hits);
                tracing::debug!(fingerprint = %key, reason = ?reason, "Recent failure served from cache");
                return Err(match reason {
                    UnknownReason::RateLimited => WardenError::RateLimited {
                        retry_after_secs: None,
                    },
                    _ => WardenError::RecentlyFailed,
                });
            }
            None => {}
        }

        let query = RangeQuery::of(candidate);
        let started = Instant::now();
        let result = self.lookup_with_retry(&query, cancel).await;
        self.metrics.record_latency(started.elapsed());

        match result {
            Ok(count) => {
                let verdict = if count > 0 {
                    VerificationVerdict::Compromised
                } else {
                    VerificationVerdict::Safe
                };
                ClientMetrics::bump(&self.metrics.successes);
                tracing::info!(
                    fingerprint = %key,
                    provider = self.provider(),
                    verdict = ?verdict,
                    "Breach check complete"
                );
                self.cache.put_positive(key, verdict);
                Ok(verdict)
            }
            Err(error) => {
                self.remember_failure(key, &error);
                Err(error)
            }
        }
    }

    /// Every attempt passes the circuit on its own, so a run of failed
    /// retries can open it and stop the remaining attempts.
    async fn lookup_with_retry(
        &self,
        query: &RangeQuery,
        cancel: &CancelToken,
    ) -> Result<u64, WardenError> {
        let timeout = self.options.request_timeout;

        self.executor
            .run(&self.policy, cancel, |attempt| async move {
                if let Some(trigger) = &attempt.trigger {
                    tracing::debug!(attempt = attempt.index, after = %trigger, "Retrying range lookup");
                }

                cancel.run(self.source.ready()).await?;

                let admission = self.circuit.try_acquire().inspect_err(|_| {
                    ClientMetrics::bump(&self.metrics.circuit_rejections);
                })?;
                ClientMetrics::bump(&self.metrics.remote_calls);

                let result = match cancel
                    .run(tokio::time::timeout(timeout, self.source.lookup(query)))
                    .await
                {
                    Ok(Ok(result)) => result,
                    Ok(Err(_)) => Err(WardenError::Timeout(format!(
                        "no response within {}ms",
                        timeout.as_millis()
                    ))),
                    Err(cancelled) => Err(cancelled),
                };
                self.record_attempt(admission, &result);
                result
            })
            .await
    }

    fn record_attempt(&self, admission: Admission, result: &Result<u64, WardenError>) {
        match result {
            Ok(_) => self.circuit.record_success(admission),
            // Neither says anything about the provider's health.
            Err(WardenError::Cancelled | WardenError::Offline) => {
                if admission == Admission::Trial {
                    self.circuit.release_trial();
                }
            }
            Err(WardenError::RateLimited { retry_after_secs }) => {
                self.circuit
                    .trip("rate limited", retry_after_secs.map(Duration::from_secs));
            }
            Err(_) => self.circuit.record_failure(admission),
        }
    }

    fn remember_failure(&self, key: Fingerprint, error: &WardenError) {
        match error {
            WardenError::Cancelled => return,
            // Says nothing about this candidate; the breaker already covers it.
            WardenError::Offline | WardenError::CircuitOpen { .. } => {}
            WardenError::RateLimited { .. } => {
                self.cache.put_negative(key.clone(), UnknownReason::RateLimited);
            }
            _ => {
                self.cache.put_negative(key.clone(), UnknownReason::ServiceUnavailable);
            }
        }

        ClientMetrics::bump(&self.metrics.failures);
        tracing::warn!(
            fingerprint = %key,
            provider = self.provider(),
            error = %error,
            "Breach check failed"
        );
    }

    /// Queue a verification to run once connectivity returns.
    ///
    /// The receiver resolves with the definite verdict, or is dropped if the
    /// queued operation exhausts its attempts.
    pub fn verify_when_online(
        self: &Arc<Self>,
        candidate: String,
        queue: &Arc<OfflineQueue>,
    ) -> oneshot::Receiver<VerificationVerdict> {
        let (tx, rx) = oneshot::channel();
        let reply = Arc::new(Mutex::new(Some(tx)));
        let client = Arc::clone(self);
        let candidate = Arc::new(candidate);

        queue.enqueue(
            Arc::new(move || {
                let client = Arc::clone(&client);
                let candidate = Arc::clone(&candidate);
                let reply = Arc::clone(&reply);
                async move {
                    let verdict = client.try_verify(&candidate, &CancelToken::new()).await?;
                    if let Some(tx) = reply.lock().unwrap_or_else(PoisonError::into_inner).take() {
                        let _ = tx.send(verdict);
                    }
                    Ok(())
                }
                .boxed()
            }),
            self.provider(),
            QueueOptions::default(),
        );
        rx
    }
}
