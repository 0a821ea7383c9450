//! Bounded retry with exponential backoff.
//!
//! Each invocation runs the operation once, then retries up to
//! `max_retries` more times while the error is retryable. Before every retry
//! the executor consults the connectivity monitor: offline fails fast with
//! `Offline`, unless the policy opts into waiting for connectivity.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use warden_common::WardenError;

use super::backoff::calculate_backoff;
use crate::cancel::CancelToken;
use crate::config::RetryConfig;
use crate::connectivity::ConnectivityMonitor;

/// Decides whether an error is worth another attempt
pub type RetryPredicate = Arc<dyn Fn(&WardenError) -> bool + Send + Sync>;

/// Retry policy
#[derive(Clone)]
pub struct RetryPolicy {
    /// Retries in addition to the first attempt
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
    /// Jitter ceiling as a fraction of the computed delay
    pub jitter_ratio: f64,
    /// Suspend up to this long for connectivity instead of failing fast
    pub wait_for_connectivity: Option<Duration>,
    is_retryable: RetryPredicate,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            backoff_factor: config.backoff_factor,
            jitter_ratio: config.jitter_ratio,
            wait_for_connectivity: None,
            is_retryable: Arc::new(WardenError::is_retryable),
        }
    }

    /// Single attempt, no retries
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Replace the retryability predicate
    pub fn with_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&WardenError) -> bool + Send + Sync + 'static,
    {
        self.is_retryable = Arc::new(predicate);
        self
    }

    pub fn waiting_for_connectivity(mut self, limit: Duration) -> Self {
        self.wait_for_connectivity = Some(limit);
        self
    }

    pub fn is_retryable(&self, error: &WardenError) -> bool {
        (self.is_retryable)(error)
    }

    /// Total attempts including the first
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Backoff before retry number `retry` (1-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        calculate_backoff(
            retry,
            self.base_delay,
            self.backoff_factor,
            self.max_delay,
            self.jitter_ratio,
        )
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("backoff_factor", &self.backoff_factor)
            .field("jitter_ratio", &self.jitter_ratio)
            .field("wait_for_connectivity", &self.wait_for_connectivity)
            .finish_non_exhaustive()
    }
}

/// One attempt within a single executor invocation
#[derive(Debug, Clone)]
pub struct RetryAttempt {
    /// 0 for the first try
    pub index: u32,
    /// Backoff slept before this attempt
    pub delay: Duration,
    /// Error that caused this retry
    pub trigger: Option<WardenError>,
}

impl RetryAttempt {
    fn first() -> Self {
        Self {
            index: 0,
            delay: Duration::ZERO,
            trigger: None,
        }
    }
}

/// Runs operations under a [`RetryPolicy`]
#[derive(Clone)]
pub struct RetryExecutor {
    connectivity: Option<Arc<ConnectivityMonitor>>,
}

impl RetryExecutor {
    pub fn new(connectivity: Arc<ConnectivityMonitor>) -> Self {
        Self {
            connectivity: Some(connectivity),
        }
    }

    /// Executor that never consults connectivity
    pub fn detached() -> Self {
        Self { connectivity: None }
    }

    /// Run `op` until it succeeds, fails non-retryably, or the budget is spent.
    ///
    /// Returns the last error on exhaustion.
    pub async fn run<T, F, Fut>(
        &self,
        policy: &RetryPolicy,
        cancel: &CancelToken,
        mut op: F,
    ) -> Result<T, WardenError>
    where
        F: FnMut(RetryAttempt) -> Fut,
        Fut: Future<Output = Result<T, WardenError>>,
    {
        let mut attempt = RetryAttempt::first();

        loop {
            cancel.check()?;
            if attempt.index > 0 {
                self.ensure_online(policy, cancel).await?;
            }

            let index = attempt.index;
            let error = match op(attempt).await {
                Ok(value) => {
                    if index > 0 {
                        tracing::debug!(attempt = index, "Operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) => e,
            };

            if error == WardenError::Cancelled {
                return Err(error);
            }
            if !policy.is_retryable(&error) {
                tracing::debug!(attempt = index, error = %error, "Non-retryable error");
                return Err(error);
            }
            if index >= policy.max_retries {
                tracing::warn!(
                    attempts = index + 1,
                    error = %error,
                    "Retries exhausted"
                );
                return Err(error);
            }

            let next = index + 1;
            let delay = policy.delay_for(next);
            tracing::debug!(
                attempt = next,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Retrying after backoff"
            );
            cancel.run(tokio::time::sleep(delay)).await?;

            attempt = RetryAttempt {
                index: next,
                delay,
                trigger: Some(error),
            };
        }
    }

    async fn ensure_online(
        &self,
        policy: &RetryPolicy,
        cancel: &CancelToken,
    ) -> Result<(), WardenError> {
        let Some(monitor) = &self.connectivity else {
            return Ok(());
        };
        if monitor.is_online() {
            return Ok(());
        }

        match policy.wait_for_connectivity {
            Some(limit) => {
                tracing::debug!(limit_ms = limit.as_millis() as u64, "Waiting for connectivity");
                monitor.wait_for_online(limit, cancel).await
            }
            None => Err(WardenError::Offline),
        }
    }
}
