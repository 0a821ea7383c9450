//! Core types shared across Warden components.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why a verification could not produce a definite answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnknownReason {
    /// Candidate did not qualify for a remote check
    NotChecked,
    /// Remote service failed, circuit open, or a recent failure is cached
    ServiceUnavailable,
    /// The request was superseded or explicitly cancelled
    Cancelled,
    /// Provider asked us to back off
    RateLimited,
}

/// Outcome of a breach lookup. Immutable once produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VerificationVerdict {
    /// Not present in the breach corpus
    Safe,
    /// Present in the breach corpus
    Compromised,
    /// No definite answer
    Unknown { reason: UnknownReason },
}

impl VerificationVerdict {
    pub fn unknown(reason: UnknownReason) -> Self {
        Self::Unknown { reason }
    }

    /// Safe or Compromised
    pub fn is_definite(&self) -> bool {
        !matches!(self, Self::Unknown { .. })
    }
}

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation, calls pass through
    Closed,
    /// Service assumed down, calls fail fast
    Open,
    /// Cool-down elapsed, one trial call allowed
    HalfOpen,
}

impl Default for CircuitState {
    fn default() -> Self {
        Self::Closed
    }
}

/// Point-in-time view of a circuit breaker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitSnapshot {
    pub service: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    /// Current cool-down in milliseconds
    pub cooldown_ms: u64,
    /// Milliseconds until an open circuit admits a trial call
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_in_ms: Option<u64>,
    /// Times the circuit has opened since start
    pub times_opened: u64,
}

/// Error severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Error taxonomy used for handler dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    /// Timeout, connection failure, offline
    Network,
    /// Rate limited, service unavailable, malformed response
    Api,
    /// Local rule violation
    Validation,
    /// Unclassified
    System,
}

impl ErrorCategory {
    pub const ALL: [ErrorCategory; 4] = [Self::Network, Self::Api, Self::Validation, Self::System];
}

/// Structured outcome of handling one error. Produced once, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorHandlingResult {
    pub category: ErrorCategory,
    pub severity: Severity,
    pub user_message: String,
    /// Treat the dependent requirement as provisionally satisfied
    pub should_fallback: bool,
    pub can_retry: bool,
    /// Name of the handler that produced this result
    pub handler: String,
    /// Back-off hint from the provider, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
    /// Wall-clock time spent dispatching, in microseconds
    pub handling_micros: u64,
}

/// Per-category handling statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryStats {
    pub count: u64,
    pub average_micros: f64,
    pub min_micros: u64,
    pub max_micros: u64,
}

/// Password requirements tracked in the validation snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Requirement {
    Length,
    Uppercase,
    Lowercase,
    Number,
    Special,
    NoPersonalInfo,
    NotCompromised,
}

impl Requirement {
    pub const ALL: [Requirement; 7] = [
        Self::Length,
        Self::Uppercase,
        Self::Lowercase,
        Self::Number,
        Self::Special,
        Self::NoPersonalInfo,
        Self::NotCompromised,
    ];

    /// Requirements decided synchronously from the value alone
    pub fn is_local(&self) -> bool {
        !matches!(self, Self::NotCompromised)
    }
}

/// Breach-check sub-state of the validation snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HibpStatus {
    /// No check issued for the current value
    Idle,
    /// Waiting for the debounce window to close
    Pending,
    /// Remote check in flight
    Checking,
    Safe,
    Compromised,
    /// Check could not complete
    Unavailable,
}

impl Default for HibpStatus {
    fn default() -> Self {
        Self::Idle
    }
}

/// Consistent view of a value's validation state.
///
/// Replaced wholesale on every update; consumers never observe a partial write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationSnapshot {
    /// Monotonic per-orchestrator version
    pub version: u64,
    /// `None` means not yet known
    pub requirements: BTreeMap<Requirement, Option<bool>>,
    pub is_valid: bool,
    pub errors: Vec<String>,
    /// Non-blocking notices (e.g. breach check could not be confirmed)
    pub warnings: Vec<String>,
    /// 0-100
    pub progress: u8,
    pub hibp: HibpStatus,
    /// Breach requirement treated as satisfied because the check degraded
    pub fallback_applied: bool,
    /// Short fingerprint tag of the value the breach check last resolved for
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_checked: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl ValidationSnapshot {
    /// Empty snapshot: every requirement unknown
    pub fn fresh() -> Self {
        Self {
            version: 0,
            requirements: Requirement::ALL.iter().map(|r| (*r, None)).collect(),
            is_valid: false,
            errors: Vec::new(),
            warnings: Vec::new(),
            progress: 0,
            hibp: HibpStatus::Idle,
            fallback_applied: false,
            last_checked: None,
            updated_at: Utc::now(),
        }
    }

    pub fn requirement(&self, requirement: Requirement) -> Option<bool> {
        self.requirements.get(&requirement).copied().flatten()
    }
}

impl Default for ValidationSnapshot {
    fn default() -> Self {
        Self::fresh()
    }
}

/// Verification client counters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientMetricsSnapshot {
    pub total_checks: u64,
    pub remote_calls: u64,
    pub successes: u64,
    pub failures: u64,
    pub cache_hits: u64,
    pub circuit_rejections: u64,
    pub gate_rejections: u64,
    /// Rolling average over the last samples
    pub average_latency_ms: f64,
    pub latency_samples: usize,
}

/// Result cache counters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub positive_entries: usize,
    pub negative_entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub expired: u64,
    pub evicted: u64,
}
