//! Shared constants for Warden components.

/// Default HTTP listen address
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8890";

/// HTTP request timeout, covering a full breach check with retries
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 60;

/// Pwned Passwords range endpoint (k-anonymity, prefix appended)
pub const DEFAULT_RANGE_API_URL: &str = "https://api.pwnedpasswords.com/range/";

/// Endpoint probed to derive online/offline state
pub const DEFAULT_PROBE_URL: &str = "https://api.pwnedpasswords.com/";

/// User-Agent sent with every range request (the API rejects anonymous clients)
pub const DEFAULT_USER_AGENT: &str = "warden-breach-check";

/// Provider identifier for the Pwned Passwords service
pub const HIBP_PROVIDER: &str = "hibp";

/// Number of hex characters of the SHA-1 digest sent to the range API
pub const RANGE_PREFIX_LEN: usize = 5;

/// Remote call timeout per attempt (10 seconds)
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Minimum spacing between outgoing range requests
pub const DEFAULT_MIN_REQUEST_INTERVAL_MS: u64 = 100;

/// Minimum candidate length before a remote check is worth issuing
pub const DEFAULT_MIN_LENGTH: usize = 10;

/// Quiet period after the last value change before the remote check fires
pub const DEFAULT_DEBOUNCE_MS: u64 = 1_000;

/// Retries in addition to the first attempt
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// First backoff delay
pub const DEFAULT_BASE_RETRY_DELAY_MS: u64 = 1_000;

/// Upper bound for a single backoff delay
pub const DEFAULT_MAX_RETRY_DELAY_MS: u64 = 30_000;

/// Multiplicative backoff factor
pub const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;

/// Jitter ceiling as a fraction of the computed delay
pub const DEFAULT_JITTER_RATIO: f64 = 0.10;

/// Consecutive failures before the circuit opens
pub const DEFAULT_CIRCUIT_FAILURE_THRESHOLD: u32 = 3;

/// Circuit cool-down in seconds
pub const DEFAULT_CIRCUIT_COOLDOWN_SECS: u64 = 30;

/// Ceiling for a growing cool-down (5 minutes)
pub const DEFAULT_CIRCUIT_MAX_COOLDOWN_SECS: u64 = 300;

/// Positive (verdict) cache TTL (10 minutes)
pub const DEFAULT_POSITIVE_TTL_SECS: u64 = 600;

/// Negative (failure) cache TTL, deliberately shorter than the positive TTL
pub const DEFAULT_NEGATIVE_TTL_SECS: u64 = 30;

/// Maximum entries per cache table
pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 1_000;

/// Periodic cache sweep interval
pub const DEFAULT_CACHE_SWEEP_INTERVAL_SECS: u64 = 60;

/// Replay attempts for an offline-queued operation
pub const DEFAULT_OFFLINE_MAX_ATTEMPTS: u32 = 3;

/// Upper bound for a "wait until online" suspension
pub const DEFAULT_CONNECTIVITY_WAIT_SECS: u64 = 30;

/// Connectivity probe interval
pub const DEFAULT_PROBE_INTERVAL_SECS: u64 = 15;

/// Latency samples retained for the rolling average
pub const LATENCY_WINDOW: usize = 100;

/// Handling-duration samples retained per error category
pub const ERROR_STATS_WINDOW: usize = 100;

/// HTTP header names
pub mod headers {
    /// Asks the range API to pad responses with zero-count decoys
    pub const ADD_PADDING: &str = "Add-Padding";

    /// Rate-limit back-off hint
    pub const RETRY_AFTER: &str = "Retry-After";
}

/// User-facing messages
pub mod messages {
    pub const UPPERCASE: &str = "Password must contain at least one uppercase letter";
    pub const LOWERCASE: &str = "Password must contain at least one lowercase letter";
    pub const NUMBER: &str = "Password must contain at least one number";
    pub const SPECIAL: &str = "Password must contain at least one special character";
    pub const CONTAINS_USERNAME: &str = "Password must not contain your username";
    pub const CONTAINS_EMAIL: &str = "Password must not contain your email address";
    pub const COMPROMISED: &str =
        "This password is too common and has appeared in a data breach. Please choose a stronger one.";
    pub const NOT_CONFIRMED: &str =
        "We could not confirm whether this password has appeared in a data breach. You can continue.";
    pub const RATE_LIMITED: &str =
        "The breach check is temporarily unavailable due to high demand. Please try again shortly.";
    pub const SERVICE_UNAVAILABLE: &str =
        "The breach check service is temporarily unavailable. Your password could not be confirmed.";
    pub const NETWORK: &str =
        "We could not reach the breach check service. Check your connection.";
    pub const OFFLINE: &str = "You appear to be offline. The breach check will run when you reconnect.";
    pub const UNEXPECTED: &str = "An unexpected error occurred while checking your password.";
}
