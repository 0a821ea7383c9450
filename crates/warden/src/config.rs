//! Configuration management for Warden.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use warden_common::WardenError;
use warden_common::constants::*;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Upper bound for one HTTP request, breach check and retries included
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    /// Remote breach service
    #[serde(default)]
    pub verification: VerificationConfig,

    /// Retry policy for remote calls
    #[serde(default)]
    pub retry: RetryConfig,

    /// Circuit breaker
    #[serde(default)]
    pub circuit: CircuitConfig,

    /// Result cache
    #[serde(default)]
    pub cache: CacheConfig,

    /// Offline queue and connectivity
    #[serde(default)]
    pub offline: OfflineConfig,

    /// Orchestrator behaviour
    #[serde(default)]
    pub validation: ValidationConfig,
}

/// Remote breach service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct VerificationConfig {
    /// Range endpoint; the 5-char hash prefix is appended
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Per-attempt timeout in milliseconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Candidates shorter than this never reach the network
    #[serde(default = "default_min_length")]
    pub min_length: usize,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Ask the provider to pad responses
    #[serde(default = "default_true")]
    pub add_padding: bool,

    /// Minimum spacing between outgoing requests in milliseconds
    #[serde(default = "default_min_request_interval")]
    pub min_request_interval_ms: u64,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            request_timeout_ms: default_request_timeout(),
            min_length: default_min_length(),
            user_agent: default_user_agent(),
            add_padding: true,
            min_request_interval_ms: default_min_request_interval(),
        }
    }
}

/// Retry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Retries in addition to the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,

    /// Jitter ceiling as a fraction of the delay (0.0-1.0)
    #[serde(default = "default_jitter_ratio")]
    pub jitter_ratio: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
            backoff_factor: default_backoff_factor(),
            jitter_ratio: default_jitter_ratio(),
        }
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CircuitConfig {
    /// Consecutive failures before opening
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,

    /// Growth applied after a failed half-open trial (1.0 = fixed)
    #[serde(default = "default_cooldown_multiplier")]
    pub cooldown_multiplier: f64,

    #[serde(default = "default_max_cooldown")]
    pub max_cooldown_secs: u64,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_secs: default_cooldown(),
            cooldown_multiplier: default_cooldown_multiplier(),
            max_cooldown_secs: default_max_cooldown(),
        }
    }
}

/// Result cache configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_positive_ttl")]
    pub positive_ttl_secs: u64,

    /// Must not exceed the positive TTL
    #[serde(default = "default_negative_ttl")]
    pub negative_ttl_secs: u64,

    /// Per table
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            positive_ttl_secs: default_positive_ttl(),
            negative_ttl_secs: default_negative_ttl(),
            max_entries: default_max_entries(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

/// Offline queue and connectivity configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OfflineConfig {
    /// Replay attempts before an item is dropped
    #[serde(default = "default_offline_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_connectivity_wait")]
    pub connectivity_wait_secs: u64,

    /// Retries suspend for connectivity instead of failing fast
    #[serde(default)]
    pub wait_for_connectivity: bool,

    #[serde(default = "default_probe_url")]
    pub probe_url: String,

    #[serde(default = "default_probe_interval")]
    pub probe_interval_secs: u64,
}

impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_offline_attempts(),
            connectivity_wait_secs: default_connectivity_wait(),
            wait_for_connectivity: false,
            probe_url: default_probe_url(),
            probe_interval_secs: default_probe_interval(),
        }
    }
}

/// Orchestrator configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ValidationConfig {
    /// Quiet period before the remote check fires
    #[serde(default = "default_debounce")]
    pub debounce_ms: u64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce(),
        }
    }
}

// Default value functions
fn default_listen_addr() -> String { DEFAULT_LISTEN_ADDR.to_string() }
fn default_http_timeout() -> u64 { DEFAULT_HTTP_TIMEOUT_SECS }
fn default_api_base_url() -> String { DEFAULT_RANGE_API_URL.to_string() }
fn default_request_timeout() -> u64 { DEFAULT_REQUEST_TIMEOUT_MS }
fn default_min_length() -> usize { DEFAULT_MIN_LENGTH }
fn default_user_agent() -> String { DEFAULT_USER_AGENT.to_string() }
fn default_true() -> bool { true }
fn default_min_request_interval() -> u64 { DEFAULT_MIN_REQUEST_INTERVAL_MS }
fn default_max_retries() -> u32 { DEFAULT_MAX_RETRIES }
fn default_base_delay() -> u64 { DEFAULT_BASE_RETRY_DELAY_MS }
fn default_max_delay() -> u64 { DEFAULT_MAX_RETRY_DELAY_MS }
fn default_backoff_factor() -> f64 { DEFAULT_BACKOFF_FACTOR }
fn default_jitter_ratio() -> f64 { DEFAULT_JITTER_RATIO }
fn default_failure_threshold() -> u32 { DEFAULT_CIRCUIT_FAILURE_THRESHOLD }
fn default_cooldown() -> u64 { DEFAULT_CIRCUIT_COOLDOWN_SECS }
fn default_cooldown_multiplier() -> f64 { 1.0 }
fn default_max_cooldown() -> u64 { DEFAULT_CIRCUIT_MAX_COOLDOWN_SECS }
fn default_positive_ttl() -> u64 { DEFAULT_POSITIVE_TTL_SECS } // 10 minutes
fn default_negative_ttl() -> u64 { DEFAULT_NEGATIVE_TTL_SECS }
fn default_max_entries() -> usize { DEFAULT_CACHE_MAX_ENTRIES }
fn default_sweep_interval() -> u64 { DEFAULT_CACHE_SWEEP_INTERVAL_SECS }
fn default_offline_attempts() -> u32 { DEFAULT_OFFLINE_MAX_ATTEMPTS }
fn default_connectivity_wait() -> u64 { DEFAULT_CONNECTIVITY_WAIT_SECS }
fn default_probe_url() -> String { DEFAULT_PROBE_URL.to_string() }
fn default_probe_interval() -> u64 { DEFAULT_PROBE_INTERVAL_SECS }
fn default_debounce() -> u64 { DEFAULT_DEBOUNCE_MS }

/// CLI values that take precedence over file and environment
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub listen_addr: Option<String>,
    pub api_base_url: Option<String>,
}

impl AppConfig {
    /// Load configuration from file and `WARDEN__*` environment, with CLI overrides
    pub fn load(config_path: &str, overrides: &Overrides) -> Result<Self> {
        let mut builder = config::Config::builder();

        if Path::new(config_path).exists() {
            builder = builder.add_source(config::File::with_name(config_path));
        } else {
            tracing::warn!(path = %config_path, "Config file not found, using defaults");
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix("WARDEN")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to load configuration")?;

        let mut config: AppConfig = settings
            .try_deserialize()
            .context("Failed to parse config")?;

        // Apply CLI overrides
        if let Some(ref listen) = overrides.listen_addr {
            config.listen_addr = listen.clone();
        }
        if let Some(ref url) = overrides.api_base_url {
            config.verification.api_base_url = url.clone();
        }

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    /// Reject values that would make the resilience layer misbehave
    pub fn validate(&self) -> Result<(), WardenError> {
        if !is_secure_endpoint(&self.verification.api_base_url) {
            return Err(WardenError::Config(
                "verification.api_base_url must use HTTPS".to_string(),
            ));
        }
        if self.verification.request_timeout_ms == 0 {
            return Err(WardenError::Config(
                "verification.request_timeout_ms must be positive".to_string(),
            ));
        }
        if self.retry.backoff_factor < 1.0 {
            return Err(WardenError::Config(
                "retry.backoff_factor must be at least 1.0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.retry.jitter_ratio) {
            return Err(WardenError::Config(
                "retry.jitter_ratio must be within 0.0..=1.0".to_string(),
            ));
        }
        if self.circuit.failure_threshold == 0 {
            return Err(WardenError::Config(
                "circuit.failure_threshold must be positive".to_string(),
            ));
        }
        if self.cache.negative_ttl_secs > self.cache.positive_ttl_secs {
            return Err(WardenError::Config(
                "cache.negative_ttl_secs must not exceed cache.positive_ttl_secs".to_string(),
            ));
        }
        if self.cache.max_entries == 0 {
            return Err(WardenError::Config("cache.max_entries must be positive".to_string()));
        }
        if self.offline.max_attempts == 0 {
            return Err(WardenError::Config(
                "offline.max_attempts must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// HTTPS, or plain HTTP to a loopback stand-in
fn is_secure_endpoint(url: &str) -> bool {
    if url.starts_with("https://") {
        return true;
    }
    let Some(rest) = url.strip_prefix("http://") else {
        return false;
    };
    ["localhost", "127.0.0.1", "[::1]"].iter().any(|host| {
        rest.strip_prefix(host)
            .is_some_and(|tail| tail.is_empty() || tail.starts_with([':', '/']))
    })
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            http_timeout_secs: default_http_timeout(),
            verification: VerificationConfig::default(),
            retry: RetryConfig::default(),
            circuit: CircuitConfig::default(),
            cache: CacheConfig::default(),
            offline: OfflineConfig::default(),
            validation: ValidationConfig::default(),
        }
    }
}
