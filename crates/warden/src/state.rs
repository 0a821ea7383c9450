//! Application state and shared resources.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use warden_common::constants::HIBP_PROVIDER;

use crate::cache::ResultCache;
use crate::client::{BreachSource, ClientOptions, HibpSource, VerificationClient};
use crate::config::AppConfig;
use crate::connectivity::ConnectivityMonitor;
use crate::errors::ErrorHandlerRegistry;
use crate::offline::OfflineQueue;
use crate::resilience::{CircuitBreaker, RetryExecutor};
use crate::validation::{UserContext, ValidationOrchestrator};

/// Process-wide services, shared by every orchestrator and HTTP handler
#[derive(Clone)]
pub struct Services {
    /// Application configuration
    pub config: Arc<AppConfig>,

    /// Online/offline state
    pub connectivity: Arc<ConnectivityMonitor>,

    /// Positive + negative verdict cache
    pub cache: Arc<ResultCache>,

    /// Breaker guarding the breach provider
    pub circuit: Arc<CircuitBreaker>,

    /// Error dispatch table
    pub errors: Arc<ErrorHandlerRegistry>,

    /// Breach lookups
    pub client: Arc<VerificationClient>,

    /// Operations parked until connectivity returns
    pub offline: Arc<OfflineQueue>,

    /// Shared HTTP client (range API and connectivity probe)
    pub http: reqwest::Client,

    started_at: Instant,
}

impl Services {
    /// Wire everything against the Pwned Passwords range API
    pub fn new(config: AppConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(config.verification.user_agent.as_str())
            .build()
            .context("Failed to build HTTP client")?;
        let source = Arc::new(HibpSource::with_client(http.clone(), &config.verification));
        Ok(Self::with_source(config, source, http))
    }

    /// Wire everything against an arbitrary breach source
    pub fn with_source(
        config: AppConfig,
        source: Arc<dyn BreachSource>,
        http: reqwest::Client,
    ) -> Self {
        let connectivity = ConnectivityMonitor::new(true);
        let cache = Arc::new(ResultCache::new(&config.cache));
        let circuit = Arc::new(CircuitBreaker::new(HIBP_PROVIDER, &config.circuit));
        let errors = Arc::new(ErrorHandlerRegistry::with_default_handlers());
        let client = Arc::new(VerificationClient::new(
            source,
            cache.clone(),
            circuit.clone(),
            RetryExecutor::new(connectivity.clone()),
            errors.clone(),
            ClientOptions::from_config(&config),
        ));
        let offline = OfflineQueue::new(&config.offline, connectivity.clone());

        Self {
            config: Arc::new(config),
            connectivity,
            cache,
            circuit,
            errors,
            client,
            offline,
            http,
            started_at: Instant::now(),
        }
    }

    /// A new orchestrator for one input, sharing this process's client
    pub fn orchestrator(&self, user: UserContext) -> Arc<ValidationOrchestrator> {
        ValidationOrchestrator::new(
            self.client.clone(),
            user,
            Duration::from_millis(self.config.validation.debounce_ms),
            Some(self.offline.clone()),
        )
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}
