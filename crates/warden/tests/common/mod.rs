//! Shared fakes for integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use warden::client::BreachSource;
use warden::config::AppConfig;
use warden::fingerprint::RangeQuery;
use warden::state::Services;
use warden_common::WardenError;

/// Breach source with a fixed answer and latency
pub struct FakeSource {
    calls: AtomicU32,
    delay: Duration,
    response: Mutex<Result<u64, WardenError>>,
}

impl FakeSource {
    pub fn answering(count: u64, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
            delay,
            response: Mutex::new(Ok(count)),
        })
    }

    pub fn failing(error: WardenError) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
            delay: Duration::ZERO,
            response: Mutex::new(Err(error)),
        })
    }

    /// Never answers within any sane timeout
    pub fn hanging() -> Arc<Self> {
        Self::answering(0, Duration::from_secs(3600))
    }

    pub fn set_response(&self, response: Result<u64, WardenError>) {
        *self.response.lock().unwrap() = response;
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BreachSource for FakeSource {
    fn provider(&self) -> &str {
        "fake"
    }

    async fn lookup(&self, _: &RangeQuery) -> Result<u64, WardenError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.response.lock().unwrap().clone()
    }
}

pub fn services(source: Arc<FakeSource>) -> Services {
    Services::with_source(AppConfig::default(), source, reqwest::Client::new())
}
