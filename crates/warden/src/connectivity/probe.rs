//! Background connectivity probe.
//!
//! Issues a cheap HEAD request against the provider on an interval. Any HTTP
//! response counts as online, a transport failure or timeout as offline.

use std::sync::Arc;
use std::time::Duration;

use super::ConnectivityMonitor;

/// Probe configuration
#[derive(Clone, Debug)]
pub struct ProbeConfig {
    pub url: String,
    pub interval: Duration,
    pub timeout: Duration,
}

/// Periodically probe `config.url` and feed the result to `monitor`
pub async fn connectivity_probe_worker(
    monitor: Arc<ConnectivityMonitor>,
    http: reqwest::Client,
    config: ProbeConfig,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) {
    tracing::info!(
        url = %config.url,
        interval = ?config.interval,
        "Connectivity probe started"
    );

    loop {
        tokio::select! {
            _ = tokio::time::sleep(config.interval) => {
                let online = probe_once(&http, &config).await;
                monitor.report(online);
            }
            _ = shutdown.recv() => {
                tracing::info!("Connectivity probe shutting down");
                break;
            }
        }
    }
}

async fn probe_once(http: &reqwest::Client, config: &ProbeConfig) -> bool {
    match http.head(&config.url).timeout(config.timeout).send().await {
        Ok(_) => true,
        Err(e) => {
            tracing::debug!(error = %e, "Connectivity probe failed");
            false
        }
    }
}
