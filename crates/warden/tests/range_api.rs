//! Range API client against a loopback stand-in for the provider.

use std::sync::{Arc, Mutex};

use axum::Router;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use warden::client::{BreachSource, HibpSource};
use warden::config::VerificationConfig;
use warden::fingerprint::RangeQuery;
use warden_common::WardenError;

const CANDIDATE: &str = "Ab3!Ab3!Ab";

#[derive(Clone, Copy)]
enum Mode {
    Hit(u64),
    Miss,
    RateLimited,
    Down,
    Garbage,
}

#[derive(Default)]
struct Seen {
    prefixes: Vec<String>,
    padded: Vec<bool>,
}

#[derive(Clone)]
struct Provider {
    mode: Arc<Mutex<Mode>>,
    seen: Arc<Mutex<Seen>>,
    suffix: String,
}

async fn range(
    State(provider): State<Provider>,
    Path(prefix): Path<String>,
    headers: HeaderMap,
) -> Response {
    {
        let mut seen = provider.seen.lock().unwrap();
        seen.prefixes.push(prefix);
        seen.padded.push(headers.get("add-padding").is_some());
    }

    let mode = *provider.mode.lock().unwrap();
    match mode {
        Mode::Hit(count) => {
            // Lowercase to exercise case-insensitive matching
            let body = format!(
                "0018A45C4D1DEF81644B54AB7F969B88D65:1\r\n{}:{}\r\n00D4F6E8FA6EECAD2A3AA415EEC418D38EC:0\r\n",
                provider.suffix.to_lowercase(),
                count
            );
            body.into_response()
        }
        Mode::Miss => "0018A45C4D1DEF81644B54AB7F969B88D65:1\r\n".into_response(),
        Mode::RateLimited => (
            StatusCode::TOO_MANY_REQUESTS,
            [("Retry-After", "7")],
            "slow down",
        )
            .into_response(),
        Mode::Down => StatusCode::SERVICE_UNAVAILABLE.into_response(),
        Mode::Garbage => "<html>not a range</html>".into_response(),
    }
}

async fn spawn_provider(mode: Mode) -> (Provider, HibpSource) {
    let query = RangeQuery::of(CANDIDATE);
    let provider = Provider {
        mode: Arc::new(Mutex::new(mode)),
        seen: Arc::new(Mutex::new(Seen::default())),
        suffix: query.suffix().to_string(),
    };
    let app = Router::new()
        .route("/range/{prefix}", get(range))
        .with_state(provider.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let config = VerificationConfig {
        api_base_url: format!("http://{}/range", addr),
        min_request_interval_ms: 0,
        ..VerificationConfig::default()
    };
    let source = HibpSource::with_client(reqwest::Client::new(), &config);
    (provider, source)
}

#[tokio::test]
async fn test_breached_candidate_reports_count() {
    let (provider, source) = spawn_provider(Mode::Hit(3_730_471)).await;
    let query = RangeQuery::of(CANDIDATE);

    assert_eq!(source.lookup(&query).await, Ok(3_730_471));

    let seen = provider.seen.lock().unwrap();
    assert_eq!(seen.prefixes, vec![query.prefix().to_string()]);
    assert_eq!(seen.padded, vec![true]);
}

#[tokio::test]
async fn test_absent_suffix_is_not_breached() {
    let (_provider, source) = spawn_provider(Mode::Miss).await;
    assert_eq!(source.lookup(&RangeQuery::of(CANDIDATE)).await, Ok(0));
}

#[tokio::test]
async fn test_rate_limit_carries_retry_after() {
    let (_provider, source) = spawn_provider(Mode::RateLimited).await;
    assert_eq!(
        source.lookup(&RangeQuery::of(CANDIDATE)).await,
        Err(WardenError::RateLimited {
            retry_after_secs: Some(7)
        })
    );
}

#[tokio::test]
async fn test_server_error_is_service_unavailable() {
    let (provider, source) = spawn_provider(Mode::Down).await;
    let query = RangeQuery::of(CANDIDATE);

    assert!(matches!(
        source.lookup(&query).await,
        Err(WardenError::ServiceUnavailable(_))
    ));

    *provider.mode.lock().unwrap() = Mode::Hit(1);
    assert_eq!(source.lookup(&query).await, Ok(1));
}

#[tokio::test]
async fn test_unparseable_body_is_malformed() {
    let (_provider, source) = spawn_provider(Mode::Garbage).await;
    assert!(matches!(
        source.lookup(&RangeQuery::of(CANDIDATE)).await,
        Err(WardenError::MalformedResponse(_))
    ));
}

#[tokio::test]
async fn test_unreachable_provider_is_network_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = VerificationConfig {
        api_base_url: format!("http://{}/range/", addr),
        ..VerificationConfig::default()
    };
    let source = HibpSource::with_client(reqwest::Client::new(), &config);
    let error = source.lookup(&RangeQuery::of(CANDIDATE)).await.unwrap_err();
    assert!(error.is_retryable(), "{error:?}");
}

#[tokio::test]
async fn test_probe_reports_reachable_provider_online() {
    use std::time::Duration;
    use warden::cancel::CancelToken;
    use warden::connectivity::{ConnectivityMonitor, ProbeConfig, connectivity_probe_worker};

    let app = Router::new().route("/", get(|| async { "ok" }));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let monitor = ConnectivityMonitor::new(false);
    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
    let probe = ProbeConfig {
        url: format!("http://{}/", addr),
        interval: Duration::from_millis(10),
        timeout: Duration::from_secs(2),
    };
    let worker = tokio::spawn(connectivity_probe_worker(
        monitor.clone(),
        reqwest::Client::new(),
        probe,
        shutdown_rx,
    ));

    monitor
        .wait_for_online(Duration::from_secs(5), &CancelToken::new())
        .await
        .unwrap();
    assert!(monitor.is_online());

    shutdown_tx.send(()).unwrap();
    worker.await.unwrap();
}
