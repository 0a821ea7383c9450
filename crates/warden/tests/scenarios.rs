//! End-to-end behaviour through the composed services.

mod common;

use std::time::Duration;

use common::{FakeSource, services};
use tokio_test::assert_err;
use warden::cancel::CancelToken;
use warden::validation::UserContext;
use warden_common::constants::messages;
use warden_common::{
    CircuitState, ErrorCategory, HibpStatus, Requirement, UnknownReason, VerificationVerdict,
    WardenError,
};

const STRONG: &str = "Ab3!Ab3!Ab";

async fn sleep_ms(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[tokio::test(start_paused = true)]
async fn test_strong_value_settles_valid_after_debounce() {
    let source = FakeSource::answering(0, Duration::from_millis(200));
    let services = services(source.clone());
    let orchestrator = services.orchestrator(UserContext::default());

    orchestrator.on_value_change(STRONG);
    sleep_ms(1250).await;

    let snapshot = orchestrator.snapshot();
    assert!(
        snapshot.requirements.values().all(|r| *r == Some(true)),
        "{:?}",
        snapshot.requirements
    );
    assert!(snapshot.is_valid);
    assert_eq!(snapshot.progress, 100);
    assert_eq!(snapshot.hibp, HibpStatus::Safe);
    assert_eq!(source.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_repeated_timeouts_open_circuit_and_fall_back() {
    let source = FakeSource::hanging();
    let services = services(source.clone());
    let orchestrator = services.orchestrator(UserContext::default());

    orchestrator.on_value_change(STRONG);
    sleep_ms(60_000).await;

    assert_eq!(source.calls(), 3);
    assert_eq!(services.circuit.state(), CircuitState::Open);

    let snapshot = orchestrator.snapshot();
    assert_eq!(snapshot.hibp, HibpStatus::Unavailable);
    assert!(snapshot.fallback_applied);
    assert!(snapshot.is_valid);
    assert_eq!(snapshot.requirement(Requirement::NotCompromised), None);
    assert!(snapshot.warnings.contains(&messages::NOT_CONFIRMED.to_string()));

    // Other candidates fail fast while the circuit is open.
    let outcome = services
        .client
        .check("Other!Value9", &CancelToken::new())
        .await;
    assert_eq!(
        outcome.verdict,
        VerificationVerdict::unknown(UnknownReason::ServiceUnavailable)
    );
    assert_eq!(source.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_rapid_short_values_issue_no_calls() {
    let source = FakeSource::answering(0, Duration::from_millis(10));
    let services = services(source.clone());
    let orchestrator = services.orchestrator(UserContext::default());

    for value in ["short", "short2", "short3"] {
        orchestrator.on_value_change(value);
        sleep_ms(300).await;
    }
    sleep_ms(2000).await;

    assert_eq!(source.calls(), 0);
    let snapshot = orchestrator.snapshot();
    assert_eq!(snapshot.requirement(Requirement::Length), Some(false));
    assert_eq!(snapshot.requirement(Requirement::Number), Some(true));
    assert_eq!(snapshot.hibp, HibpStatus::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_opens_circuit_with_api_classification() {
    let source = FakeSource::failing(WardenError::RateLimited {
        retry_after_secs: Some(30),
    });
    let services = services(source.clone());

    let outcome = services.client.check(STRONG, &CancelToken::new()).await;

    assert_eq!(
        outcome.verdict,
        VerificationVerdict::unknown(UnknownReason::RateLimited)
    );
    let handling = outcome.handling.expect("rate limit is handled");
    assert_eq!(handling.category, ErrorCategory::Api);
    assert_eq!(handling.handler, "rate-limit");
    assert!(handling.user_message.contains("temporarily unavailable"));
    assert!(handling.should_fallback);

    assert_eq!(services.circuit.state(), CircuitState::Open);
    assert_eq!(source.calls(), 1);
    assert_eq!(services.errors.stats()[&ErrorCategory::Api].count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_surfaces_as_warning_in_snapshot() {
    let source = FakeSource::failing(WardenError::RateLimited {
        retry_after_secs: None,
    });
    let services = services(source);
    let orchestrator = services.orchestrator(UserContext::default());

    orchestrator.on_value_change(STRONG);
    sleep_ms(1100).await;

    let snapshot = orchestrator.snapshot();
    assert_eq!(snapshot.hibp, HibpStatus::Unavailable);
    assert!(snapshot.is_valid);
    assert!(snapshot.warnings.contains(&messages::RATE_LIMITED.to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_circuit_admits_single_trial_after_cooldown() {
    let source = FakeSource::failing(WardenError::ServiceUnavailable("503".into()));
    let services = services(source.clone());
    let cancel = CancelToken::new();

    // One check, three failed attempts: threshold reached.
    services.client.check(STRONG, &cancel).await;
    assert_eq!(services.circuit.state(), CircuitState::Open);
    let calls = source.calls();

    sleep_ms(30_000).await;
    source.set_response(Ok(0));

    let verdict = services.client.verify("Fresh!Value1", &cancel).await;
    assert_eq!(verdict, VerificationVerdict::Safe);
    assert_eq!(source.calls(), calls + 1);
    assert_eq!(services.circuit.state(), CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_cached_verdict_avoids_second_call() {
    let source = FakeSource::answering(3, Duration::from_millis(50));
    let services = services(source.clone());
    let cancel = CancelToken::new();

    assert_eq!(
        services.client.verify(STRONG, &cancel).await,
        VerificationVerdict::Compromised
    );
    assert_eq!(
        services.client.verify(STRONG, &cancel).await,
        VerificationVerdict::Compromised
    );
    assert_eq!(source.calls(), 1);
    assert_eq!(services.cache.stats().positive_entries, 1);
}

#[tokio::test(start_paused = true)]
async fn test_queued_verification_runs_when_back_online() {
    let source = FakeSource::answering(0, Duration::from_millis(10));
    let services = services(source.clone());
    let _replay = services.offline.attach();

    services.connectivity.report(false);
    let verdict = services
        .client
        .verify_when_online(STRONG.to_string(), &services.offline);
    sleep_ms(100).await;
    assert_eq!(source.calls(), 0);
    assert_eq!(services.offline.len(), 1);

    services.connectivity.report(true);
    assert_eq!(verdict.await, Ok(VerificationVerdict::Safe));
    assert!(services.offline.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_too_short_candidate_is_rejected_before_any_call() {
    let source = FakeSource::answering(0, Duration::ZERO);
    let services = services(source.clone());

    assert_err!(services.client.try_verify("Ab3!", &CancelToken::new()).await);
    assert_eq!(source.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_offline_check_resolves_after_reconnect() {
    let source = FakeSource::failing(WardenError::Network("unreachable".into()));
    let services = services(source.clone());
    let _replay = services.offline.attach();
    let orchestrator = services.orchestrator(UserContext::default());

    services.connectivity.report(false);
    orchestrator.on_value_change(STRONG);
    sleep_ms(5000).await;

    // First attempt went out, the retry found the host offline.
    assert_eq!(source.calls(), 1);
    assert_eq!(services.offline.len(), 1);
    let snapshot = orchestrator.snapshot();
    assert_eq!(snapshot.hibp, HibpStatus::Unavailable);
    assert!(snapshot.fallback_applied);

    source.set_response(Ok(0));
    services.connectivity.report(true);
    sleep_ms(100).await;

    let snapshot = orchestrator.snapshot();
    assert_eq!(snapshot.hibp, HibpStatus::Safe);
    assert!(!snapshot.fallback_applied);
    assert_eq!(snapshot.requirement(Requirement::NotCompromised), Some(true));
    assert_eq!(source.calls(), 2);
    assert!(services.offline.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_superseded_offline_check_is_not_replayed() {
    let source = FakeSource::failing(WardenError::Network("unreachable".into()));
    let services = services(source.clone());
    let _replay = services.offline.attach();
    let orchestrator = services.orchestrator(UserContext::default());

    services.connectivity.report(false);
    orchestrator.on_value_change(STRONG);
    sleep_ms(5000).await;
    orchestrator.on_value_change("Newer!Value7");
    sleep_ms(5000).await;
    assert_eq!(source.calls(), 2);
    assert_eq!(services.offline.len(), 2);

    source.set_response(Ok(0));
    services.connectivity.report(true);
    sleep_ms(100).await;

    // Only the current value goes back out.
    assert_eq!(source.calls(), 3);
    assert_eq!(orchestrator.snapshot().hibp, HibpStatus::Safe);
    assert!(services.offline.is_empty());
}
