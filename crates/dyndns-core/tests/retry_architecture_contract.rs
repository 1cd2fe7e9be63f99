//! Architectural Contract Test: Retry Architecture
//!
//! Constraints verified:
//! - One failing provider never prevents the others from being called
//! - A failed provider is retried on the next cycle even if nothing changed
//! - A rate-limited provider is held back until its hold expires
//! - Every failure produces exactly one ERROR notification
//! - Notification cooldowns are honored and persisted

mod common;

use chrono::Duration as ChronoDuration;
use common::*;
use dyndns_core::engine::ProviderAction;
use dyndns_core::error::Error;
use dyndns_core::notification::{DeliveryStatus, Level, NotificationDispatcher, SkipReason};
use dyndns_core::traits::{FailureReason, UpdateOutcome};
use dyndns_core::MemoryStateStore;
use std::time::Duration;

#[tokio::test]
async fn rate_limited_provider_is_isolated_and_held() {
    let source = ScriptedIpSource::returning("svc", "198.51.100.1");
    let limited = MockDnsProvider::new("limited").then(Err(Error::rate_limited("HTTP 429")));
    let healthy = MockDnsProvider::new("healthy");
    let notifier = RecordingNotifier::default();
    let dispatcher = NotificationDispatcher::new(vec![catch_all(&notifier)]);
    let store = MemoryStateStore::new();
    let clock = manual_clock();
    let mut settings = fast_settings();
    settings.rate_limit_hold = Duration::from_secs(300);

    let mut orchestrator = orchestrator(
        components(v4_resolvers(&[source]), &[&limited, &healthy], dispatcher, settings),
        &store,
        &clock,
    )
    .await;

    let report = orchestrator.run_cycle().await;

    assert_eq!(
        report.outcome_of("limited"),
        Some(&ProviderAction::Attempted(UpdateOutcome::Failed(
            FailureReason::RateLimited
        )))
    );
    assert!(matches!(
        report.outcome_of("healthy"),
        Some(ProviderAction::Attempted(UpdateOutcome::Updated { .. }))
    ));
    assert_eq!(healthy.call_count(), 1);

    let errors: Vec<String> = notifier
        .messages()
        .into_iter()
        .filter(|m| m.contains("Update failed"))
        .collect();
    assert_eq!(errors, vec!["[limited] Update failed: rate limited".to_string()]);
    assert_eq!(
        report.levels().iter().filter(|l| **l == Level::Error).count(),
        1
    );

    // Still inside the hold: skipped, still pending
    clock.advance(ChronoDuration::seconds(120));
    let report = orchestrator.run_cycle().await;
    assert!(matches!(
        report.outcome_of("limited"),
        Some(ProviderAction::HeldBack { .. })
    ));
    assert_eq!(limited.call_count(), 1);
    assert_eq!(healthy.call_count(), 1, "healthy provider is not re-pushed");
    assert!(orchestrator.state().pending_retry().contains("limited"));

    // Hold expired: retried and cleared
    clock.advance(ChronoDuration::seconds(181));
    let report = orchestrator.run_cycle().await;
    assert!(matches!(
        report.outcome_of("limited"),
        Some(ProviderAction::Attempted(UpdateOutcome::Updated { .. }))
    ));
    assert_eq!(limited.call_count(), 2);
    assert!(orchestrator.state().pending_retry().is_empty());
    assert!(orchestrator.state().rate_limit_holds().is_empty());
}

#[tokio::test]
async fn transient_failure_is_retried_next_cycle() {
    let source = ScriptedIpSource::returning("svc", "198.51.100.1");
    let flaky = MockDnsProvider::new("flaky").then(Err(Error::http("HTTP 503")));
    let steady = MockDnsProvider::new("steady");
    let store = MemoryStateStore::new();
    let clock = manual_clock();

    let mut orchestrator = orchestrator(
        components(
            v4_resolvers(&[source]),
            &[&flaky, &steady],
            NotificationDispatcher::default(),
            fast_settings(),
        ),
        &store,
        &clock,
    )
    .await;

    let report = orchestrator.run_cycle().await;
    assert_eq!(
        report.outcome_of("flaky"),
        Some(&ProviderAction::Attempted(UpdateOutcome::Failed(
            FailureReason::Transient
        )))
    );

    let report = orchestrator.run_cycle().await;
    assert!(report.changed.is_empty());
    assert_eq!(flaky.call_count(), 2, "pending provider is retried");
    assert_eq!(steady.call_count(), 1, "settled provider is left alone");
    assert!(report.outcome_of("steady").is_none());
    assert!(orchestrator.state().pending_retry().is_empty());
}

#[tokio::test]
async fn authentication_failure_keeps_retrying() {
    let source = ScriptedIpSource::returning("svc", "198.51.100.1");
    let locked = MockDnsProvider::new("locked")
        .then(Err(Error::auth("badauth")))
        .then(Err(Error::auth("badauth")));
    let store = MemoryStateStore::new();
    let clock = manual_clock();

    let mut orchestrator = orchestrator(
        components(
            v4_resolvers(&[source]),
            &[&locked],
            NotificationDispatcher::default(),
            fast_settings(),
        ),
        &store,
        &clock,
    )
    .await;

    let first = orchestrator.run_cycle().await;
    let second = orchestrator.run_cycle().await;

    for report in [&first, &second] {
        assert_eq!(
            report.outcome_of("locked"),
            Some(&ProviderAction::Attempted(UpdateOutcome::Failed(
                FailureReason::Authentication
            )))
        );
    }
    assert!(orchestrator.state().rate_limit_holds().is_empty());
    assert!(orchestrator.state().pending_retry().contains("locked"));
}

#[tokio::test]
async fn notification_cooldown_is_honored_and_persisted() {
    let source = ScriptedIpSource::returning("svc", "198.51.100.1");
    let provider = MockDnsProvider::new("home")
        .then(Err(Error::http("HTTP 502")))
        .then(Err(Error::http("HTTP 502")))
        .then(Err(Error::http("HTTP 502")));
    let notifier = RecordingNotifier::default();
    let dispatcher =
        NotificationDispatcher::new(vec![channel("alerts", &[Level::Error], 30, &notifier)]);
    let store = MemoryStateStore::new();
    let clock = manual_clock();

    let mut orchestrator = orchestrator(
        components(v4_resolvers(&[source]), &[&provider], dispatcher, fast_settings()),
        &store,
        &clock,
    )
    .await;

    orchestrator.run_cycle().await;
    assert_eq!(notifier.messages().len(), 1);
    assert!(store.cooldowns().await.contains_key("alerts"));

    clock.advance(ChronoDuration::minutes(10));
    let report = orchestrator.run_cycle().await;
    let (_, dispatch) = &report.notifications[0];
    assert_eq!(
        dispatch.status_of("alerts"),
        Some(&DeliveryStatus::Skipped(SkipReason::CoolingDown))
    );
    assert_eq!(notifier.messages().len(), 1);

    clock.advance(ChronoDuration::minutes(21));
    orchestrator.run_cycle().await;
    assert_eq!(notifier.messages().len(), 2);
}
