//! Architectural Contract Test: Resolution and Backoff
//!
//! Constraints verified:
//! - A slow service never blocks a later service's answer
//! - The first valid answer in list order wins
//! - The interface fallback is consulted only after every service failed
//! - Total resolve failure grows the retry delay and never stops the loop
//! - CRITICAL fires exactly once when resilient mode is entered
//! - The first success resets the delay and reports the recovery

mod common;

use common::*;
use dyndns_core::address::{IpFamily, validate};
use dyndns_core::error::Error;
use dyndns_core::notification::{Level, NotificationDispatcher};
use dyndns_core::resolver::IpResolver;
use dyndns_core::traits::IpSource;
use dyndns_core::{HealthState, MemoryStateStore};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn slow_service_is_skipped_in_favor_of_next() {
    let slow = ScriptedIpSource::returning("slow", "198.51.100.9").delayed(Duration::from_secs(5));
    let fast = ScriptedIpSource::returning("fast", "203.0.113.5");
    let resolver = IpResolver::new(
        IpFamily::V4,
        vec![Arc::new(slow.clone()) as Arc<dyn IpSource>, Arc::new(fast.clone())],
    )
    .with_timeout(Duration::from_millis(100));

    let started = std::time::Instant::now();
    let address = tokio_test::assert_ok!(resolver.resolve().await);

    assert_eq!(address, validate("203.0.113.5", IpFamily::V4).unwrap());
    assert!(
        started.elapsed() < Duration::from_secs(2),
        "resolution must be bounded by the per-service timeout"
    );
    assert_eq!(fast.calls(), 1);
}

#[tokio::test]
async fn invalid_answers_fall_through_to_fallback() {
    let garbage = ScriptedIpSource::returning("garbage", "<html>rate limited</html>");
    let wrong_family = ScriptedIpSource::returning("v6-only", "2001:db8::1");
    let iface = ScriptedIpSource::returning("eth0", "192.0.2.44");
    let resolver = IpResolver::new(
        IpFamily::V4,
        vec![
            Arc::new(garbage) as Arc<dyn IpSource>,
            Arc::new(wrong_family),
        ],
    )
    .with_fallback(Arc::new(iface.clone()));

    let address = resolver.resolve().await.unwrap();
    assert_eq!(address.to_string(), "192.0.2.44");
    assert_eq!(iface.calls(), 1);
}

#[tokio::test]
async fn fallback_is_not_consulted_when_a_service_answers() {
    let service = ScriptedIpSource::returning("svc", "203.0.113.5");
    let iface = ScriptedIpSource::returning("eth0", "192.0.2.44");
    let resolver = IpResolver::new(IpFamily::V4, vec![Arc::new(service) as Arc<dyn IpSource>])
        .with_fallback(Arc::new(iface.clone()));

    resolver.resolve().await.unwrap();
    assert_eq!(iface.calls(), 0);
}

#[tokio::test]
async fn everything_failing_reports_no_address() {
    let resolver = IpResolver::new(
        IpFamily::V6,
        vec![Arc::new(ScriptedIpSource::failing("a")) as Arc<dyn IpSource>],
    )
    .with_fallback(Arc::new(ScriptedIpSource::failing("eth0")));

    assert!(matches!(
        resolver.resolve().await,
        Err(Error::NoAddressAvailable(IpFamily::V6))
    ));
}

#[tokio::test]
async fn outage_grows_delay_and_alerts_once() {
    let source = ScriptedIpSource::failing("svc");
    let provider = MockDnsProvider::new("home");
    let notifier = RecordingNotifier::default();
    let dispatcher = NotificationDispatcher::new(vec![catch_all(&notifier)]);
    let store = MemoryStateStore::new();
    let clock = manual_clock();
    let mut settings = fast_settings();
    settings.backoff = Default::default();

    let mut orchestrator = orchestrator(
        components(v4_resolvers(&[source.clone()]), &[&provider], dispatcher, settings),
        &store,
        &clock,
    )
    .await;

    let mut delays = Vec::new();
    let mut critical_cycles = Vec::new();
    for cycle in 1..=7 {
        let report = orchestrator.run_cycle().await;
        assert!(report.resolve_failed);
        delays.push(report.next_delay.as_secs());
        if report.levels().contains(&Level::Critical) {
            critical_cycles.push(cycle);
        }
    }

    assert_eq!(delays, vec![60, 120, 240, 480, 600, 600, 600]);
    assert_eq!(critical_cycles, vec![5], "CRITICAL must fire only on entry");
    assert_eq!(orchestrator.state().backoff().state(), HealthState::Backoff);
    assert_eq!(provider.call_count(), 0, "no provider is touched without an address");

    source.set("203.0.113.5");
    let report = orchestrator.run_cycle().await;

    assert!(!report.resolve_failed);
    assert_eq!(report.next_delay, orchestrator.components().settings.poll_interval);
    assert_eq!(orchestrator.state().backoff().health().consecutive_failures, 0);
    assert!(report.levels().contains(&Level::Info));
    assert!(
        notifier
            .messages()
            .iter()
            .any(|m| m.contains("restored after 7 failed attempts")),
        "recovery must be reported: {:?}",
        notifier.messages()
    );
}

#[tokio::test]
async fn single_failure_below_threshold_is_quiet() {
    let source = ScriptedIpSource::failing("svc");
    let notifier = RecordingNotifier::default();
    let dispatcher = NotificationDispatcher::new(vec![catch_all(&notifier)]);
    let store = MemoryStateStore::new();
    let clock = manual_clock();
    let provider = MockDnsProvider::new("home");

    let mut orchestrator = orchestrator(
        components(v4_resolvers(&[source.clone()]), &[&provider], dispatcher, fast_settings()),
        &store,
        &clock,
    )
    .await;

    orchestrator.run_cycle().await;
    assert_eq!(orchestrator.state().backoff().state(), HealthState::Degraded);

    source.set("203.0.113.5");
    orchestrator.run_cycle().await;

    assert_eq!(orchestrator.state().backoff().state(), HealthState::Normal);
    assert!(
        notifier.messages().iter().all(|m| !m.contains("restored")),
        "recovery is only reported after resilient mode"
    );
}
