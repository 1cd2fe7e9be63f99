//! Test doubles and common utilities for orchestrator contract tests
//!
//! The doubles are scriptable and record every call so tests can assert
//! on what the orchestrator did, not just on what it returned.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use dyndns_core::address::IpFamily;
use dyndns_core::config::EngineSettings;
use dyndns_core::error::{Error, Result};
use dyndns_core::notification::{ChannelDescriptor, Level, NotificationDispatcher};
use dyndns_core::resolver::{IpResolver, Resolvers};
use dyndns_core::traits::{DnsProvider, IpSource, Notifier, UpdateResult};
use dyndns_core::{Components, ManualClock, MemoryStateStore, UpdateOrchestrator};
use std::collections::VecDeque;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// An IP source whose answer can be changed while the orchestrator runs
#[derive(Clone)]
pub struct ScriptedIpSource {
    name: &'static str,
    reply: Arc<Mutex<std::result::Result<String, String>>>,
    delay: Duration,
    calls: Arc<AtomicUsize>,
}

impl ScriptedIpSource {
    pub fn returning(name: &'static str, literal: &str) -> Self {
        Self {
            name,
            reply: Arc::new(Mutex::new(Ok(literal.to_string()))),
            delay: Duration::ZERO,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing(name: &'static str) -> Self {
        let source = Self::returning(name, "");
        source.fail();
        source
    }

    /// Answer only after `delay`
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn set(&self, literal: &str) {
        *self.reply.lock().unwrap() = Ok(literal.to_string());
    }

    pub fn fail(&self) {
        *self.reply.lock().unwrap() = Err("connection refused".to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IpSource for ScriptedIpSource {
    async fn fetch(&self, _family: IpFamily) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let reply = self.reply.lock().unwrap().clone();
        reply.map_err(Error::http)
    }

    fn describe(&self) -> String {
        self.name.to_string()
    }
}

/// A recorded `update_record` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateCall {
    pub ipv4: Option<Ipv4Addr>,
    pub ipv6: Option<Ipv6Addr>,
}

/// A mock DnsProvider that replays scripted results and records calls
///
/// Once the script is exhausted every call succeeds with `Updated`.
#[derive(Clone)]
pub struct MockDnsProvider {
    name: String,
    script: Arc<Mutex<VecDeque<Result<UpdateResult>>>>,
    calls: Arc<Mutex<Vec<UpdateCall>>>,
}

impl MockDnsProvider {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            script: Arc::new(Mutex::new(VecDeque::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queue the result of a future call
    pub fn then(self, result: Result<UpdateResult>) -> Self {
        self.script.lock().unwrap().push_back(result);
        self
    }

    pub fn calls(&self) -> Vec<UpdateCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn boxed(&self) -> Box<dyn DnsProvider> {
        Box::new(self.clone())
    }
}

#[async_trait]
impl DnsProvider for MockDnsProvider {
    fn validate_config(&self) -> Result<()> {
        Ok(())
    }

    async fn update_record(
        &self,
        ipv4: Option<Ipv4Addr>,
        ipv6: Option<Ipv6Addr>,
    ) -> Result<UpdateResult> {
        self.calls.lock().unwrap().push(UpdateCall { ipv4, ipv6 });
        let scripted = self.script.lock().unwrap().pop_front();
        scripted.unwrap_or(Ok(UpdateResult::Updated { ipv4, ipv6 }))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

/// A notifier that records every message
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    messages: Arc<Mutex<Vec<String>>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, message: &str, _subject: Option<&str>) -> Result<()> {
        self.messages.lock().unwrap().push(message.to_string());
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "recording"
    }
}

/// An enabled channel accepting `levels`
pub fn channel(
    name: &str,
    levels: &[Level],
    cooldown_minutes: u64,
    notifier: &RecordingNotifier,
) -> ChannelDescriptor {
    ChannelDescriptor {
        name: name.to_string(),
        enabled: true,
        notify_on: levels.iter().copied().collect(),
        cooldown_minutes,
        sender: Arc::new(notifier.clone()),
    }
}

/// A channel that accepts every level
pub fn catch_all(notifier: &RecordingNotifier) -> ChannelDescriptor {
    channel(
        "all",
        &[
            Level::Info,
            Level::Update,
            Level::Warning,
            Level::Error,
            Level::Critical,
        ],
        0,
        notifier,
    )
}

/// An IPv4-only resolver over the given sources
pub fn v4_resolvers(sources: &[ScriptedIpSource]) -> Resolvers {
    let sources: Vec<Arc<dyn IpSource>> = sources
        .iter()
        .map(|s| Arc::new(s.clone()) as Arc<dyn IpSource>)
        .collect();
    Resolvers {
        v4: Some(IpResolver::new(IpFamily::V4, sources).with_timeout(Duration::from_millis(200))),
        v6: None,
    }
}

/// Short intervals so run-loop tests finish quickly
pub fn fast_settings() -> EngineSettings {
    let mut settings = EngineSettings::default();
    settings.poll_interval = Duration::from_millis(20);
    settings.backoff.base_delay = Duration::from_millis(10);
    settings.backoff.max_delay = Duration::from_millis(50);
    settings
}

pub fn components(
    resolvers: Resolvers,
    providers: &[&MockDnsProvider],
    dispatcher: NotificationDispatcher,
    settings: EngineSettings,
) -> Components {
    Components {
        resolvers,
        providers: providers.iter().map(|p| p.boxed()).collect(),
        dispatcher,
        settings,
    }
}

pub fn manual_clock() -> ManualClock {
    ManualClock::new(Utc.with_ymd_and_hms(2025, 1, 9, 12, 0, 0).unwrap())
}

/// Build an orchestrator over a memory store
pub async fn orchestrator(
    components: Components,
    store: &MemoryStateStore,
    clock: &ManualClock,
) -> UpdateOrchestrator {
    let (orchestrator, _events) = UpdateOrchestrator::new(
        components,
        Arc::new(store.clone()),
        Arc::new(clock.clone()),
        false,
    )
    .await;
    orchestrator
}
