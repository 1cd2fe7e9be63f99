//! Update orchestrator
//!
//! The UpdateOrchestrator is responsible for:
//! - Resolving the current address of every enabled family on a timer
//! - Feeding resolve failures into the backoff controller
//! - Pushing changed addresses to every provider
//! - Retrying failed providers and holding back rate-limited ones
//! - Persisting the last known addresses once every provider has them
//! - Emitting notifications and lifecycle events
//!
//! ## Architecture
//!
//! ```text
//!            timer tick / reload
//!                    │
//!                    ▼
//!            ┌──────────────┐  all failed   ┌───────────────────┐
//!            │  Resolving   │──────────────▶│ BackoffController │
//!            └──────────────┘               └───────────────────┘
//!                    │ ok
//!                    ▼
//!            ┌──────────────┐  unchanged    ┌──────────────┐
//!            │   Diffing    │──────────────▶│ INFO, Idle   │
//!            └──────────────┘               └──────────────┘
//!                    │ changed / pending retry
//!                    ▼
//!            ┌──────────────┐               ┌──────────────┐
//!            │   Updating   │──────────────▶│  StateStore  │
//!            └──────────────┘               └──────────────┘
//!                    │
//!                    ▼
//!            ┌──────────────┐
//!            │  Notifying   │──▶ NotificationDispatcher
//!            └──────────────┘
//! ```
//!
//! ## Threading
//!
//! Everything runs on the task that calls [`UpdateOrchestrator::run`].
//! Fresh components from a configuration reload arrive over an mpsc channel
//! and are applied only between cycles, so a cycle never observes a
//! half-swapped configuration.

use crate::address::{Address, IpFamily};
use crate::backoff::BackoffController;
use crate::clock::Clock;
use crate::config::EngineSettings;
use crate::notification::{CooldownTracker, DispatchReport, Event, Level, NotificationDispatcher};
use crate::resolver::Resolvers;
use crate::traits::{
    CooldownMap, DnsProvider, FailureReason, LastKnownIp, StateStore, UpdateOutcome,
};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, info, warn};

/// Capacity of the reload channel; only the latest configuration matters
const RELOAD_CHANNEL_CAPACITY: usize = 4;

/// Everything a configuration load produces
pub struct Components {
    pub resolvers: Resolvers,
    /// Providers that passed validation, in configuration order
    pub providers: Vec<Box<dyn DnsProvider>>,
    pub dispatcher: NotificationDispatcher,
    pub settings: EngineSettings,
}

impl std::fmt::Debug for Components {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Components")
            .field("resolvers", &self.resolvers)
            .field(
                "providers",
                &self.providers.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .field("dispatcher", &self.dispatcher)
            .field("settings", &self.settings)
            .finish()
    }
}

/// Control loop phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Resolving,
    Diffing,
    Updating,
    Notifying,
    Shutdown,
}

/// Events emitted by the UpdateOrchestrator
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Orchestrator started
    Started { providers_count: usize },

    /// A cycle entered `Resolving`
    CycleStarted { cycle: u64 },

    /// A family resolved
    AddressResolved { address: Address },

    /// Every enabled family failed to resolve
    ResolveFailed {
        consecutive_failures: u32,
        next_retry: Duration,
    },

    /// The failure threshold was reached
    ResilientModeEntered { consecutive_failures: u32 },

    /// The first success after a failure run
    NetworkRecovered { previous_failures: u32 },

    /// A family's address differs from the last known one
    AddressChanged {
        family: IpFamily,
        previous: Option<Address>,
        current: Address,
    },

    /// Nothing to push this cycle
    AddressUnchanged,

    /// A provider changed its records
    ProviderUpdated {
        provider: String,
        ipv4: Option<Ipv4Addr>,
        ipv6: Option<Ipv6Addr>,
    },

    /// A provider already had the addresses
    ProviderUnchanged { provider: String },

    /// A provider call failed
    ProviderFailed {
        provider: String,
        reason: FailureReason,
    },

    /// A provider was skipped because it is rate-limited
    ProviderHeld {
        provider: String,
        until: DateTime<Utc>,
    },

    /// Last known addresses were written to the state store
    StatePersisted { families: Vec<IpFamily> },

    /// A notification was fanned out
    NotificationDispatched {
        level: Level,
        attempted: usize,
        sent: usize,
    },

    /// New components were applied
    ConfigReloaded { providers_count: usize },

    /// Orchestrator stopped
    Stopped { reason: String },
}

/// What happened to one provider in a cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderAction {
    /// `update` was called
    Attempted(UpdateOutcome),
    /// Skipped: rate-limit hold still active
    HeldBack { until: DateTime<Utc> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderReport {
    pub provider: String,
    pub action: ProviderAction,
}

/// Result of one cycle
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    /// Addresses resolved this cycle
    pub resolved: LastKnownIp,
    /// True when every enabled family failed
    pub resolve_failed: bool,
    /// Families whose address changed
    pub changed: Vec<IpFamily>,
    /// Providers touched this cycle, in order
    pub providers: Vec<ProviderReport>,
    /// Notifications fanned out this cycle
    pub notifications: Vec<(Level, DispatchReport)>,
    /// Wait before the next cycle
    pub next_delay: Duration,
}

impl CycleReport {
    pub fn outcome_of(&self, provider: &str) -> Option<&ProviderAction> {
        self.providers
            .iter()
            .find(|p| p.provider == provider)
            .map(|p| &p.action)
    }

    pub fn levels(&self) -> Vec<Level> {
        self.notifications.iter().map(|(level, _)| *level).collect()
    }
}

/// State owned by the control loop
#[derive(Debug)]
pub struct OrchestratorState {
    backoff: BackoffController,
    last_known: LastKnownIp,
    /// What the state store holds
    persisted: LastKnownIp,
    cooldowns: CooldownTracker,
    pending_retry: HashSet<String>,
    rate_limit_holds: HashMap<String, DateTime<Utc>>,
    first_cycle: bool,
    cycles: u64,
    phase: Phase,
}

impl OrchestratorState {
    pub fn backoff(&self) -> &BackoffController {
        &self.backoff
    }

    pub fn last_known(&self) -> LastKnownIp {
        self.last_known
    }

    pub fn cooldowns(&self) -> &CooldownTracker {
        &self.cooldowns
    }

    /// Providers whose last attempt failed
    pub fn pending_retry(&self) -> &HashSet<String> {
        &self.pending_retry
    }

    /// Providers held back after a rate limit, with the hold's end
    pub fn rate_limit_holds(&self) -> &HashMap<String, DateTime<Utc>> {
        &self.rate_limit_holds
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }
}

/// The top-level driver
///
/// ## Lifecycle
///
/// 1. Create with [`UpdateOrchestrator::new()`] (loads persisted state)
/// 2. Optionally grab [`reload_handle()`](Self::reload_handle)
/// 3. Start with [`run()`](Self::run); returns on SIGINT/SIGTERM
pub struct UpdateOrchestrator {
    components: Components,
    state_store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
    state: OrchestratorState,
    event_tx: mpsc::Sender<EngineEvent>,
    reload_tx: mpsc::Sender<Components>,
    reload_rx: mpsc::Receiver<Components>,
}

impl UpdateOrchestrator {
    /// Create an orchestrator and load persisted state
    ///
    /// Unreadable state is logged and treated as absent. With
    /// `reset_cooldown_on_start`, persisted cooldowns are discarded.
    ///
    /// # Returns
    ///
    /// A tuple of (orchestrator, event_receiver) where event_receiver yields engine events
    pub async fn new(
        components: Components,
        state_store: Arc<dyn StateStore>,
        clock: Arc<dyn Clock>,
        reset_cooldown_on_start: bool,
    ) -> (Self, mpsc::Receiver<EngineEvent>) {
        let mut last_known = LastKnownIp::default();
        for family in IpFamily::ALL {
            match state_store.load_last_ip(family).await {
                Ok(Some(address)) => {
                    info!("Last known {} address: {}", family, address);
                    last_known.set(address);
                }
                Ok(None) => debug!("No last known {} address", family),
                Err(e) => warn!("Failed to load last known {} address: {}", family, e),
            }
        }

        let mut cooldowns = CooldownTracker::new(clock.clone());
        if reset_cooldown_on_start {
            info!("Resetting notification cooldowns");
            if let Err(e) = state_store.save_cooldowns(&CooldownMap::new()).await {
                warn!("Failed to reset persisted cooldowns: {}", e);
            }
        } else {
            match state_store.load_cooldowns().await {
                Ok(map) => cooldowns.restore(map),
                Err(e) => warn!("Failed to load notification cooldowns: {}", e),
            }
        }

        let (event_tx, event_rx) =
            mpsc::channel(components.settings.event_channel_capacity.max(1));
        let (reload_tx, reload_rx) = mpsc::channel(RELOAD_CHANNEL_CAPACITY);

        let state = OrchestratorState {
            backoff: BackoffController::new(components.settings.backoff),
            last_known,
            persisted: last_known,
            cooldowns,
            pending_retry: HashSet::new(),
            rate_limit_holds: HashMap::new(),
            first_cycle: true,
            cycles: 0,
            phase: Phase::Idle,
        };

        let orchestrator = Self {
            components,
            state_store,
            clock,
            state,
            event_tx,
            reload_tx,
            reload_rx,
        };

        (orchestrator, event_rx)
    }

    /// Sender for freshly built components (configuration reload)
    pub fn reload_handle(&self) -> mpsc::Sender<Components> {
        self.reload_tx.clone()
    }

    pub fn state(&self) -> &OrchestratorState {
        &self.state
    }

    pub fn components(&self) -> &Components {
        &self.components
    }

    /// Run until SIGINT/SIGTERM
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Clean shutdown
    /// - `Err(Error)`: Fatal error
    pub async fn run(&mut self) -> crate::Result<()> {
        self.run_internal(None).await
    }

    /// Run until the given receiver fires (or its sender is dropped)
    ///
    /// Embedders and tests use this instead of OS signals.
    pub async fn run_with_shutdown(
        &mut self,
        shutdown_rx: Option<oneshot::Receiver<()>>,
    ) -> crate::Result<()> {
        self.run_internal(shutdown_rx).await
    }

    async fn run_internal(&mut self, shutdown_rx: Option<oneshot::Receiver<()>>) -> crate::Result<()> {
        self.emit_event(EngineEvent::Started {
            providers_count: self.components.providers.len(),
        });
        info!(
            "Orchestrator started with {} provider(s), polling every {:?}",
            self.components.providers.len(),
            self.components.settings.poll_interval
        );

        let mut shutdown: Pin<Box<dyn Future<Output = ()> + Send>> = match shutdown_rx {
            Some(rx) => Box::pin(async move {
                let _ = rx.await;
            }),
            None => Box::pin(shutdown_signal()),
        };

        loop {
            let report = tokio::select! {
                report = self.run_cycle() => report,
                _ = &mut shutdown => break,
            };

            debug!("Next cycle in {:?}", report.next_delay);
            tokio::select! {
                _ = tokio::time::sleep(report.next_delay) => {}
                Some(components) = self.reload_rx.recv() => {
                    self.apply_components(components);
                }
                _ = &mut shutdown => break,
            }
        }

        info!("Shutdown signal received");
        self.state.phase = Phase::Shutdown;
        self.persist_cooldowns().await;
        self.emit_event(EngineEvent::Stopped {
            reason: "Shutdown signal".to_string(),
        });
        info!("Orchestrator stopped");

        Ok(())
    }

    /// Swap in freshly built components
    ///
    /// Providers that did not exist before are queued for the next
    /// cycle so they receive the current address even if it is unchanged.
    pub fn apply_components(&mut self, components: Components) {
        let known: HashSet<&str> = self.components.providers.iter().map(|p| p.name()).collect();
        let added: Vec<String> = components
            .providers
            .iter()
            .map(|p| p.name())
            .filter(|name| !known.contains(name))
            .map(str::to_string)
            .collect();

        let current: HashSet<&str> = components.providers.iter().map(|p| p.name()).collect();
        self.state.pending_retry.retain(|name| current.contains(name.as_str()));
        self.state
            .rate_limit_holds
            .retain(|name, _| current.contains(name.as_str()));
        self.state.pending_retry.extend(added);

        self.state.backoff.set_policy(components.settings.backoff);
        let providers_count = components.providers.len();
        self.components = components;

        info!("Configuration reloaded: {} provider(s)", providers_count);
        self.emit_event(EngineEvent::ConfigReloaded { providers_count });
    }

    /// Run one full cycle
    pub async fn run_cycle(&mut self) -> CycleReport {
        self.state.cycles += 1;
        self.state.phase = Phase::Resolving;
        self.emit_event(EngineEvent::CycleStarted {
            cycle: self.state.cycles,
        });

        let mut report = CycleReport::default();
        let mut notifications = Vec::new();

        for family in self.components.resolvers.families() {
            let Some(resolver) = self.components.resolvers.get(family) else {
                continue;
            };
            match resolver.resolve().await {
                Ok(address) => {
                    report.resolved.set(address);
                    self.emit_event(EngineEvent::AddressResolved { address });
                }
                Err(e) => warn!("{} resolution failed: {}", family, e),
            }
        }

        if report.resolved.v4.is_none() && report.resolved.v6.is_none() {
            self.handle_resolve_failure(&mut report, &mut notifications);
            self.notify_all(notifications, &mut report).await;
            self.state.phase = Phase::Idle;
            return report;
        }

        let recovery = self.state.backoff.record_success();
        if recovery.left_resilient_mode {
            self.emit_event(EngineEvent::NetworkRecovered {
                previous_failures: recovery.previous_failures,
            });
            notifications.push(
                Event::new(
                    Level::Info,
                    format!(
                        "Network connectivity restored after {} failed attempts",
                        recovery.previous_failures
                    ),
                )
                .with_subject("DynDNS network recovered"),
            );
        }
        report.next_delay = self.components.settings.poll_interval;

        // Diffing
        self.state.phase = Phase::Diffing;
        for family in IpFamily::ALL {
            let Some(current) = report.resolved.get(family) else {
                continue;
            };
            let previous = self.state.last_known.get(family);
            if previous != Some(current) {
                info!(
                    "{} address changed: {} -> {}",
                    family,
                    previous.map(|a| a.to_string()).unwrap_or_else(|| "none".to_string()),
                    current
                );
                report.changed.push(family);
                self.emit_event(EngineEvent::AddressChanged {
                    family,
                    previous,
                    current,
                });
            }
        }

        let startup_push = self.state.first_cycle && !self.components.settings.skip_update_on_startup;
        if self.state.first_cycle && report.changed.is_empty() && !startup_push {
            info!("Address unchanged since last run, skipping startup update");
        }
        self.state.first_cycle = false;

        let push_all = !report.changed.is_empty() || startup_push;
        if !push_all && self.state.pending_retry.is_empty() {
            info!("IP unchanged ({})", describe(&report.resolved));
            self.emit_event(EngineEvent::AddressUnchanged);
            notifications.push(Event::new(
                Level::Info,
                format!("IP unchanged: {}", describe(&report.resolved)),
            ));
            self.persist_last_known(&report.resolved).await;
            self.notify_all(notifications, &mut report).await;
            self.state.phase = Phase::Idle;
            return report;
        }

        // Updating
        self.state.phase = Phase::Updating;
        self.update_providers(push_all, &mut report, &mut notifications).await;
        self.persist_last_known(&report.resolved).await;

        // Notifying
        self.notify_all(notifications, &mut report).await;
        self.state.phase = Phase::Idle;
        report
    }

    fn handle_resolve_failure(&mut self, report: &mut CycleReport, notifications: &mut Vec<Event>) {
        report.resolve_failed = true;
        let outcome = self.state.backoff.record_failure();
        report.next_delay = outcome.delay;

        warn!(
            "No address available ({} consecutive failures), retrying in {:?}",
            outcome.consecutive_failures, outcome.delay
        );
        self.emit_event(EngineEvent::ResolveFailed {
            consecutive_failures: outcome.consecutive_failures,
            next_retry: outcome.delay,
        });

        if outcome.entered_resilient_mode {
            self.emit_event(EngineEvent::ResilientModeEntered {
                consecutive_failures: outcome.consecutive_failures,
            });
            notifications.push(
                Event::new(
                    Level::Critical,
                    format!(
                        "No network connectivity after {} consecutive failures; entering resilient mode, retrying every {}s at most",
                        outcome.consecutive_failures,
                        self.state.backoff.policy().max_delay.as_secs()
                    ),
                )
                .with_subject("DynDNS network outage"),
            );
        }
    }

    async fn update_providers(
        &mut self,
        push_all: bool,
        report: &mut CycleReport,
        notifications: &mut Vec<Event>,
    ) {
        let ipv4 = report.resolved.v4.and_then(|a| a.as_v4());
        let ipv6 = report.resolved.v6.and_then(|a| a.as_v6());
        let hold = chrono::Duration::from_std(self.components.settings.rate_limit_hold)
            .unwrap_or(chrono::Duration::MAX);

        for provider in &self.components.providers {
            let name = provider.name().to_string();
            if !push_all && !self.state.pending_retry.contains(&name) {
                continue;
            }

            let now = self.clock.now();
            if let Some(until) = self.state.rate_limit_holds.get(&name).copied() {
                if now < until {
                    debug!("[{}] rate-limit hold active until {}", name, until);
                    self.state.pending_retry.insert(name.clone());
                    self.emit_event(EngineEvent::ProviderHeld {
                        provider: name.clone(),
                        until,
                    });
                    report.providers.push(ProviderReport {
                        provider: name,
                        action: ProviderAction::HeldBack { until },
                    });
                    continue;
                }
                self.state.rate_limit_holds.remove(&name);
            }

            let outcome = provider.update(ipv4, ipv6).await;
            let event = match &outcome {
                UpdateOutcome::Updated { ipv4: new4, ipv6: new6 } => {
                    info!("[{}] records updated", name);
                    self.state.pending_retry.remove(&name);
                    notifications.push(
                        Event::new(
                            Level::Update,
                            format!("IP updated: {}", describe_pair(new4.or(ipv4), new6.or(ipv6))),
                        )
                        .from_provider(name.clone())
                        .with_subject("DynDNS update"),
                    );
                    EngineEvent::ProviderUpdated {
                        provider: name.clone(),
                        ipv4: *new4,
                        ipv6: *new6,
                    }
                }
                UpdateOutcome::Unchanged => {
                    info!("[{}] records already up to date", name);
                    self.state.pending_retry.remove(&name);
                    EngineEvent::ProviderUnchanged {
                        provider: name.clone(),
                    }
                }
                UpdateOutcome::Failed(reason) => {
                    error!("[{}] update failed: {}", name, reason);
                    self.state.pending_retry.insert(name.clone());
                    if *reason == FailureReason::RateLimited {
                        let until = now.checked_add_signed(hold).unwrap_or(DateTime::<Utc>::MAX_UTC);
                        warn!("[{}] rate limited, holding back until {}", name, until);
                        self.state.rate_limit_holds.insert(name.clone(), until);
                    }
                    notifications.push(
                        Event::new(Level::Error, format!("Update failed: {}", reason))
                            .from_provider(name.clone())
                            .with_subject("DynDNS error"),
                    );
                    EngineEvent::ProviderFailed {
                        provider: name.clone(),
                        reason: *reason,
                    }
                }
            };
            self.emit_event(event);

            report.providers.push(ProviderReport {
                provider: name,
                action: ProviderAction::Attempted(outcome),
            });
        }
    }

    /// Record the resolved addresses and write them once no provider owes a retry
    ///
    /// While a provider is pending the stored address stays at the last
    /// fully published one, so a restart diffs against it and pushes again.
    async fn persist_last_known(&mut self, resolved: &LastKnownIp) {
        for family in IpFamily::ALL {
            if let Some(address) = resolved.get(family) {
                self.state.last_known.set(address);
            }
        }
        if !self.state.pending_retry.is_empty() {
            info!(
                "Not persisting {} while {} provider(s) await a retry",
                describe(resolved),
                self.state.pending_retry.len()
            );
            return;
        }

        let mut families = Vec::new();
        for family in IpFamily::ALL {
            let Some(address) = resolved.get(family) else {
                continue;
            };
            if self.state.persisted.get(family) == Some(address) {
                continue;
            }
            match self.state_store.save_last_ip(&address).await {
                Ok(()) => {
                    self.state.persisted.set(address);
                    families.push(family);
                }
                Err(e) => error!("Failed to persist last {} address: {}", family, e),
            }
        }
        if !families.is_empty() {
            self.emit_event(EngineEvent::StatePersisted { families });
        }
    }

    async fn notify_all(&mut self, events: Vec<Event>, report: &mut CycleReport) {
        if events.is_empty() {
            return;
        }
        self.state.phase = Phase::Notifying;

        for event in events {
            let dispatch = self
                .components
                .dispatcher
                .dispatch(&event, &mut self.state.cooldowns)
                .await;
            self.emit_event(EngineEvent::NotificationDispatched {
                level: event.level,
                attempted: dispatch.attempted(),
                sent: dispatch.sent(),
            });
            report.notifications.push((event.level, dispatch));
        }

        self.persist_cooldowns().await;
    }

    async fn persist_cooldowns(&mut self) {
        if !self.state.cooldowns.is_dirty() {
            return;
        }
        match self
            .state_store
            .save_cooldowns(&self.state.cooldowns.snapshot())
            .await
        {
            Ok(()) => self.state.cooldowns.mark_saved(),
            Err(e) => warn!("Failed to persist notification cooldowns: {}", e),
        }
    }

    /// Emit an engine event
    ///
    /// The channel is bounded; when it is full the event is dropped.
    fn emit_event(&self, event: EngineEvent) {
        if let Err(TrySendError::Full(event)) = self.event_tx.try_send(event) {
            debug!("Event channel full, dropping event: {:?}", event);
        }
    }
}

/// Resolves on SIGINT, or SIGTERM on unix
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

fn describe(addresses: &LastKnownIp) -> String {
    describe_pair(
        addresses.v4.and_then(|a| a.as_v4()),
        addresses.v6.and_then(|a| a.as_v6()),
    )
}

fn describe_pair(ipv4: Option<Ipv4Addr>, ipv6: Option<Ipv6Addr>) -> String {
    match (ipv4, ipv6) {
        (Some(v4), Some(v6)) => format!("IPv4 {}, IPv6 {}", v4, v6),
        (Some(v4), None) => format!("IPv4 {}", v4),
        (None, Some(v6)) => format!("IPv6 {}", v6),
        (None, None) => "no address".to_string(),
    }
}
