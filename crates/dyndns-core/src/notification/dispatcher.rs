//! Channel fan-out
//!
//! For every channel of the applicable configuration, in order:
//!
//! ```text
//! enabled? ── no ──▶ Skipped(Disabled)
//!    │ yes
//! level in notify_on? ── no ──▶ Skipped(LevelFiltered)
//!    │ yes
//! cooldown elapsed? ── no ──▶ Skipped(CoolingDown)
//!    │ yes
//! record timestamp, send ──▶ Sent | SendFailed
//! ```
//!
//! The timestamp is recorded before the send, so a channel whose transport
//! keeps failing is still held to its cooldown.

use super::{CooldownTracker, Event, Level};
use crate::traits::Notifier;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Upper bound on a single channel send
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// One configured channel
#[derive(Clone)]
pub struct ChannelDescriptor {
    /// Channel name from the configuration (e.g. "discord")
    pub name: String,
    pub enabled: bool,
    /// Levels this channel accepts
    pub notify_on: HashSet<Level>,
    /// Minimum minutes between two sends; 0 disables the cooldown
    pub cooldown_minutes: u64,
    pub sender: Arc<dyn Notifier>,
}

impl std::fmt::Debug for ChannelDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelDescriptor")
            .field("name", &self.name)
            .field("kind", &self.sender.kind())
            .field("enabled", &self.enabled)
            .field("notify_on", &self.notify_on)
            .field("cooldown_minutes", &self.cooldown_minutes)
            .finish()
    }
}

/// Why a channel did not send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    LevelFiltered,
    CoolingDown,
}

/// What happened on one channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryStatus {
    Sent,
    /// The send was attempted and failed; the cooldown still applies
    SendFailed(String),
    Skipped(SkipReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelDelivery {
    pub channel: String,
    /// Cooldown key (namespaced for per-provider channels)
    pub key: String,
    pub status: DeliveryStatus,
}

/// Per-channel results of one dispatch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub deliveries: Vec<ChannelDelivery>,
}

impl DispatchReport {
    /// Number of channels where a send was attempted
    pub fn attempted(&self) -> usize {
        self.deliveries
            .iter()
            .filter(|d| !matches!(d.status, DeliveryStatus::Skipped(_)))
            .count()
    }

    /// Number of channels that delivered successfully
    pub fn sent(&self) -> usize {
        self.deliveries
            .iter()
            .filter(|d| d.status == DeliveryStatus::Sent)
            .count()
    }

    pub fn status_of(&self, channel: &str) -> Option<&DeliveryStatus> {
        self.deliveries
            .iter()
            .find(|d| d.channel == channel)
            .map(|d| &d.status)
    }
}

/// Fans events out to channels
#[derive(Debug, Clone)]
pub struct NotificationDispatcher {
    channels: Vec<ChannelDescriptor>,
    overrides: HashMap<String, Vec<ChannelDescriptor>>,
    send_timeout: Duration,
}

impl Default for NotificationDispatcher {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl NotificationDispatcher {
    /// Dispatcher over the global channel list
    pub fn new(channels: Vec<ChannelDescriptor>) -> Self {
        Self {
            channels,
            overrides: HashMap::new(),
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }

    /// Replace the channels used for events from `provider`
    pub fn with_provider_override(
        mut self,
        provider: impl Into<String>,
        channels: Vec<ChannelDescriptor>,
    ) -> Self {
        self.overrides.insert(provider.into(), channels);
        self
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// True when no channel is configured anywhere
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty() && self.overrides.values().all(Vec::is_empty)
    }

    /// Deliver `event` to every eligible channel
    pub async fn dispatch(&self, event: &Event, tracker: &mut CooldownTracker) -> DispatchReport {
        let (channels, namespace) = event
            .source_provider
            .as_deref()
            .and_then(|p| self.overrides.get(p).map(|c| (c, Some(p))))
            .unwrap_or((&self.channels, None));

        let message = event.render();
        let mut report = DispatchReport::default();

        for channel in channels {
            let key = match namespace {
                Some(provider) => format!("{}/{}", provider, channel.name),
                None => channel.name.clone(),
            };

            let status = if !channel.enabled {
                DeliveryStatus::Skipped(SkipReason::Disabled)
            } else if !channel.notify_on.contains(&event.level) {
                DeliveryStatus::Skipped(SkipReason::LevelFiltered)
            } else if !tracker.can_send(&key, channel.cooldown_minutes) {
                debug!("Notification channel {} is cooling down", key);
                DeliveryStatus::Skipped(SkipReason::CoolingDown)
            } else {
                tracker.record_sent(&key);
                self.send(channel, &message, event.subject.as_deref()).await
            };

            report.deliveries.push(ChannelDelivery {
                channel: channel.name.clone(),
                key,
                status,
            });
        }

        report
    }

    async fn send(
        &self,
        channel: &ChannelDescriptor,
        message: &str,
        subject: Option<&str>,
    ) -> DeliveryStatus {
        let sent = tokio::time::timeout(self.send_timeout, channel.sender.send(message, subject)).await;
        match sent {
            Ok(Ok(())) => {
                debug!("Notification sent via {}", channel.name);
                DeliveryStatus::Sent
            }
            Ok(Err(e)) => {
                warn!("{} notification failed: {}", channel.sender.kind(), e);
                DeliveryStatus::SendFailed(e.to_string())
            }
            Err(_) => {
                warn!(
                    "{} notification timed out after {:?}",
                    channel.sender.kind(),
                    self.send_timeout
                );
                DeliveryStatus::SendFailed(format!("timed out after {:?}", self.send_timeout))
            }
        }
    }
}
