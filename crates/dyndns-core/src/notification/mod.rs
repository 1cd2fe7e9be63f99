//! Notifications
//!
//! Events produced by the orchestrator are fanned out to configured
//! channels by the [`NotificationDispatcher`]. Each channel has a level
//! filter and an optional cooldown tracked by the [`CooldownTracker`].
//! Transports live behind the [`Notifier`](crate::traits::Notifier) trait.

pub mod cooldown;
pub mod dispatcher;

pub use cooldown::CooldownTracker;
pub use dispatcher::{
    ChannelDelivery, ChannelDescriptor, DeliveryStatus, DispatchReport, NotificationDispatcher,
    SkipReason,
};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Notification severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    /// Routine status ("address unchanged", "recovered")
    #[serde(alias = "info")]
    Info,
    /// A DNS record was changed
    #[serde(alias = "update")]
    Update,
    #[serde(alias = "warning", alias = "WARN", alias = "warn")]
    Warning,
    /// A provider update failed
    #[serde(alias = "error")]
    Error,
    /// Resilient mode was entered
    #[serde(alias = "critical")]
    Critical,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Level::Info => "INFO",
            Level::Update => "UPDATE",
            Level::Warning => "WARNING",
            Level::Error => "ERROR",
            Level::Critical => "CRITICAL",
        };
        f.write_str(s)
    }
}

/// A notification to fan out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub level: Level,
    pub message: String,
    /// Provider the event concerns; selects per-provider channel overrides
    pub source_provider: Option<String>,
    /// Title for channels that support one
    pub subject: Option<String>,
}

impl Event {
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            source_provider: None,
            subject: None,
        }
    }

    pub fn from_provider(mut self, provider: impl Into<String>) -> Self {
        self.source_provider = Some(provider.into());
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// The text actually delivered: `[provider] message` for provider events
    pub fn render(&self) -> String {
        match &self.source_provider {
            Some(provider) => format!("[{}] {}", provider, self.message),
            None => self.message.clone(),
        }
    }
}
