// # Notifier Trait
//
// Defines the transport for one notification channel (ntfy, Discord,
// Slack, webhook, Telegram, ...). Level filtering and cooldowns are applied
// by the `NotificationDispatcher` before a notifier is ever called.

use async_trait::async_trait;

/// Trait for notification channel transports
///
/// A notifier sends exactly one message per call with its own bounded
/// timeout and does not retry.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a message
    ///
    /// # Parameters
    ///
    /// - `message`: The full message text
    /// - `subject`: Optional title, for channels that support one
    async fn send(&self, message: &str, subject: Option<&str>) -> Result<(), crate::Error>;

    /// A static string identifying the channel kind (e.g. "ntfy")
    fn kind(&self) -> &'static str;
}
