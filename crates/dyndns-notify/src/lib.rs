//! Notification channels
//!
//! Transports for the `Notifier` trait plus the code that turns the
//! `notify:` configuration blocks into a ready `NotificationDispatcher`.
//!
//! | kind       | required settings      | request                              |
//! |------------|------------------------|--------------------------------------|
//! | `ntfy`     | `url`                  | POST, plain-text body, `Title` header |
//! | `discord`  | `webhook_url`          | POST `{"content": ...}`              |
//! | `slack`    | `webhook_url`          | POST `{"text": ...}`                 |
//! | `webhook`  | `url`                  | POST `{"message": ...}`              |
//! | `telegram` | `bot_token`, `chat_id` | POST form to `/bot<token>/sendMessage` |
//! | `email`    | `from`, `to`, `smtp_server` | SMTP, see [`EmailNotifier`]     |
//!
//! The kind is the channel's key in the configuration, or its `type` when
//! several channels of one kind are needed. Every request has a 5 second
//! timeout and is never retried.

mod email;

pub use email::{DEFAULT_SUBJECT, EmailNotifier, SmtpSecurity};

use async_trait::async_trait;
use dyndns_core::config::{ChannelConfig, NotifyConfig, ProviderSpec};
use dyndns_core::notification::{ChannelDescriptor, NotificationDispatcher};
use dyndns_core::traits::Notifier;
use dyndns_core::{Error, Result};
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Upper bound on one notification request
pub const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Telegram Bot API base URL
pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Every kind this crate can build
pub const KINDS: &[&str] = &["discord", "email", "ntfy", "slack", "telegram", "webhook"];

fn client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(SEND_TIMEOUT)
        .build()
        .map_err(|e| Error::config(format!("cannot build HTTP client: {}", e)))
}

/// Send a prepared request and check the status
async fn deliver(kind: &str, request: reqwest::RequestBuilder) -> Result<()> {
    let response = request
        .send()
        .await
        .map_err(|e| Error::notification(format!("{}: request failed: {}", kind, e)))?;
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::notification(format!(
        "{}: HTTP {} {}",
        kind,
        status,
        body.trim()
    )))
}

/// ntfy topic
#[derive(Debug, Clone)]
pub struct NtfyNotifier {
    url: String,
    client: reqwest::Client,
}

impl NtfyNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            url: url.into(),
            client: client()?,
        })
    }
}

#[async_trait]
impl Notifier for NtfyNotifier {
    async fn send(&self, message: &str, subject: Option<&str>) -> Result<()> {
        let mut request = self.client.post(&self.url).body(message.to_string());
        if let Some(subject) = subject {
            request = request.header("Title", subject);
        }
        deliver(self.kind(), request).await
    }

    fn kind(&self) -> &'static str {
        "ntfy"
    }
}

/// Body layout of a JSON webhook
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonShape {
    /// `{"content": ...}`
    Discord,
    /// `{"text": ...}`
    Slack,
    /// `{"message": ...}`
    Generic,
}

impl JsonShape {
    fn field(self) -> &'static str {
        match self {
            JsonShape::Discord => "content",
            JsonShape::Slack => "text",
            JsonShape::Generic => "message",
        }
    }
}

/// Discord, Slack or generic JSON webhook
#[derive(Clone)]
pub struct JsonWebhookNotifier {
    /// Webhook URLs embed their secret, so they are never logged
    url: String,
    shape: JsonShape,
    client: reqwest::Client,
}

impl fmt::Debug for JsonWebhookNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonWebhookNotifier")
            .field("url", &"<REDACTED>")
            .field("shape", &self.shape)
            .finish()
    }
}

impl JsonWebhookNotifier {
    pub fn new(url: impl Into<String>, shape: JsonShape) -> Result<Self> {
        Ok(Self {
            url: url.into(),
            shape,
            client: client()?,
        })
    }
}

#[async_trait]
impl Notifier for JsonWebhookNotifier {
    async fn send(&self, message: &str, _subject: Option<&str>) -> Result<()> {
        let mut body = serde_json::Map::new();
        body.insert(self.shape.field().to_string(), json!(message));
        deliver(self.kind(), self.client.post(&self.url).json(&body)).await
    }

    fn kind(&self) -> &'static str {
        match self.shape {
            JsonShape::Discord => "discord",
            JsonShape::Slack => "slack",
            JsonShape::Generic => "webhook",
        }
    }
}

/// Telegram bot chat
#[derive(Clone)]
pub struct TelegramNotifier {
    bot_token: String,
    chat_id: String,
    api_base: String,
    client: reqwest::Client,
}

impl fmt::Debug for TelegramNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramNotifier")
            .field("bot_token", &"<REDACTED>")
            .field("chat_id", &self.chat_id)
            .finish()
    }
}

impl TelegramNotifier {
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Result<Self> {
        Ok(Self {
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
            api_base: TELEGRAM_API_BASE.to_string(),
            client: client()?,
        })
    }

    /// Talk to another Bot API server
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, message: &str, _subject: Option<&str>) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.bot_token);
        let form = [("chat_id", self.chat_id.as_str()), ("text", message)];
        deliver(self.kind(), self.client.post(url).form(&form)).await
    }

    fn kind(&self) -> &'static str {
        "telegram"
    }
}

/// Build the transport for one configured channel
pub fn build_notifier(name: &str, channel: &ChannelConfig) -> Result<Arc<dyn Notifier>> {
    let owner = format!("notification channel '{}'", name);
    let settings = &channel.settings;
    let kind = channel.kind_for(name);

    let notifier: Arc<dyn Notifier> = match kind.as_str() {
        "ntfy" => Arc::new(NtfyNotifier::new(settings.require(&owner, &["url"])?)?),
        "discord" => Arc::new(JsonWebhookNotifier::new(
            settings.require(&owner, &["webhook_url", "url"])?,
            JsonShape::Discord,
        )?),
        "slack" => Arc::new(JsonWebhookNotifier::new(
            settings.require(&owner, &["webhook_url", "url"])?,
            JsonShape::Slack,
        )?),
        "webhook" => Arc::new(JsonWebhookNotifier::new(
            settings.require(&owner, &["url", "webhook_url"])?,
            JsonShape::Generic,
        )?),
        "email" => Arc::new(EmailNotifier::from_settings(&owner, settings)?),
        "telegram" => {
            let mut telegram = TelegramNotifier::new(
                settings.require(&owner, &["bot_token"])?,
                settings.require(&owner, &["chat_id"])?,
            )?;
            if let Some(api_base) = settings.get_str("api_url") {
                telegram = telegram.with_api_base(api_base);
            }
            Arc::new(telegram)
        }
        other => {
            return Err(Error::config(format!(
                "{}: unsupported kind '{}'. Valid kinds: {}",
                owner,
                other,
                KINDS.join(", ")
            )));
        }
    };
    Ok(notifier)
}

/// Build the channel list of one `notify:` block
///
/// Misconfigured channels are excluded and returned as errors. A disabled
/// channel that cannot be built is dropped silently; it would never send.
pub fn build_channels(config: &NotifyConfig) -> (Vec<ChannelDescriptor>, Vec<Error>) {
    let mut channels = Vec::new();
    let mut errors = Vec::new();

    for (name, channel) in &config.channels {
        match build_notifier(name, channel) {
            Ok(sender) => channels.push(ChannelDescriptor {
                name: name.clone(),
                enabled: channel.enabled,
                notify_on: channel.notify_on.iter().copied().collect(),
                cooldown_minutes: channel.cooldown_minutes,
                sender,
            }),
            Err(e) if !channel.enabled => {
                debug!("Skipping disabled notification channel '{}': {}", name, e)
            }
            Err(e) => {
                error!("Notification channel '{}' excluded: {}", name, e);
                errors.push(e);
            }
        }
    }

    (channels, errors)
}

/// Build the dispatcher from the global block and every provider's override
///
/// # Returns
///
/// The dispatcher plus the configuration errors of excluded channels.
pub fn build_dispatcher(
    global: Option<&NotifyConfig>,
    providers: &[ProviderSpec],
) -> (NotificationDispatcher, Vec<Error>) {
    let (channels, mut errors) = global.map(build_channels).unwrap_or_default();
    let mut dispatcher = NotificationDispatcher::new(channels);

    for spec in providers.iter().filter(|s| s.enabled) {
        let Some(notify) = &spec.notify else {
            continue;
        };
        let (channels, channel_errors) = build_channels(notify);
        info!(
            "Provider '{}' uses its own notification channels ({})",
            spec.name,
            channels.len()
        );
        errors.extend(channel_errors);
        dispatcher = dispatcher.with_provider_override(spec.name.clone(), channels);
    }

    (dispatcher, errors)
}
