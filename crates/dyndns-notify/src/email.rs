// Email over SMTP
//
// Port 465 means implicit TLS and 587 means STARTTLS; `smtp_ssl` and
// `smtp_starttls` override either guess. Any other port with neither flag
// talks plain SMTP. The client logs in only when both `smtp_user` and
// `smtp_pass` are set.

use crate::SEND_TIMEOUT;
use async_trait::async_trait;
use dyndns_core::config::Settings;
use dyndns_core::traits::Notifier;
use dyndns_core::{Error, Result};
use lettre::message::header::ContentType;
use lettre::message::{Mailbox, Mailboxes};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::fmt;
use tracing::debug;

/// Subject used when neither the event nor the channel names one
pub const DEFAULT_SUBJECT: &str = "DynDNS Client Benachrichtigung";

/// Submission port, STARTTLS by default
pub const DEFAULT_SMTP_PORT: u16 = 587;

/// SMTPS port, implicit TLS by default
pub const SMTPS_PORT: u16 = 465;

/// How the SMTP connection is secured
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpSecurity {
    /// TLS from the first byte
    Implicit,
    /// Plain connect upgraded with STARTTLS
    StartTls,
    /// No TLS
    Plain,
}

impl SmtpSecurity {
    /// Pick the mode for `port` unless an explicit flag says otherwise
    pub fn resolve(port: u16, ssl: Option<bool>, starttls: Option<bool>) -> Self {
        if ssl.unwrap_or(port == SMTPS_PORT) {
            SmtpSecurity::Implicit
        } else if starttls.unwrap_or(port == DEFAULT_SMTP_PORT) {
            SmtpSecurity::StartTls
        } else {
            SmtpSecurity::Plain
        }
    }
}

/// Mail to one or more recipients
pub struct EmailNotifier {
    from: Mailbox,
    to: Mailboxes,
    subject: String,
    server: String,
    port: u16,
    security: SmtpSecurity,
    authenticated: bool,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl fmt::Debug for EmailNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmailNotifier")
            .field("from", &self.from.to_string())
            .field("to", &self.to.to_string())
            .field("server", &self.server)
            .field("port", &self.port)
            .field("security", &self.security)
            .field("authenticated", &self.authenticated)
            .finish()
    }
}

impl EmailNotifier {
    /// Build from a channel's settings
    ///
    /// `to` may list several recipients separated by commas.
    pub fn from_settings(owner: &str, settings: &Settings) -> Result<Self> {
        let from_raw = settings.require(owner, &["from"])?;
        let from: Mailbox = from_raw
            .parse()
            .map_err(|e| Error::config(format!("{}: invalid 'from' address '{}': {}", owner, from_raw, e)))?;
        let to_raw = settings.require(owner, &["to"])?;
        let to: Mailboxes = to_raw
            .parse()
            .map_err(|e| Error::config(format!("{}: invalid 'to' address '{}': {}", owner, to_raw, e)))?;

        let server = settings.require(owner, &["smtp_server", "smtp_host"])?;
        let port = match settings.get_str("smtp_port") {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|_| Error::config(format!("{}: invalid smtp_port '{}'", owner, raw)))?,
            None => DEFAULT_SMTP_PORT,
        };
        let security = SmtpSecurity::resolve(
            port,
            settings.get_bool("smtp_ssl"),
            settings.get_bool("smtp_starttls"),
        );

        let builder = match security {
            SmtpSecurity::Implicit => AsyncSmtpTransport::<Tokio1Executor>::relay(&server),
            SmtpSecurity::StartTls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&server),
            SmtpSecurity::Plain => Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(
                server.as_str(),
            )),
        }
        .map_err(|e| Error::config(format!("{}: cannot use SMTP server {}: {}", owner, server, e)))?;
        let mut builder = builder.port(port).timeout(Some(SEND_TIMEOUT));

        let credentials = settings
            .first_str(&["smtp_user", "smtp_username"])
            .zip(settings.first_str(&["smtp_pass", "smtp_password"]));
        let authenticated = credentials.is_some();
        if let Some((user, pass)) = credentials {
            builder = builder.credentials(Credentials::new(user, pass));
        }

        Ok(Self {
            from,
            to,
            subject: settings
                .get_str("subject")
                .unwrap_or_else(|| DEFAULT_SUBJECT.to_string()),
            server,
            port,
            security,
            authenticated,
            transport: builder.build(),
        })
    }

    pub fn security(&self) -> SmtpSecurity {
        self.security
    }

    /// Whether the client logs in before sending
    pub fn authenticated(&self) -> bool {
        self.authenticated
    }

    /// The event's subject wins over the configured one
    fn message(&self, body: &str, subject: Option<&str>) -> Result<Message> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(subject.unwrap_or(&self.subject))
            .header(ContentType::TEXT_PLAIN);
        for mailbox in self.to.iter() {
            builder = builder.to(mailbox.clone());
        }
        builder
            .body(body.to_string())
            .map_err(|e| Error::notification(format!("email: cannot build message: {}", e)))
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn send(&self, message: &str, subject: Option<&str>) -> Result<()> {
        let email = self.message(message, subject)?;
        debug!(
            "Sending email via {}:{} ({:?})",
            self.server, self.port, self.security
        );
        self.transport
            .send(email)
            .await
            .map_err(|e| Error::notification(format!("email: {}", e)))?;
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "email"
    }
}
