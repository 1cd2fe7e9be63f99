//! Error types for the dynamic DNS client
//!
//! This module defines all error types used throughout the crate.

use crate::address::IpFamily;
use thiserror::Error;

/// Result type alias for dyndns operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the dynamic DNS client
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors (a provider or channel is misconfigured)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The configured protocol tag does not match any registered provider
    #[error("Unknown provider type '{tag}'. Valid types: {valid}")]
    UnknownProviderType {
        /// The normalized tag found in the configuration
        tag: String,
        /// Comma-separated list of registered tags
        valid: String,
    },

    /// A literal failed address validation
    #[error("Invalid {family} address: '{value}'")]
    InvalidAddress {
        /// The offending literal
        value: String,
        /// The family it was validated against
        family: IpFamily,
    },

    /// Every service and the interface fallback failed for a family
    #[error("No {0} address available from any source")]
    NoAddressAvailable(IpFamily),

    /// IP source-related errors
    #[error("IP source error: {0}")]
    IpSource(String),

    /// HTTP transport errors (connection refused, DNS failure, 5xx, ...)
    #[error("HTTP error: {0}")]
    Http(String),

    /// An outbound call exceeded its timeout
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Authentication errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Rate limiting errors
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// State store-related errors
    #[error("State store error: {0}")]
    StateStore(String),

    /// Notification channel errors
    #[error("Notification error: {0}")]
    Notification(String),

    /// Provider-specific error
    #[error("Provider error ({provider}): {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an IP source error
    pub fn ip_source(msg: impl Into<String>) -> Self {
        Self::IpSource(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a rate limit error
    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Self::RateLimited(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a state store error
    pub fn state_store(msg: impl Into<String>) -> Self {
        Self::StateStore(msg.into())
    }

    /// Create a notification error
    pub fn notification(msg: impl Into<String>) -> Self {
        Self::Notification(msg.into())
    }

    /// Create a provider-specific error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Whether retrying later may succeed without operator intervention
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::Timeout(_) | Self::Io(_) | Self::NoAddressAvailable(_)
        )
    }
}
