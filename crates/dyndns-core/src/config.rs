//! Configuration types for the dynamic DNS client
//!
//! This module defines all configuration structures used throughout the
//! crate. The daemon deserializes them from YAML; every key has a default
//! so a minimal file only lists its providers.

use crate::address::IpFamily;
use crate::backoff::BackoffPolicy;
use crate::notification::Level;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Built-in IPv4 lookup services, used when none are configured
pub const DEFAULT_IPV4_SERVICES: &[&str] = &[
    "https://api.ipify.org",
    "https://ifconfig.me/ip",
    "https://ipv4.icanhazip.com",
];

/// Built-in IPv6 lookup services, used when none are configured
pub const DEFAULT_IPV6_SERVICES: &[&str] = &[
    "https://api6.ipify.org",
    "https://ipv6.icanhazip.com",
    "https://v6.ident.me",
];

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Poll interval in seconds
    #[serde(default = "default_timer")]
    pub timer: u64,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default)]
    pub loglevel: Option<String>,

    #[serde(default = "default_true")]
    pub enable_ipv4: bool,

    #[serde(default)]
    pub enable_ipv6: bool,

    /// Preferred IPv4 lookup service, tried before `ip_services`
    #[serde(default)]
    pub ip_service: Option<String>,

    #[serde(default)]
    pub ip_services: Vec<String>,

    /// Preferred IPv6 lookup service, tried before `ip6_services`
    #[serde(default)]
    pub ip6_service: Option<String>,

    #[serde(default)]
    pub ip6_services: Vec<String>,

    /// Network interface to read when every lookup service fails
    #[serde(default)]
    pub interface: Option<String>,

    #[serde(default)]
    pub enable_interface_fallback: bool,

    /// Per-service timeout in seconds
    #[serde(default = "default_service_timeout")]
    pub service_timeout: u64,

    /// Lookup probes in flight at once
    #[serde(default = "default_probe_parallelism")]
    pub probe_parallelism: usize,

    /// Delay after the first failed resolve, in seconds
    #[serde(default = "default_network_retry_interval")]
    pub network_retry_interval: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Upper bound for the retry delay, in seconds
    #[serde(default = "default_max_wait_time")]
    pub max_wait_time: u64,

    /// Consecutive failures before resilient mode
    #[serde(default = "default_max_failures_before_backoff")]
    pub max_failures_before_backoff: u32,

    /// Skip pushing on the first cycle when the address is unchanged
    #[serde(default)]
    pub skip_update_on_startup: bool,

    /// Seconds a rate-limited provider is held back
    #[serde(default = "default_rate_limit_hold")]
    pub rate_limit_hold: u64,

    /// Directory for persisted state
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    #[serde(default)]
    pub providers: Vec<ProviderSpec>,

    /// Global notification channels
    #[serde(default)]
    pub notify: Option<NotifyConfig>,

    /// Seconds between configuration file checks
    #[serde(default = "default_config_watch_interval")]
    pub config_watch_interval: u64,

    /// Capacity of the lifecycle event channel
    ///
    /// When full, new events are dropped (with a debug log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timer: default_timer(),
            loglevel: None,
            enable_ipv4: true,
            enable_ipv6: false,
            ip_service: None,
            ip_services: Vec::new(),
            ip6_service: None,
            ip6_services: Vec::new(),
            interface: None,
            enable_interface_fallback: false,
            service_timeout: default_service_timeout(),
            probe_parallelism: default_probe_parallelism(),
            network_retry_interval: default_network_retry_interval(),
            backoff_multiplier: default_backoff_multiplier(),
            max_wait_time: default_max_wait_time(),
            max_failures_before_backoff: default_max_failures_before_backoff(),
            skip_update_on_startup: false,
            rate_limit_hold: default_rate_limit_hold(),
            state_dir: default_state_dir(),
            providers: Vec::new(),
            notify: None,
            config_watch_interval: default_config_watch_interval(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

impl Config {
    /// Validate the configuration
    ///
    /// Only global settings are checked here. Individual providers and
    /// channels are validated when they are built, so one broken entry
    /// does not take the others down.
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.timer == 0 {
            return Err(crate::Error::config("timer must be > 0"));
        }
        if !self.enable_ipv4 && !self.enable_ipv6 {
            return Err(crate::Error::config(
                "At least one of enable_ipv4 / enable_ipv6 must be true",
            ));
        }
        if self.service_timeout == 0 {
            return Err(crate::Error::config("service_timeout must be > 0"));
        }
        if self.probe_parallelism == 0 {
            return Err(crate::Error::config("probe_parallelism must be > 0"));
        }
        if self.network_retry_interval == 0 {
            return Err(crate::Error::config("network_retry_interval must be > 0"));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(crate::Error::config("backoff_multiplier must be >= 1.0"));
        }
        if self.max_wait_time < self.network_retry_interval {
            return Err(crate::Error::config(
                "max_wait_time must be >= network_retry_interval",
            ));
        }
        if self.enable_interface_fallback && self.interface_name().is_none() {
            return Err(crate::Error::config(
                "enable_interface_fallback requires an interface",
            ));
        }
        if self.providers.is_empty() {
            return Err(crate::Error::config("No providers configured"));
        }

        let mut seen = std::collections::HashSet::new();
        for spec in &self.providers {
            if spec.name.trim().is_empty() {
                return Err(crate::Error::config("Provider name cannot be empty"));
            }
            if !seen.insert(spec.name.as_str()) {
                return Err(crate::Error::config(format!(
                    "Duplicate provider name '{}'",
                    spec.name
                )));
            }
        }

        Ok(())
    }

    /// Families to resolve, IPv4 first
    pub fn enabled_families(&self) -> Vec<IpFamily> {
        IpFamily::ALL
            .into_iter()
            .filter(|f| match f {
                IpFamily::V4 => self.enable_ipv4,
                IpFamily::V6 => self.enable_ipv6,
            })
            .collect()
    }

    /// Ordered lookup service URLs for a family
    ///
    /// The singular key is tried first, then the list; duplicates keep
    /// their first position. Without either, the built-in list is used.
    pub fn service_urls(&self, family: IpFamily) -> Vec<String> {
        let (single, list, defaults) = match family {
            IpFamily::V4 => (&self.ip_service, &self.ip_services, DEFAULT_IPV4_SERVICES),
            IpFamily::V6 => (&self.ip6_service, &self.ip6_services, DEFAULT_IPV6_SERVICES),
        };

        let mut urls: Vec<String> = Vec::new();
        for url in single.iter().chain(list.iter()) {
            let url = url.trim();
            if !url.is_empty() && !urls.iter().any(|u| u == url) {
                urls.push(url.to_string());
            }
        }

        if urls.is_empty() {
            defaults.iter().map(|u| u.to_string()).collect()
        } else {
            urls
        }
    }

    /// The fallback interface, if the fallback is enabled
    pub fn interface_name(&self) -> Option<&str> {
        self.interface
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn service_timeout(&self) -> Duration {
        Duration::from_secs(self.service_timeout)
    }

    pub fn config_watch_interval(&self) -> Duration {
        Duration::from_secs(self.config_watch_interval.max(1))
    }

    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            base_delay: Duration::from_secs(self.network_retry_interval),
            multiplier: self.backoff_multiplier,
            max_delay: Duration::from_secs(self.max_wait_time),
            failure_threshold: self.max_failures_before_backoff,
        }
    }

    /// Settings consumed by the orchestrator
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            poll_interval: Duration::from_secs(self.timer),
            backoff: self.backoff_policy(),
            skip_update_on_startup: self.skip_update_on_startup,
            rate_limit_hold: Duration::from_secs(self.rate_limit_hold),
            event_channel_capacity: self.event_channel_capacity,
        }
    }

    /// Whether persisted cooldowns should be discarded at startup
    pub fn reset_cooldown_on_start(&self) -> bool {
        self.notify
            .as_ref()
            .is_some_and(|n| n.reset_cooldown_on_start)
    }
}

/// Orchestrator tunables
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    /// Wait between cycles while the network is healthy
    pub poll_interval: Duration,
    pub backoff: BackoffPolicy,
    pub skip_update_on_startup: bool,
    /// How long a rate-limited provider is skipped
    pub rate_limit_hold: Duration,
    pub event_channel_capacity: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Config::default().engine_settings()
    }
}

/// Free-form key/value settings of a provider or channel
///
/// Values keep their YAML type; the accessors coerce scalars to strings so
/// `zone: 12345` and `zone: "12345"` read the same.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Settings(pub serde_json::Map<String, Value>);

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    /// A non-empty scalar value as a trimmed string
    pub fn get_str(&self, key: &str) -> Option<String> {
        let value = match self.0.get(key)? {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => return None,
        };
        (!value.is_empty()).then_some(value)
    }

    /// The first of `keys` that has a value
    pub fn first_str(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|k| self.get_str(k))
    }

    /// Like [`first_str`](Self::first_str) but a configuration error when absent
    pub fn require(&self, owner: &str, keys: &[&str]) -> Result<String, crate::Error> {
        self.first_str(keys).ok_or_else(|| {
            crate::Error::config(format!(
                "{}: missing required setting '{}'",
                owner,
                keys.join("' / '")
            ))
        })
    }

    /// A boolean, also accepting "true"/"false"/"yes"/"no" strings
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.0.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Some(true),
                "false" | "no" | "off" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// A mapping of scalars (e.g. `extra_params`), empty when absent
    pub fn get_map(&self, key: &str) -> Result<BTreeMap<String, String>, crate::Error> {
        let Some(value) = self.0.get(key) else {
            return Ok(BTreeMap::new());
        };
        let Value::Object(map) = value else {
            return Err(crate::Error::config(format!("'{}' must be a mapping", key)));
        };

        map.iter()
            .map(|(k, v)| {
                let v = match v {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    _ => {
                        return Err(crate::Error::config(format!(
                            "'{}.{}' must be a scalar",
                            key, k
                        )));
                    }
                };
                Ok((k.clone(), v))
            })
            .collect()
    }
}

const SECRET_KEYS: &[&str] = &[
    "token",
    "api_token",
    "key",
    "password",
    "bot_token",
    "webhook_url",
];

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for (k, v) in &self.0 {
            if SECRET_KEYS.contains(&k.as_str()) {
                map.entry(k, &"<redacted>");
            } else {
                map.entry(k, v);
            }
        }
        map.finish()
    }
}

/// One configured DNS provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSpec {
    /// Instance name, used in logs and notifications
    pub name: String,

    /// Protocol tag (e.g. "cloudflare", "ipv64", "dyndns2")
    #[serde(default)]
    pub protocol: Option<String>,

    /// Legacy spelling of `protocol`
    #[serde(default, rename = "type")]
    pub legacy_type: Option<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Notification channels replacing the global ones for this provider
    #[serde(default)]
    pub notify: Option<NotifyConfig>,

    /// Credentials and target fields
    #[serde(flatten)]
    pub settings: Settings,
}

impl ProviderSpec {
    pub fn new(name: impl Into<String>, protocol: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            protocol: Some(protocol.into()),
            legacy_type: None,
            enabled: true,
            notify: None,
            settings: Settings::new(),
        }
    }

    /// Builder-style setting insertion
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.settings.insert(key, value);
        self
    }

    /// Normalized protocol tag: `protocol`, else `type`; trimmed, lowercase
    pub fn protocol_tag(&self) -> Option<String> {
        self.protocol
            .as_deref()
            .or(self.legacy_type.as_deref())
            .map(|t| t.trim().to_ascii_lowercase())
            .filter(|t| !t.is_empty())
    }

    /// Owner label for error messages
    pub fn label(&self) -> String {
        format!("provider '{}'", self.name)
    }
}

/// A set of notification channels
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Discard persisted cooldowns at startup
    #[serde(default)]
    pub reset_cooldown_on_start: bool,

    /// Channels keyed by name (the name doubles as the kind unless `type` is set)
    ///
    /// Kept in file order, which is also the dispatch order.
    #[serde(flatten)]
    pub channels: IndexMap<String, ChannelConfig>,
}

/// One notification channel
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Levels this channel accepts; empty accepts none
    #[serde(default)]
    pub notify_on: Vec<Level>,

    /// Minimum minutes between two sends; 0 disables the cooldown
    #[serde(default, alias = "cooldown")]
    pub cooldown_minutes: u64,

    /// Channel kind when the name is not one
    #[serde(default, rename = "type")]
    pub kind: Option<String>,

    /// Transport settings (url, webhook_url, bot_token, ...)
    #[serde(flatten)]
    pub settings: Settings,
}

impl ChannelConfig {
    /// The transport kind for a channel configured under `name`
    pub fn kind_for(&self, name: &str) -> String {
        self.kind
            .as_deref()
            .unwrap_or(name)
            .trim()
            .to_ascii_lowercase()
    }
}

fn default_true() -> bool {
    true
}

fn default_timer() -> u64 {
    300
}

fn default_service_timeout() -> u64 {
    10
}

fn default_probe_parallelism() -> usize {
    crate::resolver::DEFAULT_PROBE_PARALLELISM
}

fn default_network_retry_interval() -> u64 {
    60
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_wait_time() -> u64 {
    600
}

fn default_max_failures_before_backoff() -> u32 {
    5
}

fn default_rate_limit_hold() -> u64 {
    900
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("state")
}

fn default_config_watch_interval() -> u64 {
    5
}

fn default_event_channel_capacity() -> usize {
    1000
}
