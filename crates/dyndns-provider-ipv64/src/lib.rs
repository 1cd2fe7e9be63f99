// # IPv64.net Provider
//
// IPv64 speaks a DynDNS2 dialect on `https://ipv64.net/nic/update`:
//
// ```http
// GET /nic/update?key=<token>&domain=home.ipv64.net&ip=203.0.113.5&ip6=2001:db8::5
// ```
//
// Differences from generic DynDNS2:
//
// - the token travels as `key` (token mode), as the Basic password with
//   user `none` (basic mode) or as a Bearer token
// - addresses are sent as `ip` / `ip6`
// - update quota exhaustion is reported as `overcommited`, usually with
//   HTTP 403, and must be treated as a rate limit rather than bad credentials

use async_trait::async_trait;
use dyndns_core::config::ProviderSpec;
use dyndns_core::traits::{DnsProvider, DnsProviderFactory, UpdateResult};
use dyndns_core::{Error, ProviderRegistry, Result};
use dyndns_provider_dyndns2::{
    AuthMethod, ResponseStatus, default_client, parse_status, status_error, transport_error,
};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

/// IPv64 update endpoint
pub const IPV64_UPDATE_URL: &str = "https://ipv64.net/nic/update";

/// Basic-auth user name IPv64 expects alongside the token
const BASIC_USER: &str = "none";

const PROVIDER: &str = "ipv64";

/// IPv64.net provider
pub struct Ipv64Provider {
    name: String,
    /// ⚠️ NEVER log this value
    token: String,
    domain: String,
    auth: AuthMethod,
    url: String,
    client: reqwest::Client,
}

impl fmt::Debug for Ipv64Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ipv64Provider")
            .field("name", &self.name)
            .field("token", &"<REDACTED>")
            .field("domain", &self.domain)
            .field("auth", &self.auth)
            .field("url", &self.url)
            .finish()
    }
}

impl Ipv64Provider {
    /// Build a provider from its configuration entry
    pub fn from_spec(spec: &ProviderSpec) -> Result<Self> {
        let settings = &spec.settings;
        Ok(Self {
            name: spec.name.clone(),
            token: settings
                .first_str(&["token", "api_token", "key"])
                .unwrap_or_default(),
            domain: settings
                .first_str(&["domain", "host", "hostname"])
                .unwrap_or_default(),
            auth: AuthMethod::from_setting(&spec.label(), settings.get_str("auth_method").as_deref())?,
            url: settings
                .get_str("url")
                .unwrap_or_else(|| IPV64_UPDATE_URL.to_string()),
            client: default_client()?,
        })
    }

    /// Send updates to another endpoint
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

fn is_overcommit(body: &str) -> bool {
    body.to_ascii_lowercase().contains("overcommit")
}

#[async_trait]
impl DnsProvider for Ipv64Provider {
    fn validate_config(&self) -> Result<()> {
        if self.token.is_empty() {
            return Err(Error::config(format!(
                "provider '{}': missing 'token' (or 'api_token' / 'key')",
                self.name
            )));
        }
        if self.domain.is_empty() {
            return Err(Error::config(format!(
                "provider '{}': missing 'domain' (or 'host' / 'hostname')",
                self.name
            )));
        }
        Ok(())
    }

    async fn update_record(
        &self,
        ipv4: Option<Ipv4Addr>,
        ipv6: Option<Ipv6Addr>,
    ) -> Result<UpdateResult> {
        if ipv4.is_none() && ipv6.is_none() {
            return Ok(UpdateResult::Unchanged);
        }
        tracing::info!("[{}] updating {} via IPv64", self.name, self.domain);

        let mut query = vec![("domain", self.domain.clone())];
        if let Some(ip) = ipv4 {
            query.push(("ip", ip.to_string()));
        }
        if let Some(ip) = ipv6 {
            query.push(("ip6", ip.to_string()));
        }

        let mut request = self.client.get(&self.url).query(&query);
        request = match self.auth {
            AuthMethod::Token => request.query(&[("key", self.token.as_str())]),
            AuthMethod::Basic => request.basic_auth(BASIC_USER, Some(&self.token)),
            AuthMethod::Bearer => request.bearer_auth(&self.token),
        };

        let response = request
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;

        if is_overcommit(&body) {
            tracing::warn!("[{}] IPv64 update quota exhausted", self.name);
            return Err(Error::rate_limited(format!("{}: overcommited", PROVIDER)));
        }
        if !status.is_success() {
            return Err(status_error(PROVIDER, status, &body));
        }

        match parse_status(PROVIDER, &body)? {
            ResponseStatus::Good => {
                tracing::info!("[{}] {} updated", self.name, self.domain);
                Ok(UpdateResult::Updated { ipv4, ipv6 })
            }
            ResponseStatus::NoChange => Ok(UpdateResult::Unchanged),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}

/// Factory for creating IPv64 providers
pub struct Ipv64Factory;

impl DnsProviderFactory for Ipv64Factory {
    fn create(&self, spec: &ProviderSpec) -> Result<Box<dyn DnsProvider>> {
        Ok(Box::new(Ipv64Provider::from_spec(spec)?))
    }
}

/// Register the IPv64 provider with a registry
pub fn register(registry: &ProviderRegistry) {
    registry.register_provider(PROVIDER, Box::new(Ipv64Factory));
}
