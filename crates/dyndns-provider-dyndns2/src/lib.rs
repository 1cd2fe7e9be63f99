// # DynDNS2 Provider
//
// Generic client for the `/nic/update` protocol spoken by most dynamic DNS
// services (dyndns.org, No-IP, Dynu, self-hosted ddclient targets, ...).
//
// ## Request
//
// ```http
// GET <url>?hostname=home.example.com&myip=203.0.113.5&myipv6=2001:db8::5
// ```
//
// plus any `extra_params` and, depending on `auth_method`:
//
// - `token` (default): `&token=<token>` in the query
// - `basic`: HTTP Basic with `username` / `password`
// - `bearer`: `Authorization: Bearer <token>`
//
// ## Response
//
// The body starts with a status token. `good` and `nochg` are successes;
// everything else maps onto the error taxonomy (see [`parse_status`]).
//
// The auth modes and the status parser are shared with the IPv64 provider.

use async_trait::async_trait;
use dyndns_core::config::ProviderSpec;
use dyndns_core::traits::{DnsProvider, DnsProviderFactory, UpdateResult};
use dyndns_core::{Error, ProviderRegistry, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::time::Duration;

/// Default HTTP timeout for update requests
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Many DynDNS2 servers reject requests without a descriptive agent
pub const USER_AGENT: &str = concat!("dyndnsd/", env!("CARGO_PKG_VERSION"));

const PROVIDER: &str = "dyndns2";

/// How credentials are presented
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMethod {
    /// Token in the query string
    #[default]
    Token,
    /// HTTP Basic authentication
    Basic,
    /// `Authorization: Bearer` header
    Bearer,
}

impl AuthMethod {
    /// Parse `auth_method`; absent means [`AuthMethod::Token`]
    pub fn from_setting(owner: &str, raw: Option<&str>) -> Result<Self> {
        match raw.map(|r| r.trim().to_ascii_lowercase()).as_deref() {
            None | Some("token") => Ok(AuthMethod::Token),
            Some("basic") => Ok(AuthMethod::Basic),
            Some("bearer") => Ok(AuthMethod::Bearer),
            Some(other) => Err(Error::config(format!(
                "{}: unknown auth_method '{}' (expected token, basic or bearer)",
                owner, other
            ))),
        }
    }
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AuthMethod::Token => "token",
            AuthMethod::Basic => "basic",
            AuthMethod::Bearer => "bearer",
        })
    }
}

/// Successful status tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    /// `good`: the record was changed
    Good,
    /// `nochg`: the record already had the address
    NoChange,
}

/// Classify a DynDNS2 response body
///
/// Servers answer one line per updated host or address. Any error line
/// fails the whole call; otherwise one `good` line is enough for `Good`.
///
/// | token                  | result                  |
/// |------------------------|-------------------------|
/// | `good`                 | `Good`                  |
/// | `nochg`                | `NoChange`              |
/// | `badauth`              | `Error::Authentication` |
/// | `abuse`                | `Error::RateLimited`    |
/// | `911`, `dnserr`        | `Error::Http`           |
/// | anything else          | `Error::Provider`       |
pub fn parse_status(provider: &str, body: &str) -> Result<ResponseStatus> {
    let mut status = None;
    for line in body.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let token = line.split_whitespace().next().unwrap_or_default();
        match token.to_ascii_lowercase().as_str() {
            "good" => status = Some(ResponseStatus::Good),
            "nochg" => {
                status.get_or_insert(ResponseStatus::NoChange);
            }
            "badauth" => return Err(Error::auth(format!("{}: badauth", provider))),
            "abuse" => return Err(Error::rate_limited(format!("{}: abuse", provider))),
            "911" | "dnserr" => {
                return Err(Error::http(format!("{}: server error '{}'", provider, line)));
            }
            _ => return Err(Error::provider(provider, format!("update refused: {}", line))),
        }
    }
    status.ok_or_else(|| Error::provider(provider, "empty response"))
}

/// Map a non-success HTTP status onto the error taxonomy
pub fn status_error(provider: &str, status: reqwest::StatusCode, body: &str) -> Error {
    match status.as_u16() {
        401 | 403 => Error::auth(format!("{}: HTTP {}", provider, status)),
        429 => Error::rate_limited(format!("{}: HTTP {}", provider, status)),
        500..=599 => Error::http(format!("{}: HTTP {}", provider, status)),
        _ => Error::provider(provider, format!("HTTP {} - {}", status, body.trim())),
    }
}

/// Map a transport failure onto the error taxonomy
pub fn transport_error(provider: &str, e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::timeout(format!("{}: {}", provider, e))
    } else {
        Error::http(format!("{}: request failed: {}", provider, e))
    }
}

/// The HTTP client used by the DynDNS2-style providers
pub fn default_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(DEFAULT_HTTP_TIMEOUT)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| Error::config(format!("cannot build HTTP client: {}", e)))
}

/// Generic DynDNS2 provider
pub struct DynDns2Provider {
    name: String,
    url: String,
    hostname: String,
    auth: AuthMethod,
    username: Option<String>,
    /// ⚠️ NEVER log this value
    password: Option<String>,
    /// ⚠️ NEVER log this value
    token: Option<String>,
    extra_params: BTreeMap<String, String>,
    client: reqwest::Client,
}

impl fmt::Debug for DynDns2Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynDns2Provider")
            .field("name", &self.name)
            .field("url", &self.url)
            .field("hostname", &self.hostname)
            .field("auth", &self.auth)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<REDACTED>"))
            .field("token", &self.token.as_ref().map(|_| "<REDACTED>"))
            .field("extra_params", &self.extra_params.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl DynDns2Provider {
    /// Build a provider from its configuration entry
    ///
    /// An unknown `auth_method` or a malformed `extra_params` is rejected
    /// here; missing credentials are reported by `validate_config`.
    pub fn from_spec(spec: &ProviderSpec) -> Result<Self> {
        let settings = &spec.settings;
        let owner = spec.label();
        Ok(Self {
            name: spec.name.clone(),
            url: settings.get_str("url").unwrap_or_default(),
            hostname: settings
                .first_str(&["hostname", "host", "domain"])
                .unwrap_or_default(),
            auth: AuthMethod::from_setting(&owner, settings.get_str("auth_method").as_deref())?,
            username: settings.first_str(&["username", "user"]),
            password: settings.get_str("password"),
            token: settings.first_str(&["token", "api_token"]),
            extra_params: settings.get_map("extra_params")?,
            client: default_client()?,
        })
    }

    pub fn auth_method(&self) -> AuthMethod {
        self.auth
    }

    fn query(&self, ipv4: Option<Ipv4Addr>, ipv6: Option<Ipv6Addr>) -> Vec<(String, String)> {
        let mut query = vec![("hostname".to_string(), self.hostname.clone())];
        if let Some(ip) = ipv4 {
            query.push(("myip".to_string(), ip.to_string()));
        }
        if let Some(ip) = ipv6 {
            query.push(("myipv6".to_string(), ip.to_string()));
        }
        query.extend(self.extra_params.iter().map(|(k, v)| (k.clone(), v.clone())));
        query
    }
}

#[async_trait]
impl DnsProvider for DynDns2Provider {
    fn validate_config(&self) -> Result<()> {
        let owner = format!("provider '{}'", self.name);
        if self.url.is_empty() {
            return Err(Error::config(format!("{}: missing 'url'", owner)));
        }
        if self.hostname.is_empty() {
            return Err(Error::config(format!(
                "{}: missing 'hostname' (or 'host' / 'domain')",
                owner
            )));
        }
        match self.auth {
            AuthMethod::Token | AuthMethod::Bearer if self.token.is_none() => Err(Error::config(
                format!("{}: auth_method '{}' requires 'token'", owner, self.auth),
            )),
            AuthMethod::Basic if self.username.is_none() || self.password.is_none() => {
                Err(Error::config(format!(
                    "{}: auth_method 'basic' requires 'username' and 'password'",
                    owner
                )))
            }
            _ => Ok(()),
        }
    }

    async fn update_record(
        &self,
        ipv4: Option<Ipv4Addr>,
        ipv6: Option<Ipv6Addr>,
    ) -> Result<UpdateResult> {
        if ipv4.is_none() && ipv6.is_none() {
            return Ok(UpdateResult::Unchanged);
        }
        tracing::info!("[{}] updating {} via {}", self.name, self.hostname, self.url);

        let mut request = self.client.get(&self.url).query(&self.query(ipv4, ipv6));
        let token = self.token.as_deref().unwrap_or_default();
        request = match self.auth {
            AuthMethod::Token => request.query(&[("token", token)]),
            AuthMethod::Bearer => request.bearer_auth(token),
            AuthMethod::Basic => request.basic_auth(
                self.username.as_deref().unwrap_or_default(),
                self.password.as_deref(),
            ),
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
        if !status.is_success() {
            return Err(status_error(PROVIDER, status, &body));
        }

        match parse_status(PROVIDER, &body)? {
            ResponseStatus::Good => {
                tracing::info!("[{}] {} updated", self.name, self.hostname);
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

/// Factory for creating DynDNS2 providers
pub struct DynDns2Factory;

impl DnsProviderFactory for DynDns2Factory {
    fn create(&self, spec: &ProviderSpec) -> Result<Box<dyn DnsProvider>> {
        Ok(Box::new(DynDns2Provider::from_spec(spec)?))
    }
}

/// Register the DynDNS2 provider with a registry
pub fn register(registry: &ProviderRegistry) {
    registry.register_provider(PROVIDER, Box::new(DynDns2Factory));
}
