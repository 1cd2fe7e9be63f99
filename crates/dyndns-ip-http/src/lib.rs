// # HTTP IP Source
//
// Asks a public "what is my IP" service for the caller's address.
//
// ## Contract
//
// A lookup is a single GET. Any 2xx response body is handed back as-is;
// trimming and validation are the resolver's job, so a service that
// returns an HTML error page with status 200 is rejected there rather
// than here.
//
// Services are usually family-specific (`api.ipify.org` only answers over
// IPv4, `api6.ipify.org` only over IPv6), so one source is created per
// URL and per family.

use async_trait::async_trait;
use dyndns_core::address::IpFamily;
use dyndns_core::traits::IpSource;
use dyndns_core::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Client-level timeout; the resolver usually applies a shorter one
const DEFAULT_CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

const USER_AGENT: &str = concat!("dyndnsd/", env!("CARGO_PKG_VERSION"));

/// A single IP-lookup service
#[derive(Debug, Clone)]
pub struct HttpIpSource {
    url: String,
    client: reqwest::Client,
}

impl HttpIpSource {
    /// Create a source with its own HTTP client
    pub fn new(url: impl Into<String>) -> Result<Self> {
        Ok(Self::with_client(url, default_client()?))
    }

    /// Create a source sharing an existing client
    pub fn with_client(url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            url: url.into(),
            client,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl IpSource for HttpIpSource {
    async fn fetch(&self, family: IpFamily) -> Result<String> {
        debug!("Fetching {} address from {}", family, self.url);

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| request_error(&self.url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::http(format!("{} returned {}", self.url, status)));
        }

        response
            .text()
            .await
            .map_err(|e| Error::http(format!("{}: failed to read body: {}", self.url, e)))
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

/// Build one source per URL, all sharing `client`
pub fn sources(urls: &[String], client: &reqwest::Client) -> Vec<Arc<dyn IpSource>> {
    urls.iter()
        .map(|url| Arc::new(HttpIpSource::with_client(url.clone(), client.clone())) as Arc<dyn IpSource>)
        .collect()
}

/// The HTTP client used when none is supplied
pub fn default_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(DEFAULT_CLIENT_TIMEOUT)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| Error::config(format!("cannot build HTTP client: {}", e)))
}

fn request_error(url: &str, e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::timeout(format!("{}: {}", url, e))
    } else {
        Error::http(format!("{}: {}", url, e))
    }
}
