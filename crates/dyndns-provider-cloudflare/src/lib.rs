// # Cloudflare DNS Provider
//
// Keeps one A and/or AAAA record in a Cloudflare zone pointed at the
// current address.
//
// ## Flow
//
// 1. Resolve the zone ID (skipped when `zone_id` is configured)
// 2. For every supplied family, read the record
// 3. PATCH it only when its content differs; create it when missing
//
// The provider is single-shot: retries, backoff and rate-limit holds are
// owned by the orchestrator.
//
// ## Configuration
//
// ```yaml
// - name: home-cf
//   protocol: cloudflare
//   token: "..."            # or api_token
//   zone: example.com       # or zone_id: 023e105f4ecef8ad9ca31a8372d0c353
//   record_name: home.example.com
//   dry_run: false          # reads only, logs intended writes
//   ttl: 1                  # for created records; 1 = automatic
//   proxied: false          # for created records
// ```
//
// ## Security
//
// The API token never appears in logs or in `Debug` output.
//
// ## API Reference
//
// - List zones: GET `/zones?name=...`
// - List records: GET `/zones/:zone_id/dns_records?type=...&name=...`
// - Patch record: PATCH `/zones/:zone_id/dns_records/:record_id`
// - Create record: POST `/zones/:zone_id/dns_records`

use async_trait::async_trait;
use dyndns_core::config::ProviderSpec;
use dyndns_core::traits::{DnsProvider, DnsProviderFactory, UpdateResult};
use dyndns_core::{Error, ProviderRegistry, Result};
use serde_json::{Value, json};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::Duration;

/// Cloudflare API base URL
pub const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Default HTTP timeout for API requests
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// TTL of created records; 1 means "automatic"
const DEFAULT_TTL: u32 = 1;

const PROVIDER: &str = "cloudflare";

/// Cloudflare DNS provider
///
/// # Dry-Run Mode
///
/// With `dry_run`, zone and record lookups still happen, but PATCH and POST
/// requests are only logged. The result reports what would have changed.
pub struct CloudflareProvider {
    name: String,
    /// ⚠️ NEVER log this value
    api_token: String,
    zone: Option<String>,
    zone_id: Option<String>,
    record_name: String,
    ttl: u32,
    proxied: bool,
    dry_run: bool,
    base_url: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for CloudflareProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareProvider")
            .field("name", &self.name)
            .field("api_token", &"<REDACTED>")
            .field("zone", &self.zone)
            .field("zone_id", &self.zone_id)
            .field("record_name", &self.record_name)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

/// A record as returned by the list endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
struct ExistingRecord {
    id: String,
    content: String,
}

impl CloudflareProvider {
    /// Build a provider from its configuration entry
    ///
    /// Missing settings are not an error here; [`DnsProvider::validate_config`]
    /// reports them so the registry can exclude the provider.
    pub fn from_spec(spec: &ProviderSpec) -> Result<Self> {
        let settings = &spec.settings;
        Ok(Self {
            name: spec.name.clone(),
            api_token: settings.first_str(&["token", "api_token"]).unwrap_or_default(),
            zone: settings.get_str("zone"),
            zone_id: settings.get_str("zone_id"),
            record_name: settings.get_str("record_name").unwrap_or_default(),
            ttl: settings
                .get_str("ttl")
                .and_then(|t| t.parse().ok())
                .unwrap_or(DEFAULT_TTL),
            proxied: settings.get_bool("proxied").unwrap_or(false),
            dry_run: settings.get_bool("dry_run").unwrap_or(false),
            base_url: CLOUDFLARE_API_BASE.to_string(),
            client: reqwest::Client::builder()
                .timeout(DEFAULT_HTTP_TIMEOUT)
                .build()
                .map_err(|e| Error::config(format!("cannot build HTTP client: {}", e)))?,
        })
    }

    /// Point the provider at another API endpoint
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Get the zone ID, looking it up by zone name when not configured
    ///
    /// ```http
    /// GET /zones?name=example.com
    /// Authorization: Bearer <token>
    /// ```
    async fn zone_id(&self) -> Result<String> {
        if let Some(zone_id) = &self.zone_id {
            tracing::debug!("[{}] using configured zone ID", self.name);
            return Ok(zone_id.clone());
        }
        let zone = self
            .zone
            .as_deref()
            .ok_or_else(|| Error::config(format!("provider '{}': missing 'zone'", self.name)))?;

        tracing::debug!("[{}] looking up zone ID for {}", self.name, zone);
        let response = self
            .client
            .get(format!("{}/zones", self.base_url))
            .bearer_auth(&self.api_token)
            .query(&[("name", zone)])
            .send()
            .await
            .map_err(transport_error)?;
        let body = check_response(response, "zone lookup").await?;

        body["result"]
            .as_array()
            .and_then(|zones| zones.first())
            .and_then(|zone| zone["id"].as_str())
            .map(str::to_string)
            .ok_or_else(|| Error::not_found(format!("zone {}", zone)))
    }

    /// Read the record of `record_type`, if any
    async fn find_record(&self, zone_id: &str, record_type: &str) -> Result<Option<ExistingRecord>> {
        let response = self
            .client
            .get(format!("{}/zones/{}/dns_records", self.base_url, zone_id))
            .bearer_auth(&self.api_token)
            .query(&[("type", record_type), ("name", self.record_name.as_str())])
            .send()
            .await
            .map_err(transport_error)?;
        let body = check_response(response, "record lookup").await?;

        let records = body["result"].as_array().ok_or_else(|| {
            Error::provider(PROVIDER, "invalid response format: result is not an array")
        })?;
        Ok(records.first().and_then(|record| {
            Some(ExistingRecord {
                id: record["id"].as_str()?.to_string(),
                content: record["content"].as_str().unwrap_or_default().to_string(),
            })
        }))
    }

    /// Make the record of `ip`'s family point at `ip`
    ///
    /// Returns whether anything changed (or would have, in dry-run mode).
    async fn sync_record(&self, zone_id: &str, ip: IpAddr) -> Result<bool> {
        let record_type = match ip {
            IpAddr::V4(_) => "A",
            IpAddr::V6(_) => "AAAA",
        };

        let existing = self.find_record(zone_id, record_type).await?;
        if let Some(record) = &existing {
            if record.content.parse::<IpAddr>().ok() == Some(ip) {
                tracing::info!(
                    "[{}] {} record {} already points at {}",
                    self.name,
                    record_type,
                    self.record_name,
                    ip
                );
                return Ok(false);
            }
        }

        let (request, payload) = match &existing {
            Some(record) => {
                let payload = json!({ "content": ip.to_string() });
                let url = format!("{}/zones/{}/dns_records/{}", self.base_url, zone_id, record.id);
                (self.client.patch(url), payload)
            }
            None => {
                let payload = json!({
                    "type": record_type,
                    "name": self.record_name,
                    "content": ip.to_string(),
                    "ttl": self.ttl,
                    "proxied": self.proxied,
                });
                let url = format!("{}/zones/{}/dns_records", self.base_url, zone_id);
                (self.client.post(url), payload)
            }
        };
        let verb = if existing.is_some() { "update" } else { "create" };

        if self.dry_run {
            tracing::info!(
                "[{}] [DRY-RUN] would {} {} record {} with {}",
                self.name,
                verb,
                record_type,
                self.record_name,
                payload
            );
            return Ok(true);
        }

        let response = request
            .bearer_auth(&self.api_token)
            .json(&payload)
            .send()
            .await
            .map_err(transport_error)?;
        check_response(response, verb).await?;

        tracing::info!(
            "[{}] {} record {} -> {} ({}d)",
            self.name,
            record_type,
            self.record_name,
            ip,
            verb
        );
        Ok(true)
    }
}

#[async_trait]
impl DnsProvider for CloudflareProvider {
    fn validate_config(&self) -> Result<()> {
        if self.api_token.is_empty() {
            return Err(Error::config(format!(
                "provider '{}': missing API token ('token' or 'api_token')",
                self.name
            )));
        }
        if self.zone.is_none() && self.zone_id.is_none() {
            return Err(Error::config(format!(
                "provider '{}': missing 'zone' (or 'zone_id')",
                self.name
            )));
        }
        if self.record_name.is_empty() {
            return Err(Error::config(format!(
                "provider '{}': missing 'record_name'",
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
        tracing::info!(
            "[{}] syncing {} [mode: {}]",
            self.name,
            self.record_name,
            if self.dry_run { "DRY-RUN" } else { "LIVE" }
        );

        let zone_id = self.zone_id().await?;

        let mut changed4 = None;
        if let Some(ip) = ipv4 {
            if self.sync_record(&zone_id, IpAddr::V4(ip)).await? {
                changed4 = Some(ip);
            }
        }
        let mut changed6 = None;
        if let Some(ip) = ipv6 {
            if self.sync_record(&zone_id, IpAddr::V6(ip)).await? {
                changed6 = Some(ip);
            }
        }

        if changed4.is_none() && changed6.is_none() {
            return Ok(UpdateResult::Unchanged);
        }
        Ok(UpdateResult::Updated {
            ipv4: changed4,
            ipv6: changed6,
        })
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}

fn transport_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::timeout(format!("cloudflare request: {}", e))
    } else {
        Error::http(format!("cloudflare request failed: {}", e))
    }
}

/// Map the HTTP status onto the error taxonomy and unwrap the API envelope
async fn check_response(response: reqwest::Response, context: &str) -> Result<Value> {
    let status = response.status();
    if !status.is_success() {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read error response".to_string());
        return Err(match status.as_u16() {
            401 | 403 => Error::auth(format!(
                "invalid API token or insufficient permissions ({})",
                status
            )),
            404 => Error::not_found(format!("{}: {}", context, status)),
            429 => Error::rate_limited(format!("{}: {}", context, status)),
            500..=599 => Error::http(format!("{}: server error {}", context, status)),
            _ => Error::provider(
                PROVIDER,
                format!("{} failed: {} - {}", context, status, error_text),
            ),
        });
    }

    let body: Value = response
        .json()
        .await
        .map_err(|e| Error::provider(PROVIDER, format!("{}: unreadable response: {}", context, e)))?;
    if body["success"] == Value::Bool(false) {
        return Err(Error::provider(
            PROVIDER,
            format!("{} rejected: {}", context, body["errors"]),
        ));
    }
    Ok(body)
}

/// Factory for creating Cloudflare providers
pub struct CloudflareFactory;

impl DnsProviderFactory for CloudflareFactory {
    fn create(&self, spec: &ProviderSpec) -> Result<Box<dyn DnsProvider>> {
        let provider = CloudflareProvider::from_spec(spec)?;
        if provider.dry_run {
            tracing::warn!(
                "[{}] Cloudflare provider running in DRY-RUN mode - no changes will be made",
                provider.name
            );
        }
        Ok(Box::new(provider))
    }
}

/// Register the Cloudflare provider with a registry
///
/// # Example
///
/// ```rust
/// use dyndns_core::ProviderRegistry;
///
/// let registry = ProviderRegistry::new();
/// dyndns_provider_cloudflare::register(&registry);
/// assert!(registry.has_provider("cloudflare"));
/// ```
pub fn register(registry: &ProviderRegistry) {
    registry.register_provider(PROVIDER, Box::new(CloudflareFactory));
}

#[cfg(test)]
mod tests {
    use super::*;
    use dyndns_core::traits::{FailureReason, UpdateOutcome};
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn spec() -> ProviderSpec {
        ProviderSpec::new("home-cf", "cloudflare")
            .with("token", "secret_token_12345")
            .with("zone", "example.com")
            .with("record_name", "home.example.com")
    }

    fn provider(server: &MockServer, spec: &ProviderSpec) -> CloudflareProvider {
        CloudflareProvider::from_spec(spec).unwrap().with_base_url(server.uri())
    }

    fn ok(result: Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({ "success": true, "errors": [], "result": result }))
    }

    async fn mount_zone(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/zones"))
            .and(query_param("name", "example.com"))
            .and(header("authorization", "Bearer secret_token_12345"))
            .respond_with(ok(json!([{ "id": "zone-1", "name": "example.com" }])))
            .mount(server)
            .await;
    }

    async fn mount_record(server: &MockServer, record_type: &str, result: Value) {
        Mock::given(method("GET"))
            .and(path("/zones/zone-1/dns_records"))
            .and(query_param("type", record_type))
            .and(query_param("name", "home.example.com"))
            .respond_with(ok(result))
            .mount(server)
            .await;
    }

    #[test]
    fn test_validate_config() {
        assert!(CloudflareProvider::from_spec(&spec()).unwrap().validate_config().is_ok());

        let api_token_alias = ProviderSpec::new("cf", "cloudflare")
            .with("api_token", "t")
            .with("zone_id", "zone-1")
            .with("record_name", "home.example.com");
        assert!(CloudflareProvider::from_spec(&api_token_alias).unwrap().validate_config().is_ok());

        let no_token = ProviderSpec::new("cf", "cloudflare")
            .with("zone", "example.com")
            .with("record_name", "home.example.com");
        let no_zone = ProviderSpec::new("cf", "cloudflare")
            .with("token", "t")
            .with("record_name", "home.example.com");
        let no_record = ProviderSpec::new("cf", "cloudflare")
            .with("token", "t")
            .with("zone", "example.com");
        for broken in [no_token, no_zone, no_record] {
            assert!(matches!(
                CloudflareProvider::from_spec(&broken).unwrap().validate_config(),
                Err(Error::Config(_))
            ));
        }
    }

    #[test]
    fn test_api_token_not_exposed_in_debug() {
        let debug_str = format!("{:?}", CloudflareProvider::from_spec(&spec()).unwrap());
        assert!(!debug_str.contains("secret_token"));
        assert!(debug_str.contains("CloudflareProvider"));
    }

    #[test]
    fn test_register() {
        let registry = ProviderRegistry::new();
        register(&registry);
        let created = registry.create_provider(&spec()).unwrap();
        assert_eq!(created.name(), "home-cf");
        assert_eq!(created.provider_name(), "cloudflare");
    }

    #[tokio::test]
    async fn test_matching_record_is_unchanged() {
        let server = MockServer::start().await;
        mount_zone(&server).await;
        mount_record(&server, "A", json!([{ "id": "rec-a", "content": "203.0.113.5" }])).await;
        Mock::given(method("PATCH"))
            .respond_with(ok(json!({})))
            .expect(0)
            .mount(&server)
            .await;

        let result = provider(&server, &spec())
            .update_record(Some(Ipv4Addr::new(203, 0, 113, 5)), None)
            .await
            .unwrap();
        assert_eq!(result, UpdateResult::Unchanged);
    }

    #[tokio::test]
    async fn test_differing_record_is_patched() {
        let server = MockServer::start().await;
        mount_zone(&server).await;
        mount_record(&server, "A", json!([{ "id": "rec-a", "content": "198.51.100.1" }])).await;
        Mock::given(method("PATCH"))
            .and(path("/zones/zone-1/dns_records/rec-a"))
            .and(body_json(json!({ "content": "203.0.113.5" })))
            .respond_with(ok(json!({ "id": "rec-a", "content": "203.0.113.5" })))
            .expect(1)
            .mount(&server)
            .await;

        let result = provider(&server, &spec())
            .update_record(Some(Ipv4Addr::new(203, 0, 113, 5)), None)
            .await
            .unwrap();
        assert_eq!(
            result,
            UpdateResult::Updated {
                ipv4: Some(Ipv4Addr::new(203, 0, 113, 5)),
                ipv6: None
            }
        );
    }

    #[tokio::test]
    async fn test_missing_record_is_created() {
        let server = MockServer::start().await;
        mount_record(&server, "AAAA", json!([])).await;
        Mock::given(method("POST"))
            .and(path("/zones/zone-1/dns_records"))
            .and(body_json(json!({
                "type": "AAAA",
                "name": "home.example.com",
                "content": "2001:db8::5",
                "ttl": 1,
                "proxied": false,
            })))
            .respond_with(ok(json!({ "id": "rec-aaaa" })))
            .expect(1)
            .mount(&server)
            .await;

        let spec = ProviderSpec::new("home-cf", "cloudflare")
            .with("token", "t")
            .with("zone_id", "zone-1")
            .with("record_name", "home.example.com");
        let ipv6: Ipv6Addr = "2001:db8::5".parse().unwrap();
        let result = provider(&server, &spec)
            .update_record(None, Some(ipv6))
            .await
            .unwrap();
        assert_eq!(
            result,
            UpdateResult::Updated {
                ipv4: None,
                ipv6: Some(ipv6)
            }
        );
    }

    #[tokio::test]
    async fn test_dry_run_skips_writes() {
        let server = MockServer::start().await;
        mount_zone(&server).await;
        mount_record(&server, "A", json!([{ "id": "rec-a", "content": "198.51.100.1" }])).await;
        Mock::given(method("PATCH"))
            .respond_with(ok(json!({})))
            .expect(0)
            .mount(&server)
            .await;

        let dry = provider(&server, &spec().with("dry_run", true));
        assert!(dry.is_dry_run());
        let result = dry
            .update_record(Some(Ipv4Addr::new(203, 0, 113, 5)), None)
            .await
            .unwrap();
        assert!(matches!(result, UpdateResult::Updated { .. }));
    }

    #[tokio::test]
    async fn test_status_mapping() {
        for (status, expected) in [
            (401, FailureReason::Authentication),
            (403, FailureReason::Authentication),
            (429, FailureReason::RateLimited),
            (502, FailureReason::Transient),
        ] {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/zones"))
                .respond_with(ResponseTemplate::new(status))
                .mount(&server)
                .await;

            let outcome = provider(&server, &spec())
                .update(Some(Ipv4Addr::new(203, 0, 113, 5)), None)
                .await;
            assert_eq!(outcome, UpdateOutcome::Failed(expected), "status {}", status);
        }
    }

    #[tokio::test]
    async fn test_unknown_zone_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/zones"))
            .respond_with(ok(json!([])))
            .mount(&server)
            .await;

        let outcome = provider(&server, &spec())
            .update(Some(Ipv4Addr::new(203, 0, 113, 5)), None)
            .await;
        assert_eq!(outcome, UpdateOutcome::Failed(FailureReason::Rejected));
    }
}
