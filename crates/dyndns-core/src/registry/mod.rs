//! Plugin-based provider registry
//!
//! The registry maps a protocol tag to a provider factory, so adding a
//! provider never means touching an if-else chain.
//!
//! ## Registration
//!
//! Provider crates register themselves during initialization:
//!
//! ```rust,ignore
//! // In dyndns-provider-cloudflare
//! pub fn register(registry: &ProviderRegistry) {
//!     registry.register_provider("cloudflare", Box::new(CloudflareFactory));
//! }
//! ```
//!
//! ## Lookup
//!
//! The tag comes from `protocol`, falling back to the legacy `type` key,
//! and is trimmed and lowercased before lookup. Every created provider is
//! immediately checked with `validate_config`.

use crate::config::ProviderSpec;
use crate::error::{Error, Result};
use crate::traits::{DnsProvider, DnsProviderFactory};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tracing::{error, info};

/// Provider registry for plugin-based DNS provider creation
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: RwLock<HashMap<String, Box<dyn DnsProviderFactory>>>,
}

impl ProviderRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a DNS provider factory under a (case-insensitive) tag
    pub fn register_provider(&self, tag: impl Into<String>, factory: Box<dyn DnsProviderFactory>) {
        let tag = tag.into().trim().to_ascii_lowercase();
        let mut providers = self.providers.write().unwrap_or_else(PoisonError::into_inner);
        providers.insert(tag, factory);
    }

    /// Create and validate a DNS provider from its configuration entry
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn DnsProvider>)`: A provider that passed `validate_config`
    /// - `Err(Error::Config)`: Missing tag, or the provider is misconfigured
    /// - `Err(Error::UnknownProviderType)`: No factory for the tag
    pub fn create_provider(&self, spec: &ProviderSpec) -> Result<Box<dyn DnsProvider>> {
        let tag = spec.protocol_tag().ok_or_else(|| {
            Error::config(format!(
                "{}: missing 'protocol' (or legacy 'type')",
                spec.label()
            ))
        })?;

        let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);
        let factory = providers.get(&tag).ok_or_else(|| Error::UnknownProviderType {
            tag: tag.clone(),
            valid: Self::valid_tags(&providers),
        })?;

        let provider = factory.create(spec)?;
        provider.validate_config()?;
        Ok(provider)
    }

    /// Create every enabled provider, skipping the ones that fail
    ///
    /// Failures are logged and returned alongside the providers so the
    /// caller can surface them; they never abort the whole set.
    pub fn create_all(
        &self,
        specs: &[ProviderSpec],
    ) -> (Vec<Box<dyn DnsProvider>>, Vec<(String, Error)>) {
        let mut created = Vec::new();
        let mut failed = Vec::new();

        for spec in specs {
            if !spec.enabled {
                info!("Provider '{}' is disabled, skipping", spec.name);
                continue;
            }
            match self.create_provider(spec) {
                Ok(provider) => {
                    info!(
                        "Provider '{}' ({}) ready",
                        provider.name(),
                        provider.provider_name()
                    );
                    created.push(provider);
                }
                Err(e) => {
                    error!("Provider '{}' excluded: {}", spec.name, e);
                    failed.push((spec.name.clone(), e));
                }
            }
        }

        (created, failed)
    }

    /// List all registered provider tags, sorted
    pub fn list_providers(&self) -> Vec<String> {
        let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);
        let mut tags: Vec<String> = providers.keys().cloned().collect();
        tags.sort();
        tags
    }

    /// Check if a provider tag is registered
    pub fn has_provider(&self, tag: &str) -> bool {
        let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);
        providers.contains_key(&tag.trim().to_ascii_lowercase())
    }

    fn valid_tags(providers: &HashMap<String, Box<dyn DnsProviderFactory>>) -> String {
        let mut tags: Vec<&str> = providers.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::UpdateResult;
    use async_trait::async_trait;
    use std::net::{Ipv4Addr, Ipv6Addr};

    struct MockProvider {
        name: String,
        token: Option<String>,
    }

    #[async_trait]
    impl DnsProvider for MockProvider {
        fn validate_config(&self) -> Result<()> {
            match self.token {
                Some(_) => Ok(()),
                None => Err(Error::config(format!("provider '{}': missing 'token'", self.name))),
            }
        }

        async fn update_record(
            &self,
            _ipv4: Option<Ipv4Addr>,
            _ipv6: Option<Ipv6Addr>,
        ) -> Result<UpdateResult> {
            Ok(UpdateResult::Unchanged)
        }

        fn name(&self) -> &str {
            &self.name
        }

        fn provider_name(&self) -> &'static str {
            "mock"
        }
    }

    struct MockProviderFactory;

    impl DnsProviderFactory for MockProviderFactory {
        fn create(&self, spec: &ProviderSpec) -> Result<Box<dyn DnsProvider>> {
            Ok(Box::new(MockProvider {
                name: spec.name.clone(),
                token: spec.settings.get_str("token"),
            }))
        }
    }

    fn registry() -> ProviderRegistry {
        let registry = ProviderRegistry::new();
        registry.register_provider("mock", Box::new(MockProviderFactory));
        registry.register_provider("other", Box::new(MockProviderFactory));
        registry
    }

    #[test]
    fn test_registry_registration() {
        let registry = ProviderRegistry::new();
        assert!(!registry.has_provider("mock"));

        registry.register_provider("Mock", Box::new(MockProviderFactory));

        assert!(registry.has_provider("mock"));
        assert!(registry.has_provider(" MOCK "));
        assert_eq!(registry.list_providers(), vec!["mock".to_string()]);
    }

    #[test]
    fn test_tag_is_normalized() {
        let spec = ProviderSpec::new("home", "  MoCk ").with("token", "t");
        let provider = registry().create_provider(&spec).unwrap();
        assert_eq!(provider.name(), "home");
    }

    #[test]
    fn test_legacy_type_key() {
        let mut spec = ProviderSpec::new("home", "mock").with("token", "t");
        spec.legacy_type = spec.protocol.take();
        assert!(registry().create_provider(&spec).is_ok());
    }

    #[test]
    fn test_unknown_tag_lists_valid_ones() {
        let spec = ProviderSpec::new("home", "route53");
        match registry().create_provider(&spec) {
            Err(Error::UnknownProviderType { tag, valid }) => {
                assert_eq!(tag, "route53");
                assert_eq!(valid, "mock, other");
            }
            other => panic!("expected UnknownProviderType, got {:?}", other.map(|p| p.name().to_string())),
        }
    }

    #[test]
    fn test_missing_tag_is_config_error() {
        let mut spec = ProviderSpec::new("home", "mock");
        spec.protocol = None;
        assert!(matches!(registry().create_provider(&spec), Err(Error::Config(_))));
    }

    #[test]
    fn test_create_all_isolates_failures() {
        let mut disabled = ProviderSpec::new("off", "mock").with("token", "t");
        disabled.enabled = false;
        let specs = vec![
            ProviderSpec::new("good", "mock").with("token", "t"),
            ProviderSpec::new("no-token", "mock"),
            ProviderSpec::new("unknown", "route53"),
            disabled,
        ];

        let (created, failed) = registry().create_all(&specs);
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].name(), "good");
        let failed_names: Vec<&str> = failed.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(failed_names, vec!["no-token", "unknown"]);
    }
}
