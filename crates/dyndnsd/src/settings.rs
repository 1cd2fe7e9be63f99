// Configuration loading and component wiring
//
// Everything the control loop needs is built here from one parsed
// `Config`, both at startup and on every hot reload.

use anyhow::{Context, Result};
use dyndns_core::{Components, Config, IpFamily, IpResolver, ProviderRegistry, Resolvers};
use dyndns_ip_iface::InterfaceIpSource;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{Level, info, warn};

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "DYNDNS_CONFIG";

/// Environment variable overriding `loglevel`
pub const LOG_LEVEL_ENV: &str = "DYNDNS_LOG_LEVEL";

pub const DEFAULT_CONFIG_PATH: &str = "config/config.yaml";

/// Path of the configuration file
pub fn config_path() -> PathBuf {
    env::var_os(CONFIG_ENV)
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Read, parse and validate the configuration file
///
/// Used once at startup, before the runtime exists.
pub fn load(path: &Path) -> Result<Config> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read configuration file {}", path.display()))?;
    parse(&raw).with_context(|| format!("invalid configuration file {}", path.display()))
}

/// [`load`] for callers running on the runtime
pub async fn load_async(path: &Path) -> Result<Config> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("cannot read configuration file {}", path.display()))?;
    parse(&raw).with_context(|| format!("invalid configuration file {}", path.display()))
}

/// Parse and validate YAML configuration text
pub fn parse(raw: &str) -> Result<Config> {
    let config: Config = serde_yaml::from_str(raw)?;
    config.validate()?;
    Ok(config)
}

/// Effective log level: the env override, then `loglevel`, then info
pub fn log_level(config: &Config) -> Result<Level> {
    let env_level = env::var(LOG_LEVEL_ENV).ok().filter(|s| !s.trim().is_empty());
    match env_level.or_else(|| config.loglevel.clone()) {
        Some(level) => parse_level(&level),
        None => Ok(Level::INFO),
    }
}

fn parse_level(level: &str) -> Result<Level> {
    match level.trim().to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" | "warning" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => anyhow::bail!(
            "log level '{}' is not valid. Valid levels: trace, debug, info, warn, error",
            level
        ),
    }
}

/// Registry with every provider compiled into this binary
pub fn registry() -> ProviderRegistry {
    let registry = ProviderRegistry::new();

    #[cfg(feature = "cloudflare")]
    dyndns_provider_cloudflare::register(&registry);

    #[cfg(feature = "dyndns2")]
    dyndns_provider_dyndns2::register(&registry);

    #[cfg(feature = "ipv64")]
    dyndns_provider_ipv64::register(&registry);

    info!("Available providers: {}", registry.list_providers().join(", "));
    registry
}

/// IP resolvers for every enabled family
pub fn build_resolvers(config: &Config) -> Result<Resolvers> {
    let client = dyndns_ip_http::default_client()?;
    let fallback = config
        .interface_name()
        .filter(|_| config.enable_interface_fallback)
        .map(InterfaceIpSource::new);

    let mut resolvers = Resolvers::default();
    for family in config.enabled_families() {
        let urls = config.service_urls(family);
        info!("{} lookup services: {}", family, urls.join(", "));

        let mut resolver = IpResolver::new(family, dyndns_ip_http::sources(&urls, &client))
            .with_timeout(config.service_timeout())
            .with_parallelism(config.probe_parallelism);
        if let Some(source) = &fallback {
            resolver = resolver.with_fallback(Arc::new(source.clone()));
        }

        match family {
            IpFamily::V4 => resolvers.v4 = Some(resolver),
            IpFamily::V6 => resolvers.v6 = Some(resolver),
        }
    }
    Ok(resolvers)
}

/// Build everything the orchestrator runs with
///
/// Broken providers and channels are left out and logged; the rest of the
/// configuration still goes live. Only a missing HTTP stack is fatal.
pub fn build_components(config: &Config, registry: &ProviderRegistry) -> Result<Components> {
    let (providers, failed) = registry.create_all(&config.providers);
    if providers.is_empty() {
        warn!(
            "No usable provider ({} failed); addresses are tracked but not published",
            failed.len()
        );
    }

    let (dispatcher, channel_errors) =
        dyndns_notify::build_dispatcher(config.notify.as_ref(), &config.providers);
    if !channel_errors.is_empty() {
        warn!(
            "{} notification channel(s) excluded by configuration errors",
            channel_errors.len()
        );
    }

    Ok(Components {
        resolvers: build_resolvers(config)?,
        providers,
        dispatcher,
        settings: config.engine_settings(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
timer: 120
enable_ipv6: true
ip_service: https://ip.example.com
ip6_services:
  - https://ip6.example.com
interface: eth0
enable_interface_fallback: true
state_dir: /tmp/dyndns-state
providers:
  - name: home
    protocol: dyndns2
    url: https://members.example.com/nic/update
    hostname: home.example.com
    auth_method: basic
    username: user
    password: pass
  - name: lab
    type: ipv64
    token: abc
    domain: lab.ipv64.net
  - name: broken
    protocol: carrier-pigeon
notify:
  reset_cooldown_on_start: true
  ntfy:
    enabled: true
    url: https://ntfy.sh/dyndns
    notify_on: [ERROR, CRITICAL]
    cooldown: 15
"#;

    #[test]
    fn test_parse_sample() {
        let config = parse(SAMPLE).unwrap();
        assert_eq!(config.timer, 120);
        assert_eq!(config.providers.len(), 3);
        assert!(config.reset_cooldown_on_start());
        assert_eq!(config.enabled_families(), vec![IpFamily::V4, IpFamily::V6]);
    }

    #[test]
    fn test_parse_rejects_invalid() {
        assert!(parse("timer: [").is_err());
        assert!(parse("providers: []").is_err());
        assert!(parse("timer: 0\nproviders:\n  - name: a\n    protocol: ipv64\n").is_err());
    }

    #[test]
    fn test_load_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.yaml");
        let err = load(&missing).unwrap_err();
        assert!(format!("{:#}", err).contains("nope.yaml"));

        let path = dir.path().join("config.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        assert_eq!(load(&path).unwrap().providers[0].name, "home");
    }

    #[tokio::test]
    async fn test_load_async_matches_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        tokio::fs::write(&path, SAMPLE).await.unwrap();

        let config = load_async(&path).await.unwrap();
        assert_eq!(config.timer, 120);
        assert_eq!(config.providers[2].name, "broken");

        let err = load_async(&dir.path().join("gone.yaml")).await.unwrap_err();
        assert!(format!("{:#}", err).contains("gone.yaml"));
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("DEBUG").unwrap(), Level::DEBUG);
        assert_eq!(parse_level(" warning ").unwrap(), Level::WARN);
        assert!(parse_level("loud").is_err());
    }

    #[cfg(all(feature = "dyndns2", feature = "ipv64"))]
    #[test]
    fn test_build_components_skips_broken_provider() {
        let config = parse(SAMPLE).unwrap();
        let components = build_components(&config, &registry()).unwrap();

        let names: Vec<&str> = components.providers.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["home", "lab"]);
        assert!(components.resolvers.v4.is_some());
        assert!(components.resolvers.v6.is_some());
        assert!(!components.dispatcher.is_empty());
        assert_eq!(
            components.settings.poll_interval,
            std::time::Duration::from_secs(120)
        );
    }

    #[test]
    fn test_ipv6_only_has_no_v4_resolver() {
        let config = parse(
            "enable_ipv4: false\nenable_ipv6: true\nproviders:\n  - name: a\n    protocol: ipv64\n",
        )
        .unwrap();
        let resolvers = build_resolvers(&config).unwrap();
        assert!(resolvers.v4.is_none());
        assert_eq!(resolvers.families(), vec![IpFamily::V6]);
    }
}
