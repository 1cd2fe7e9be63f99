// # dyndnsd - Dynamic DNS Daemon
//
// Thin integration layer: load the YAML configuration, set up logging,
// wire resolvers, providers and notification channels into the
// orchestrator, then run until SIGINT/SIGTERM.
//
// ## Environment
//
// - `DYNDNS_CONFIG`: configuration file (default `config/config.yaml`)
// - `DYNDNS_LOG_LEVEL`: overrides `loglevel` (trace, debug, info, warn, error)
//
// ## Example
//
// ```yaml
// timer: 300
// enable_ipv6: true
// providers:
//   - name: home
//     protocol: cloudflare
//     token: your_token
//     zone: example.com
//     record_name: home.example.com
// notify:
//   ntfy:
//     enabled: true
//     url: https://ntfy.sh/my-topic
//     notify_on: [UPDATE, ERROR, CRITICAL]
//     cooldown: 30
// ```
//
// The file is re-read whenever it changes; see [`watcher`].

mod settings;
mod watcher;

use anyhow::{Context, Result};
use dyndns_core::{Config, EngineEvent, FileStateStore, SystemClock, UpdateOrchestrator};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use tracing_subscriber::FmtSubscriber;
use watcher::ConfigWatcher;

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum DyndnsExitCode {
    CleanShutdown = 0,
    ConfigError = 1,
    RuntimeError = 2,
}

impl From<DyndnsExitCode> for ExitCode {
    fn from(code: DyndnsExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

fn main() -> ExitCode {
    let path = settings::config_path();
    let config = match settings::load(&path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return DyndnsExitCode::ConfigError.into();
        }
    };

    let log_level = match settings::log_level(&config) {
        Ok(level) => level,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return DyndnsExitCode::ConfigError.into();
        }
    };
    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return DyndnsExitCode::ConfigError.into();
    }

    info!("Starting dyndnsd {}", env!("CARGO_PKG_VERSION"));
    info!(
        "Configuration loaded from {}: {} provider(s)",
        path.display(),
        config.providers.len()
    );

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return DyndnsExitCode::RuntimeError.into();
        }
    };

    rt.block_on(async {
        match run_daemon(path, config).await {
            Ok(()) => DyndnsExitCode::CleanShutdown,
            Err(e) => {
                error!("Daemon error: {:#}", e);
                DyndnsExitCode::RuntimeError
            }
        }
    })
    .into()
}

async fn run_daemon(path: PathBuf, config: Config) -> Result<()> {
    let registry = settings::registry();
    let components = settings::build_components(&config, &registry)?;

    let state_store = FileStateStore::new(&config.state_dir)
        .await
        .with_context(|| format!("cannot use state directory {}", config.state_dir.display()))?;

    let (mut orchestrator, events) = UpdateOrchestrator::new(
        components,
        Arc::new(state_store),
        Arc::new(SystemClock),
        config.reset_cooldown_on_start(),
    )
    .await;

    let watcher = ConfigWatcher::new(
        path,
        registry,
        config.config_watch_interval(),
        orchestrator.reload_handle(),
    )
    .await;
    let watcher_task = tokio::spawn(watcher.run());
    let events_task = tokio::spawn(log_events(events));

    let result = orchestrator.run().await;

    watcher_task.abort();
    drop(orchestrator);
    let _ = events_task.await;

    result.map_err(Into::into)
}

/// Drain lifecycle events so the channel never backs up
async fn log_events(mut events: mpsc::Receiver<EngineEvent>) {
    while let Some(event) = events.recv().await {
        debug!("Engine event: {:?}", event);
    }
}
