// Configuration file watcher
//
// Polls the file's modification time. A changed file is parsed and turned
// into fresh components which are handed to the control loop; a file that
// fails to parse or validate leaves the running configuration in place.

use crate::settings;
use dyndns_core::{Components, ProviderRegistry};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

pub struct ConfigWatcher {
    path: PathBuf,
    registry: ProviderRegistry,
    interval: Duration,
    last_modified: Option<SystemTime>,
    reload: mpsc::Sender<Components>,
}

impl ConfigWatcher {
    pub async fn new(
        path: PathBuf,
        registry: ProviderRegistry,
        interval: Duration,
        reload: mpsc::Sender<Components>,
    ) -> Self {
        let last_modified = modified(&path).await;
        Self {
            path,
            registry,
            interval,
            last_modified,
            reload,
        }
    }

    /// Poll until the control loop goes away
    pub async fn run(mut self) {
        info!(
            "Watching {} every {:?}",
            self.path.display(),
            self.interval
        );
        loop {
            tokio::time::sleep(self.interval).await;
            if !self.poll().await {
                debug!("Control loop gone, configuration watcher exiting");
                return;
            }
        }
    }

    /// Check the file once
    ///
    /// Returns false once the receiving side is closed.
    pub async fn poll(&mut self) -> bool {
        let current = modified(&self.path).await;
        if current.is_none() || current == self.last_modified {
            return !self.reload.is_closed();
        }
        self.last_modified = current;
        info!("Configuration file {} changed, reloading", self.path.display());

        let config = match settings::load_async(&self.path).await {
            Ok(config) => config,
            Err(e) => {
                error!("Keeping the running configuration: {:#}", e);
                return !self.reload.is_closed();
            }
        };

        self.interval = config.config_watch_interval();
        let components = match settings::build_components(&config, &self.registry) {
            Ok(components) => components,
            Err(e) => {
                error!("Keeping the running configuration: {:#}", e);
                return !self.reload.is_closed();
            }
        };
        if self.reload.send(components).await.is_err() {
            return false;
        }
        true
    }
}

async fn modified(path: &Path) -> Option<SystemTime> {
    match tokio::fs::metadata(path).await.and_then(|m| m.modified()) {
        Ok(time) => Some(time),
        Err(e) => {
            warn!("Cannot stat {}: {}", path.display(), e);
            None
        }
    }
}
