// # File State Store
//
// File-based implementation of StateStore.
//
// ## Purpose
//
// Keeps the last pushed addresses and the notification cooldowns across
// daemon restarts, so a restart does not re-push unchanged addresses
// (with `skip_update_on_startup`) and does not re-send notifications that
// are still cooling down.
//
// ## Layout
//
// ```text
// <state_dir>/
//   last_ip_v4.txt     203.0.113.7
//   last_ip_v6.txt     2001:db8::7
//   cooldowns.json     {"discord": "2025-01-09T12:00:00Z", ...}
// ```
//
// ## Crash Safety
//
// - Atomic writes: new content goes to a `.tmp` sibling, then is renamed
// - Invalid content (garbage, wrong family, link-local) is logged and
//   treated as absent

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::Error;
use crate::address::{self, Address, IpFamily};
use crate::traits::state_store::{CooldownMap, StateStore};

const COOLDOWNS_FILE: &str = "cooldowns.json";

/// File-based state store
///
/// # Example
///
/// ```rust,no_run
/// use dyndns_core::address::{validate, IpFamily};
/// use dyndns_core::state::FileStateStore;
/// use dyndns_core::traits::StateStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileStateStore::new("/var/lib/dyndns").await?;
///
///     store.save_last_ip(&validate("203.0.113.7", IpFamily::V4)?).await?;
///     let ip = store.load_last_ip(IpFamily::V4).await?;
///     assert_eq!(ip.map(|a| a.to_string()), Some("203.0.113.7".to_string()));
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileStateStore {
    dir: PathBuf,
    // Serializes writers so two saves cannot race on the same temp file
    write_lock: Mutex<()>,
}

impl FileStateStore {
    /// Open (and create if needed) a state directory
    pub async fn new<P: AsRef<Path>>(dir: P) -> Result<Self, Error> {
        let dir = dir.as_ref().to_path_buf();

        if !dir.as_os_str().is_empty() && !dir.exists() {
            fs::create_dir_all(&dir).await.map_err(|e| {
                Error::state_store(format!(
                    "Failed to create state directory {}: {}",
                    dir.display(),
                    e
                ))
            })?;
        }

        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    /// The state directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the last-IP file for a family
    pub fn last_ip_path(&self, family: IpFamily) -> PathBuf {
        self.dir.join(format!("last_ip_{}.txt", family.tag()))
    }

    /// Path of the cooldown file
    pub fn cooldowns_path(&self) -> PathBuf {
        self.dir.join(COOLDOWNS_FILE)
    }

    /// Read a file, mapping "does not exist" to `None`
    async fn read_optional(path: &Path) -> Result<Option<String>, Error> {
        match fs::read_to_string(path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("State file does not exist: {}", path.display());
                Ok(None)
            }
            Err(e) => Err(Error::state_store(format!(
                "Failed to read state file {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// Write-then-rename so readers never observe a partial file
    async fn write_atomic(&self, path: &Path, content: &[u8]) -> Result<(), Error> {
        let _guard = self.write_lock.lock().await;

        let mut temp_path = path.to_path_buf();
        temp_path.set_extension("tmp");
        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::state_store(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.write_all(content).await.map_err(|e| {
                Error::state_store(format!(
                    "Failed to write to temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.flush().await.map_err(|e| {
                Error::state_store(format!(
                    "Failed to flush temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        fs::rename(&temp_path, path).await.map_err(|e| {
            Error::state_store(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                path.display(),
                e
            ))
        })?;

        tracing::trace!("State written to file: {}", path.display());
        Ok(())
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn load_last_ip(&self, family: IpFamily) -> Result<Option<Address>, Error> {
        let path = self.last_ip_path(family);
        let Some(content) = Self::read_optional(&path).await? else {
            return Ok(None);
        };

        let raw = content.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        match address::validate(raw, family) {
            Ok(addr) => Ok(Some(addr)),
            Err(e) => {
                tracing::warn!(
                    "Ignoring invalid state file {}: {}",
                    path.display(),
                    e
                );
                Ok(None)
            }
        }
    }

    async fn save_last_ip(&self, address: &Address) -> Result<(), Error> {
        let path = self.last_ip_path(address.family());
        self.write_atomic(&path, address.to_string().as_bytes()).await
    }

    async fn load_cooldowns(&self) -> Result<CooldownMap, Error> {
        let path = self.cooldowns_path();
        let Some(content) = Self::read_optional(&path).await? else {
            return Ok(CooldownMap::new());
        };

        match serde_json::from_str::<CooldownMap>(&content) {
            Ok(map) => {
                tracing::debug!("Loaded {} cooldown entries", map.len());
                Ok(map)
            }
            Err(e) => {
                tracing::warn!(
                    "Cooldown file {} appears corrupted ({}); starting with no cooldowns",
                    path.display(),
                    e
                );
                Ok(CooldownMap::new())
            }
        }
    }

    async fn save_cooldowns(&self, cooldowns: &CooldownMap) -> Result<(), Error> {
        let json = serde_json::to_string_pretty(cooldowns)
            .map_err(|e| Error::state_store(format!("Failed to serialize cooldowns: {}", e)))?;
        self.write_atomic(&self.cooldowns_path(), json.as_bytes()).await
    }
}
