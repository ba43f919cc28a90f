//! Per-platform credential bundles
//!
//! Credentials are opaque to the library: a bundle is handed to the engine as-is.
//! Bundles are registered explicitly or discovered by scanning a directory for
//! `<platform>_cookies.txt` files.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::Result;
use crate::platform::Platform;

const COOKIE_FILE_SUFFIX: &str = "_cookies.txt";

/// Opaque authentication material for one platform
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CredentialBundle {
    /// Netscape-format cookie jar on disk
    CookieFile(PathBuf),
}

/// File name a cookie jar for `platform` is expected to have
pub fn cookie_file_name(platform: Platform) -> String {
    format!("{}{}", platform.as_str(), COOKIE_FILE_SUFFIX)
}

/// Thread-safe map of platform to credential bundle (cloneable - Arc inside)
#[derive(Clone, Debug, Default)]
pub struct CredentialStore {
    bundles: Arc<RwLock<HashMap<Platform, CredentialBundle>>>,
}

impl CredentialStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a bundle, returning the one it replaces
    pub fn register(&self, platform: Platform, bundle: CredentialBundle) -> Option<CredentialBundle> {
        tracing::debug!(platform = %platform, "Registering credential bundle");
        self.write().insert(platform, bundle)
    }

    /// Remove the bundle for `platform`
    pub fn remove(&self, platform: Platform) -> Option<CredentialBundle> {
        self.write().remove(&platform)
    }

    /// Bundle registered for `platform`
    pub fn get(&self, platform: Platform) -> Option<CredentialBundle> {
        self.read().get(&platform).cloned()
    }

    /// Platforms that have a bundle registered
    pub fn platforms(&self) -> Vec<Platform> {
        let mut platforms: Vec<_> = self.read().keys().copied().collect();
        platforms.sort();
        platforms
    }

    /// Register every `<platform>_cookies.txt` file found directly in `dir`
    ///
    /// A missing directory is not an error. Files whose prefix is not a known platform
    /// are ignored. Returns the number of bundles registered.
    pub async fn scan_dir(&self, dir: &Path) -> Result<usize> {
        if !tokio::fs::try_exists(dir).await? {
            tracing::debug!(dir = %dir.display(), "Cookie directory does not exist, skipping scan");
            return Ok(0);
        }

        let mut entries = tokio::fs::read_dir(dir).await?;
        let mut registered = 0;

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let file_name = entry.file_name();
            let Some(prefix) = file_name
                .to_str()
                .and_then(|name| name.strip_suffix(COOKIE_FILE_SUFFIX))
            else {
                continue;
            };
            match prefix.parse::<Platform>() {
                Ok(platform) => {
                    self.register(platform, CredentialBundle::CookieFile(entry.path()));
                    registered += 1;
                }
                Err(_) => {
                    tracing::debug!(file = %entry.path().display(), "Ignoring cookie file for unknown platform");
                }
            }
        }

        tracing::info!(dir = %dir.display(), registered, "Scanned cookie directory");
        Ok(registered)
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<Platform, CredentialBundle>> {
        self.bundles.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Platform, CredentialBundle>> {
        self.bundles.write().unwrap_or_else(|e| e.into_inner())
    }
}
