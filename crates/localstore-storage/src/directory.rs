use std::{
    fs,
    path::{Path, PathBuf},
};

use localstore_core::{Result, StoreError};
use tracing::debug;

/// Storage id used when none is configured.
pub const DEFAULT_STORAGE_ID: &str = "localstore";

/// Resolves the directory that holds a storage file and its key material.
///
/// With an explicit root the directory is `<root>/<storage-id>`; otherwise it
/// sits under the per-user application data root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryResolver {
    storage_id: String,
    root: Option<PathBuf>,
}

impl DirectoryResolver {
    pub fn new(storage_id: impl Into<String>, root: Option<PathBuf>) -> Self {
        Self {
            storage_id: storage_id.into(),
            root,
        }
    }

    pub fn storage_id(&self) -> &str {
        &self.storage_id
    }

    /// Computes the directory without touching the filesystem.
    pub fn path(&self) -> Result<PathBuf> {
        let base = match &self.root {
            Some(root) => root.clone(),
            None => app_data_root().ok_or_else(|| StoreError::InvalidConfig {
                reason: "no application data directory available".to_string(),
            })?,
        };
        Ok(base.join(&self.storage_id))
    }

    /// Returns the directory, creating it (and parents) when absent.
    pub fn create_or_get(&self) -> Result<PathBuf> {
        let dir = self.path()?;
        if !dir.exists() {
            debug!(dir = %dir.display(), "creating storage directory");
            fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
        }
        Ok(dir)
    }

    /// Removes the directory only when it exists and is empty.
    /// Returns whether it was removed.
    pub fn remove_if_empty(&self) -> Result<bool> {
        let dir = self.path()?;
        if !is_empty_dir(&dir)? {
            return Ok(false);
        }
        fs::remove_dir(&dir).map_err(|e| StoreError::io(&dir, e))?;
        debug!(dir = %dir.display(), "removed empty storage directory");
        Ok(true)
    }
}

fn is_empty_dir(dir: &Path) -> Result<bool> {
    if !dir.is_dir() {
        return Ok(false);
    }
    let mut entries = fs::read_dir(dir).map_err(|e| StoreError::io(dir, e))?;
    Ok(entries.next().is_none())
}

#[cfg(windows)]
fn app_data_root() -> Option<PathBuf> {
    // Roaming app data on Windows.
    dirs::data_dir()
}

#[cfg(target_os = "linux")]
fn app_data_root() -> Option<PathBuf> {
    // Honors XDG_DATA_HOME, falls back to ~/.local/share.
    dirs::data_dir()
}

#[cfg(all(not(windows), not(target_os = "linux")))]
fn app_data_root() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".local").join("share"))
}
