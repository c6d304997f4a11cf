//! File system paths for Beacon.

use crate::{CoreError, CoreResult};
use std::path::PathBuf;

/// Directory name under the platform data directory.
const APP_DIR_NAME: &str = "beacon";
/// Settings filename under the base directory.
const CONFIG_FILE_NAME: &str = "config.json";
/// Default event cache database filename under the base directory.
const CACHE_FILE_NAME: &str = "beacon.sqlite3";

/// Manages file system paths for Beacon.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Application private data directory (e.g. ~/.local/share/beacon).
    base_dir: PathBuf,
}

impl Paths {
    /// Create a new Paths instance rooted at the platform's local data directory.
    ///
    /// Falls back to `~/.beacon` on platforms without a data directory.
    pub fn new() -> CoreResult<Self> {
        if let Some(data_dir) = dirs::data_local_dir() {
            return Ok(Self {
                base_dir: data_dir.join(APP_DIR_NAME),
            });
        }

        let home = dirs::home_dir()
            .ok_or_else(|| CoreError::Path("Could not determine home directory".to_string()))?;

        Ok(Self {
            base_dir: home.join(format!(".{APP_DIR_NAME}")),
        })
    }

    /// Create a new Paths instance with a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory.
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the settings file path (`<base>/config.json`).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join(CONFIG_FILE_NAME)
    }

    /// Get the default event cache path (`<base>/beacon.sqlite3`).
    ///
    /// Only one process may hold this database open at a time. Hosts running
    /// several clients side by side must give each one its own cache path.
    pub fn default_cache_file(&self) -> PathBuf {
        self.base_dir.join(CACHE_FILE_NAME)
    }

    /// Ensure the base directory exists.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        Ok(())
    }
}
