//! Storage path management for punchcard.
//!
//! All files live under one root directory:
//!
//! ```text
//! ~/.punchcard/
//! ├── local-storage.json   shared key-value store
//! ├── config.json          user preferences
//! └── logs/                CLI log files
//! ```
//!
//! `PUNCHCARD_HOME` overrides the root. Tests use [`StorageConfig::with_root`].

use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Result, TrackerError};

pub const HOME_ENV: &str = "PUNCHCARD_HOME";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    root: PathBuf,
}

impl StorageConfig {
    /// Resolves the root from `PUNCHCARD_HOME`, else `~/.punchcard`.
    pub fn from_env() -> Result<Self> {
        if let Some(root) = env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
            return Ok(Self::with_root(PathBuf::from(root)));
        }
        let home = dirs::home_dir().ok_or(TrackerError::HomeDirNotFound)?;
        Ok(Self::with_root(home.join(".punchcard")))
    }

    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path to local-storage.json (the shared store).
    pub fn store_file(&self) -> PathBuf {
        self.root.join("local-storage.json")
    }

    /// Path to config.json (user preferences).
    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.json")
    }

    /// Path to logs/ directory.
    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }
}
