//! Watcher configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// How many times a failing watcher is restarted before we give up.
pub const MAX_RESTARTS: u32 = 5;

/// Quiet period before a failed watcher is restarted, in milliseconds.
pub const RESTART_DELAY_MS: u64 = 800;

/// Errors loading a configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Tunables for the lifecycle manager. Every field has a default, so a
/// config file only needs the ones it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WatcherConfig {
    /// Restarts allowed per request before it is abandoned.
    pub max_restarts: u32,

    /// Delay between a failure and the restart it triggers.
    pub restart_delay_ms: u64,

    /// Backend selector passed through to `subscribe`.
    pub backend: Option<String>,

    /// Drop requests whose path is missing or not a folder.
    pub validate_paths: bool,

    /// Re-encode event paths to NFC. macOS stores names decomposed.
    pub normalize_unicode: bool,

    /// Compare request paths case-insensitively when deduplicating.
    pub ignore_case: bool,

    /// Publish trace-level diagnostics from the start.
    pub verbose: bool,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            max_restarts: MAX_RESTARTS,
            restart_delay_ms: RESTART_DELAY_MS,
            backend: None,
            validate_paths: true,
            normalize_unicode: cfg!(target_os = "macos"),
            ignore_case: cfg!(any(target_os = "macos", target_os = "windows")),
            verbose: false,
        }
    }
}

impl WatcherConfig {
    /// Loads a JSON config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }
}
