//! Error types for the watch lifecycle.
//!
//! None of these are ever returned to the caller of `watch` or `stop`.
//! They describe why a watcher degraded or gave up, and their `Display`
//! text is what ends up on the diagnostic log stream.

use std::path::PathBuf;
use thiserror::Error;

/// Things that can go wrong while keeping a watch alive.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WatchError {
    /// The OS ran out of watch descriptors or queue space.
    /// Reported once per service lifetime and never retried.
    #[error("inotify limit reached (ENOSPC)")]
    ResourceExhaustion,

    /// The backend failed but the path is still there. Worth a restart.
    #[error("unexpected error: {message} (EUNKNOWN)")]
    TransientBackendFailure { message: String },

    /// The watched root disappeared from disk.
    #[error("watched path '{path}' no longer exists, giving up")]
    PathVanished { path: PathBuf },

    /// We kept restarting and it kept failing.
    #[error("gave up restarting watcher for '{path}' after {restarts} attempts")]
    RestartsExhausted { path: PathBuf, restarts: u32 },

    /// The backend refused to open a subscription at all.
    #[error("failed to subscribe to '{path}': {message}")]
    SubscriptionRejected { path: PathBuf, message: String },
}

impl WatchError {
    /// Creates a transient failure from any displayable backend error.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::TransientBackendFailure {
            message: message.into(),
        }
    }

    /// Whether this error ends the life of the watcher that hit it.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::PathVanished { .. } | Self::RestartsExhausted { .. }
        )
    }
}
