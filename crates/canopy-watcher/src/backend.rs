//! The seam between Canopy and whatever actually detects changes.
//!
//! A backend opens one recursive subscription per root and pushes
//! batches of raw events through a callback. The callback may carry an
//! error and events at the same time; the lifecycle manager decides what
//! to do with either.

use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Selector that asks a backend to poll instead of using OS notifications.
pub const POLL_BACKEND: &str = "poll";

/// Change kinds as a backend reports them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RawChangeKind {
    Create,
    Update,
    Delete,
}

impl fmt::Display for RawChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RawChangeKind::Create => "create",
            RawChangeKind::Update => "update",
            RawChangeKind::Delete => "delete",
        };
        write!(f, "{}", s)
    }
}

/// One entry of a raw batch. The path is under the subscribed (real) root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub path: PathBuf,
    pub kind: RawChangeKind,
}

impl RawEvent {
    pub fn new(path: impl Into<PathBuf>, kind: RawChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// Structured hint attached to a backend error when the backend knows
/// more than its message says.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorCode {
    /// Watch descriptors or the event queue ran out.
    ResourceExhausted,
    /// The subscribed path is gone.
    PathNotFound,
}

/// An error reported by a backend, either from `subscribe` or through
/// the event callback.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct BackendError {
    pub message: String,
    pub code: Option<BackendErrorCode>,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    pub fn with_code(mut self, code: BackendErrorCode) -> Self {
        self.code = Some(code);
        self
    }
}

impl From<notify::Error> for BackendError {
    fn from(err: notify::Error) -> Self {
        let code = match &err.kind {
            notify::ErrorKind::MaxFilesWatch => Some(BackendErrorCode::ResourceExhausted),
            notify::ErrorKind::PathNotFound => Some(BackendErrorCode::PathNotFound),
            notify::ErrorKind::Io(io) if io.raw_os_error() == Some(ENOSPC) => {
                Some(BackendErrorCode::ResourceExhausted)
            }
            notify::ErrorKind::Io(io) if io.kind() == std::io::ErrorKind::NotFound => {
                Some(BackendErrorCode::PathNotFound)
            }
            _ => None,
        };
        Self {
            message: err.to_string(),
            code,
        }
    }
}

/// errno for "No space left on device" on Linux and macOS.
const ENOSPC: i32 = 28;

/// Receives every raw batch of a subscription.
pub type RawCallback = Arc<dyn Fn(Option<BackendError>, Vec<RawEvent>) + Send + Sync>;

/// Options handed to [`WatchBackend::subscribe`].
#[derive(Debug, Clone, Default)]
pub struct SubscribeOptions {
    /// Which flavor of backend to use, if the backend offers several.
    pub backend: Option<String>,

    /// Ignore globs the backend may apply natively.
    pub ignore: Vec<String>,

    /// Poll at this interval instead of listening for notifications.
    pub polling_interval: Option<Duration>,
}

/// A native change-notification backend.
#[async_trait]
pub trait WatchBackend: Send + Sync {
    /// Short identifier used in diagnostics.
    fn name(&self) -> &'static str;

    /// Opens a recursive subscription on `path`.
    ///
    /// The callback may keep firing for a while after the subscription
    /// is released; callers must tolerate late deliveries.
    async fn subscribe(
        &self,
        path: &Path,
        callback: RawCallback,
        options: SubscribeOptions,
    ) -> Result<Box<dyn Subscription>, BackendError>;
}

/// A live subscription returned by a backend.
#[async_trait]
pub trait Subscription: Send {
    /// Releases the subscription.
    async fn unsubscribe(self: Box<Self>) -> Result<(), BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notify_errors_carry_codes() {
        let err = BackendError::from(notify::Error::new(notify::ErrorKind::MaxFilesWatch));
        assert_eq!(err.code, Some(BackendErrorCode::ResourceExhausted));

        let err = BackendError::from(notify::Error::path_not_found());
        assert_eq!(err.code, Some(BackendErrorCode::PathNotFound));

        let err = BackendError::from(notify::Error::io(std::io::Error::from_raw_os_error(ENOSPC)));
        assert_eq!(err.code, Some(BackendErrorCode::ResourceExhausted));

        let err = BackendError::from(notify::Error::generic("boom"));
        assert_eq!(err.code, None);
        assert!(err.message.contains("boom"));
    }
}
