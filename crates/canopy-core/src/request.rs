//! Watch requests and their identity.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// The bare globstar. A request excluding this excludes everything.
pub const GLOBSTAR: &str = "**";

/// A caller's declaration that a directory should be watched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchRequest {
    /// Absolute path of the directory to watch recursively.
    pub path: PathBuf,

    /// Ignore globs, applied in order.
    #[serde(default)]
    pub excludes: Vec<String>,

    /// Poll instead of using native notifications.
    #[serde(
        default,
        rename = "pollingInterval",
        skip_serializing_if = "Option::is_none"
    )]
    pub polling_interval_ms: Option<u64>,
}

impl WatchRequest {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            excludes: Vec::new(),
            polling_interval_ms: None,
        }
    }

    pub fn with_excludes<I, S>(mut self, excludes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excludes = excludes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_polling_interval(mut self, interval: Duration) -> Self {
        self.polling_interval_ms = Some(interval.as_millis() as u64);
        self
    }

    pub fn polling_interval(&self) -> Option<Duration> {
        self.polling_interval_ms.map(Duration::from_millis)
    }

    /// True when the excludes rule out every file under the root.
    pub fn excludes_everything(&self) -> bool {
        self.excludes.iter().any(|e| e == GLOBSTAR)
    }

    /// Everything besides the path that decides whether a running
    /// watcher can keep serving this request.
    ///
    /// Excludes compare in order: a negated pattern means something
    /// different depending on what precedes it.
    pub fn signature(&self) -> RequestSignature {
        RequestSignature {
            excludes: self.excludes.clone(),
            polling_interval_ms: self.polling_interval_ms,
        }
    }
}

impl fmt::Display for WatchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())?;
        if !self.excludes.is_empty() {
            write!(f, " (excludes: {})", self.excludes.join(", "))?;
        }
        if let Some(interval) = self.polling_interval_ms {
            write!(f, " (polling: {}ms)", interval)?;
        }
        Ok(())
    }
}

/// Opaque identity of a request's options.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestSignature {
    excludes: Vec<String>,
    polling_interval_ms: Option<u64>,
}
