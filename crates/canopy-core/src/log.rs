//! Diagnostic messages published to the host.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// How loud a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Trace,
    Debug,
    Warn,
    Error,
}

/// A single diagnostic line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogMessage {
    pub severity: Severity,
    pub text: String,
}

impl LogMessage {
    pub fn new(severity: Severity, text: impl Into<String>) -> Self {
        Self {
            severity,
            text: text.into(),
        }
    }

    /// Builds a message, prefixing the watched path when there is one.
    pub fn for_path(severity: Severity, path: Option<&Path>, text: impl fmt::Display) -> Self {
        let text = match path {
            Some(path) => format!("[{}] {}", path.display(), text),
            None => text.to_string(),
        };
        Self { severity, text }
    }
}

impl fmt::Display for LogMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}
