//! Decides what a backend error means for the watcher that hit it.

use crate::backend::{BackendError, BackendErrorCode};

/// Message fragment backends use when the OS runs out of watches.
const NO_SPACE_LEFT: &str = "no space left on device";

/// What a backend error means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The OS limit was hit. `first_report` is true only the first time
    /// in this classifier's lifetime.
    ResourceExhaustion { first_report: bool },

    /// The path is still there; a restart may help.
    Transient,

    /// The path is gone.
    PathVanished,
}

/// Classifies backend errors.
///
/// Holds the one-shot exhaustion flag: once set it stays set for the
/// lifetime of the classifier.
#[derive(Debug, Default)]
pub struct ErrorClassifier {
    exhaustion_reported: bool,
}

impl ErrorClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classifies `error`. `path_exists` is whether the watched root is
    /// still on disk.
    pub fn classify(&mut self, error: &BackendError, path_exists: bool) -> ErrorClass {
        if is_resource_exhaustion(error) {
            let first_report = !self.exhaustion_reported;
            self.exhaustion_reported = true;
            return ErrorClass::ResourceExhaustion { first_report };
        }

        if path_exists {
            ErrorClass::Transient
        } else {
            ErrorClass::PathVanished
        }
    }
}

/// Prefers the structured code and falls back to matching the message.
pub fn is_resource_exhaustion(error: &BackendError) -> bool {
    match error.code {
        Some(BackendErrorCode::ResourceExhausted) => true,
        Some(_) => false,
        None => error.message.to_lowercase().contains(NO_SPACE_LEFT),
    }
}
