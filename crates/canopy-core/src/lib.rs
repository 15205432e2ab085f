//! Canopy Core - the shared vocabulary of the watcher
//!
//! This crate holds the types that cross every boundary in Canopy:
//! what a caller asks to watch, what comes back out as a change,
//! and what goes wrong along the way. It does no I/O of its own.
//!
//! # Example
//!
//! ```
//! use canopy_core::{ChangeKind, FileChange, WatchRequest};
//!
//! let request = WatchRequest::new("/workspace").with_excludes(["**/.git"]);
//! assert_eq!(request.excludes.len(), 1);
//!
//! let change = FileChange::new("/workspace/src/main.rs", ChangeKind::Updated);
//! assert_eq!(change.kind, ChangeKind::Updated);
//! ```

pub mod change;
pub mod error;
pub mod log;
pub mod request;

pub use change::{ChangeKind, FileChange};
pub use error::WatchError;
pub use log::{LogMessage, Severity};
pub use request::{RequestSignature, WatchRequest};
