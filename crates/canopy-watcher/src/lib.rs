//! Canopy Watcher - keeps a set of recursive folder watches alive
//!
//! Callers describe what they want watched as a list of
//! [`canopy_core::WatchRequest`]s. This crate takes care of the rest:
//! - Dropping requests already covered by a parent request
//! - Resolving symlinks and wrong casing to the real path
//! - Filtering excluded paths and rewriting event paths back
//! - Restarting watchers that fail, and giving up when they keep failing
//!
//! Everything runs on one task behind [`WatcherService`]; output arrives
//! as a stream of [`WatchOutput`] values.

pub mod backend;
mod classifier;
mod coalesce;
pub mod config;
mod exclude;
mod manager;
mod normalizer;
mod notify_backend;
mod processor;
mod resolver;
mod service;

#[cfg(test)]
mod testing;

pub use backend::{
    BackendError, BackendErrorCode, RawCallback, RawChangeKind, RawEvent, SubscribeOptions,
    Subscription, WatchBackend,
};
pub use coalesce::coalesce_changes;
pub use config::{ConfigError, WatcherConfig};
pub use manager::{ReconcileSummary, WatchOutput, WatcherState, WatcherStatus};
pub use normalizer::{DropReason, DroppedRequest, Normalized, RequestNormalizer};
pub use notify_backend::NotifyBackend;
pub use resolver::{PathResolver, ResolvedPath};
pub use service::WatcherService;
