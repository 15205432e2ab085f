//! Canopy Server - the host-process surface of the watcher
//!
//! This crate exposes a [`canopy_watcher::WatcherService`] to a host
//! process over stdio, one JSON-RPC 2.0 message per line.
//!
//! Methods:
//! - `watch` replaces the set of watched folders
//! - `stop` tears every watcher down
//! - `setVerboseLogging` toggles per-event traces
//! - `watchers` lists the current watchers
//!
//! Change batches and diagnostics are pushed as `onChangeBatch` and
//! `onLogMessage` notifications.

mod handlers;
mod protocol;
mod server;

pub use protocol::{
    Notification, Request, Response, RpcError, SetVerboseParams, WatchParams, ON_CHANGE_BATCH,
    ON_LOG_MESSAGE,
};
pub use server::{CanopyServer, ServerConfig, ServerError};
