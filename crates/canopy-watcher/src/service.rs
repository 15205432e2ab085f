//! The host-facing handle to a running watcher.
//!
//! [`WatcherService::spawn`] moves a [`WatcherManager`] onto its own task
//! and hands back a cheap, cloneable handle. Every call on the handle is
//! a message to that task, so reconciliation, stop and event handling
//! never interleave.

use crate::backend::{BackendError, WatchBackend};
use crate::config::WatcherConfig;
use crate::manager::{Message, ReconcileSummary, WatchOutput, WatcherManager, WatcherStatus};
use crate::notify_backend::NotifyBackend;
use canopy_core::WatchRequest;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

enum Command {
    Watch {
        requests: Vec<WatchRequest>,
        reply: oneshot::Sender<ReconcileSummary>,
    },
    Stop {
        reply: oneshot::Sender<usize>,
    },
    SetVerbose(bool),
    Status {
        reply: oneshot::Sender<Vec<WatcherStatus>>,
    },
    UnexpectedError(BackendError),
}

/// Handle to the watcher task. Dropping the last handle stops every
/// watcher and ends the task.
#[derive(Debug, Clone)]
pub struct WatcherService {
    commands: mpsc::UnboundedSender<Command>,
}

impl WatcherService {
    /// Starts the watcher task on the current tokio runtime.
    ///
    /// Returns the handle and the stream of change batches and log
    /// messages.
    pub fn spawn(
        backend: Arc<dyn WatchBackend>,
        config: WatcherConfig,
    ) -> (Self, mpsc::UnboundedReceiver<WatchOutput>) {
        let (output, outputs) = mpsc::unbounded_channel();
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (manager, messages) = WatcherManager::new(backend, config, output);

        tokio::spawn(run(manager, command_rx, messages));

        (Self { commands }, outputs)
    }

    /// Starts the watcher task with the native notify backend.
    pub fn native(config: WatcherConfig) -> (Self, mpsc::UnboundedReceiver<WatchOutput>) {
        Self::spawn(Arc::new(NotifyBackend::new()), config)
    }

    /// Replaces the desired set of watches. Idempotent.
    ///
    /// Never fails: problems with individual paths show up on the log
    /// stream.
    pub async fn watch(&self, requests: Vec<WatchRequest>) -> ReconcileSummary {
        let (reply, rx) = oneshot::channel();
        if self.commands.send(Command::Watch { requests, reply }).is_err() {
            warn!("watch request sent to a stopped watcher service");
            return ReconcileSummary::default();
        }
        rx.await.unwrap_or_default()
    }

    /// Stops every watcher. Returns how many were running.
    pub async fn stop(&self) -> usize {
        let (reply, rx) = oneshot::channel();
        if self.commands.send(Command::Stop { reply }).is_err() {
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    /// Toggles per-event trace messages on the log stream.
    pub fn set_verbose_logging(&self, enabled: bool) {
        let _ = self.commands.send(Command::SetVerbose(enabled));
    }

    /// Current watchers, for diagnostics.
    pub async fn watchers(&self) -> Vec<WatcherStatus> {
        let (reply, rx) = oneshot::channel();
        if self.commands.send(Command::Status { reply }).is_err() {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    /// Reports an error that did not come from any watcher.
    pub fn report_unexpected_error(&self, message: impl Into<String>) {
        let _ = self
            .commands
            .send(Command::UnexpectedError(BackendError::new(message)));
    }
}

async fn run(
    mut manager: WatcherManager,
    mut commands: mpsc::UnboundedReceiver<Command>,
    mut messages: mpsc::UnboundedReceiver<Message>,
) {
    loop {
        tokio::select! {
            biased;
            command = commands.recv() => match command {
                Some(command) => execute(&mut manager, command),
                None => break,
            },
            Some(message) = messages.recv() => manager.handle(message),
        }
    }

    let stopped = manager.stop_all();
    debug!("watcher service shut down, {} watcher(s) stopped", stopped);
}

fn execute(manager: &mut WatcherManager, command: Command) {
    match command {
        Command::Watch { requests, reply } => {
            let _ = reply.send(manager.reconcile(requests));
        }
        Command::Stop { reply } => {
            let _ = reply.send(manager.stop_all());
        }
        Command::SetVerbose(enabled) => manager.set_verbose(enabled),
        Command::Status { reply } => {
            let _ = reply.send(manager.statuses());
        }
        Command::UnexpectedError(error) => manager.on_unexpected_error(error),
    }
}
