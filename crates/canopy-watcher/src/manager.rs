//! The watcher table and the lifecycle of every entry in it.
//!
//! The manager is single-writer: it is owned by one task (see
//! [`crate::service`]) and never shared. Backend callbacks, finished
//! subscriptions and restart timers do not touch the table themselves;
//! they post a [`Message`] tagged with the entry's generation and the
//! owning task applies it. A message whose generation no longer matches
//! a live entry is stale and dropped.

use crate::backend::{
    BackendError, RawCallback, RawEvent, SubscribeOptions, Subscription, WatchBackend,
    POLL_BACKEND,
};
use crate::classifier::{ErrorClass, ErrorClassifier};
use crate::coalesce::coalesce_changes;
use crate::config::WatcherConfig;
use crate::exclude::CompiledIgnore;
use crate::normalizer::RequestNormalizer;
use crate::processor::EventProcessor;
use crate::resolver::{PathResolver, ResolvedPath};
use canopy_core::{FileChange, LogMessage, Severity, WatchError, WatchRequest};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

/// Everything published to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchOutput {
    /// One flushed, normalized batch.
    Changes(Vec<FileChange>),
    /// A diagnostic line.
    Log(LogMessage),
}

/// Where an entry is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WatcherState {
    /// Subscription requested, not resolved yet.
    Pending,
    /// Subscribed and delivering events.
    Active,
    /// Hit an error that does not warrant a restart. Degraded.
    Failing,
    /// A debounced restart is scheduled.
    Restarting,
    /// Removed from the table.
    Stopped,
}

/// Diagnostic view of one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatcherStatus {
    pub path: PathBuf,
    pub state: WatcherState,
    pub restarts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub real_path: Option<PathBuf>,
}

/// What a reconciliation did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    pub started: Vec<PathBuf>,
    pub stopped: Vec<PathBuf>,
}

impl ReconcileSummary {
    pub fn is_noop(&self) -> bool {
        self.started.is_empty() && self.stopped.is_empty()
    }
}

/// Work posted back to the owning task.
pub(crate) enum Message {
    Subscribed {
        path: PathBuf,
        generation: u64,
        result: Result<Box<dyn Subscription>, BackendError>,
    },
    Raw {
        path: PathBuf,
        generation: u64,
        error: Option<BackendError>,
        events: Vec<RawEvent>,
    },
    RestartDue {
        path: PathBuf,
        generation: u64,
    },
    ReleaseFailed {
        path: PathBuf,
        error: BackendError,
    },
}

/// The live record for one accepted request.
struct WatcherEntry {
    request: WatchRequest,
    generation: u64,
    state: WatcherState,
    subscription: Option<Box<dyn Subscription>>,
    processor: EventProcessor,
    restarts: u32,
    token: CancellationToken,
    resolved: ResolvedPath,
}

/// Requested path to entry. At most one entry per path.
#[derive(Default)]
struct WatcherTable {
    entries: HashMap<PathBuf, WatcherEntry>,
}

impl WatcherTable {
    fn get(&self, path: &Path) -> Option<&WatcherEntry> {
        self.entries.get(path)
    }

    fn get_mut(&mut self, path: &Path) -> Option<&mut WatcherEntry> {
        self.entries.get_mut(path)
    }

    /// The entry for `path` if it is still the one `generation` refers to.
    fn current(&mut self, path: &Path, generation: u64) -> Option<&mut WatcherEntry> {
        self.entries
            .get_mut(path)
            .filter(|e| e.generation == generation && !e.token.is_cancelled())
    }

    fn insert(&mut self, entry: WatcherEntry) {
        let path = entry.request.path.clone();
        if let Some(previous) = self.entries.insert(path, entry) {
            // Callers stop before they start; a leftover would leak its token.
            previous.token.cancel();
        }
    }

    fn remove(&mut self, path: &Path) -> Option<WatcherEntry> {
        self.entries.remove(path)
    }

    fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<_> = self.entries.keys().cloned().collect();
        paths.sort();
        paths
    }

    fn iter(&self) -> impl Iterator<Item = (&PathBuf, &WatcherEntry)> {
        self.entries.iter()
    }
}

/// A single-shot restart that dies with its entry's token.
struct DebouncedRestart {
    path: PathBuf,
    generation: u64,
    delay: Duration,
    token: CancellationToken,
}

impl DebouncedRestart {
    fn schedule(self, inbox: mpsc::UnboundedSender<Message>) {
        let DebouncedRestart {
            path,
            generation,
            delay,
            token,
        } = self;

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = inbox.send(Message::RestartDue { path, generation });
                }
            }
        });
    }
}

/// Owns the watcher table and drives every entry's state machine.
pub struct WatcherManager {
    backend: Arc<dyn WatchBackend>,
    config: WatcherConfig,
    table: WatcherTable,
    normalizer: RequestNormalizer,
    resolver: PathResolver,
    classifier: ErrorClassifier,
    output: mpsc::UnboundedSender<WatchOutput>,
    inbox: mpsc::UnboundedSender<Message>,
    verbose: bool,
    next_generation: u64,
}

impl WatcherManager {
    pub(crate) fn new(
        backend: Arc<dyn WatchBackend>,
        config: WatcherConfig,
        output: mpsc::UnboundedSender<WatchOutput>,
    ) -> (Self, mpsc::UnboundedReceiver<Message>) {
        let (inbox, messages) = mpsc::unbounded_channel();
        let manager = Self {
            backend,
            normalizer: RequestNormalizer::new(config.ignore_case, config.validate_paths),
            resolver: PathResolver::new(),
            classifier: ErrorClassifier::new(),
            table: WatcherTable::default(),
            verbose: config.verbose,
            config,
            output,
            inbox,
            next_generation: 0,
        };
        (manager, messages)
    }

    /// Brings the table in line with `requests`.
    ///
    /// Entries whose request is gone or changed are stopped first, then
    /// new entries are started. Calling this twice with the same set
    /// does nothing the second time.
    pub fn reconcile(&mut self, requests: Vec<WatchRequest>) -> ReconcileSummary {
        let normalized = self.normalizer.normalize(requests);

        for dropped in &normalized.dropped {
            self.log(
                Severity::Trace,
                Some(&dropped.path),
                format!("ignoring a path for watching because {}", dropped.reason),
            );
        }

        let desired: HashMap<&Path, &WatchRequest> = normalized
            .accepted
            .iter()
            .map(|r| (r.path.as_path(), r))
            .collect();

        let mut to_stop: Vec<PathBuf> = self
            .table
            .iter()
            .filter(|(path, entry)| {
                desired
                    .get(path.as_path())
                    .map_or(true, |r| r.signature() != entry.request.signature())
            })
            .map(|(path, _)| path.clone())
            .collect();
        to_stop.sort();

        let mut to_start: Vec<WatchRequest> = normalized
            .accepted
            .iter()
            .filter(|r| {
                self.table
                    .get(&r.path)
                    .map_or(true, |e| e.request.signature() != r.signature())
            })
            .cloned()
            .collect();
        to_start.sort_by(|a, b| a.path.cmp(&b.path));

        if !to_start.is_empty() {
            self.log(
                Severity::Debug,
                None,
                format!("request to start watching: {}", join(&to_start)),
            );
        }
        if !to_stop.is_empty() {
            self.log(
                Severity::Debug,
                None,
                format!(
                    "request to stop watching: {}",
                    to_stop
                        .iter()
                        .map(|p| p.display().to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            );
        }

        for path in &to_stop {
            self.stop_entry(path);
        }

        let started = to_start.iter().map(|r| r.path.clone()).collect();
        for request in to_start {
            self.start_entry(request, 0, Vec::new(), None);
        }

        ReconcileSummary {
            started,
            stopped: to_stop,
        }
    }

    /// Stops every entry. Returns how many there were.
    pub fn stop_all(&mut self) -> usize {
        let paths = self.table.paths();
        for path in &paths {
            self.stop_entry(path);
        }
        paths.len()
    }

    pub fn set_verbose(&mut self, enabled: bool) {
        self.verbose = enabled;
    }

    /// Snapshot of the table, sorted by path.
    pub fn statuses(&self) -> Vec<WatcherStatus> {
        let mut statuses: Vec<_> = self
            .table
            .iter()
            .map(|(path, entry)| WatcherStatus {
                path: path.clone(),
                state: entry.state,
                restarts: entry.restarts,
                real_path: entry
                    .resolved
                    .real_path_differs
                    .then(|| entry.resolved.real_path.clone()),
            })
            .collect();
        statuses.sort_by(|a, b| a.path.cmp(&b.path));
        statuses
    }

    /// Routes an error that no watcher claimed, such as a panic in the host.
    pub fn on_unexpected_error(&mut self, error: BackendError) {
        match self.classifier.classify(&error, true) {
            ErrorClass::ResourceExhaustion { first_report: true } => {
                self.log(Severity::Error, None, WatchError::ResourceExhaustion)
            }
            ErrorClass::ResourceExhaustion { .. } => {}
            _ => self.log(Severity::Error, None, WatchError::transient(error.message)),
        }
    }

    pub(crate) fn handle(&mut self, message: Message) {
        match message {
            Message::Subscribed {
                path,
                generation,
                result,
            } => self.on_subscribed(path, generation, result),
            Message::Raw {
                path,
                generation,
                error,
                events,
            } => self.on_raw(path, generation, error, events),
            Message::RestartDue { path, generation } => self.on_restart_due(path, generation),
            Message::ReleaseFailed { path, error } => self.log(
                Severity::Warn,
                Some(&path),
                format!("failed to stop watching: {}", error),
            ),
        }
    }

    fn start_entry(
        &mut self,
        request: WatchRequest,
        restarts: u32,
        carried: Vec<FileChange>,
        previous: Option<Box<dyn Subscription>>,
    ) {
        self.next_generation += 1;
        let generation = self.next_generation;
        let path = request.path.clone();

        let resolved = self.resolver.resolve(&path);
        if resolved.real_path_differs {
            self.log(
                Severity::Warn,
                Some(&path),
                format!(
                    "correcting a path to watch that seems to be a symbolic link or wrong casing \
                     (original: {}, real: {})",
                    path.display(),
                    resolved.real_path.display()
                ),
            );
        }

        let (ignore, invalid) =
            CompiledIgnore::compile(&resolved.real_path, &[path.as_path()], &request.excludes);
        for pattern in invalid {
            self.log(
                Severity::Warn,
                Some(&path),
                format!("ignoring invalid exclude '{}': {}", pattern.pattern, pattern.reason),
            );
        }

        let mut processor = EventProcessor::new(
            &request,
            resolved.clone(),
            ignore,
            self.config.normalize_unicode,
        );
        processor.carry_over(carried);

        let token = CancellationToken::new();
        let options = SubscribeOptions {
            backend: self.backend_selector(&request),
            ignore: request.excludes.clone(),
            polling_interval: request.polling_interval(),
        };

        self.spawn_subscribe(
            path.clone(),
            generation,
            resolved.real_path.clone(),
            options,
            token.clone(),
            previous,
        );

        self.table.insert(WatcherEntry {
            request,
            generation,
            state: WatcherState::Pending,
            subscription: None,
            processor,
            restarts,
            token,
            resolved,
        });
    }

    fn backend_selector(&self, request: &WatchRequest) -> Option<String> {
        if request.polling_interval_ms.is_some() {
            Some(POLL_BACKEND.to_string())
        } else {
            self.config.backend.clone()
        }
    }

    fn callback(&self, path: PathBuf, generation: u64) -> RawCallback {
        let inbox = self.inbox.clone();
        Arc::new(move |error, events| {
            let _ = inbox.send(Message::Raw {
                path: path.clone(),
                generation,
                error,
                events,
            });
        })
    }

    /// Opens the subscription off-task. A `previous` subscription for
    /// the same path is released first so the backend never sees both.
    fn spawn_subscribe(
        &self,
        path: PathBuf,
        generation: u64,
        real_path: PathBuf,
        options: SubscribeOptions,
        token: CancellationToken,
        previous: Option<Box<dyn Subscription>>,
    ) {
        let backend = self.backend.clone();
        let inbox = self.inbox.clone();
        let callback = self.callback(path.clone(), generation);

        tokio::spawn(async move {
            if let Some(previous) = previous {
                if let Err(error) = previous.unsubscribe().await {
                    let _ = inbox.send(Message::ReleaseFailed {
                        path: path.clone(),
                        error,
                    });
                }
            }

            // A panicking backend surfaces here as a join error.
            let task =
                tokio::spawn(async move { backend.subscribe(&real_path, callback, options).await });
            let result = match task.await {
                Ok(result) => result,
                Err(e) => Err(BackendError::new(format!("subscription task failed: {}", e))),
            };

            if token.is_cancelled() {
                if let Ok(subscription) = result {
                    let _ = subscription.unsubscribe().await;
                }
                return;
            }

            let _ = inbox.send(Message::Subscribed {
                path,
                generation,
                result,
            });
        });
    }

    fn on_subscribed(
        &mut self,
        path: PathBuf,
        generation: u64,
        result: Result<Box<dyn Subscription>, BackendError>,
    ) {
        let backend = self.backend.name();
        let Some(entry) = self.table.current(&path, generation) else {
            if let Ok(subscription) = result {
                self.release(path, subscription);
            }
            return;
        };

        match result {
            Ok(subscription) => {
                entry.subscription = Some(subscription);
                entry.state = WatcherState::Active;
                let started = format!(
                    "started watching '{}' with backend '{}' and native excludes '{}'",
                    entry.resolved.real_path.display(),
                    backend,
                    entry.request.excludes.join(", ")
                );
                let batch = entry.processor.flush();

                self.log(Severity::Trace, Some(&path), started);
                self.emit(batch);
            }
            Err(error) => {
                let rejected = WatchError::SubscriptionRejected {
                    path: entry.resolved.real_path.clone(),
                    message: error.message.clone(),
                };
                self.log(Severity::Debug, Some(&path), rejected);
                self.on_error(&path, error);
            }
        }
    }

    fn on_raw(
        &mut self,
        path: PathBuf,
        generation: u64,
        error: Option<BackendError>,
        events: Vec<RawEvent>,
    ) {
        if self.table.current(&path, generation).is_none() {
            trace!(
                "[{}] dropping {} event(s) from a released watcher",
                path.display(),
                events.len()
            );
            return;
        }

        if self.verbose {
            for event in &events {
                self.log(
                    Severity::Trace,
                    None,
                    format!("{} {}", event.kind, event.path.display()),
                );
            }
        }

        if let Some(entry) = self.table.current(&path, generation) {
            entry.processor.accumulate(events);
        }

        if let Some(error) = error {
            self.on_error(&path, error);
        }

        // Hold the batch while a restart is pending; the replacement
        // entry inherits it. An abandoned entry was flushed on the way out.
        let batch = match self.table.current(&path, generation) {
            Some(entry)
                if entry.state != WatcherState::Restarting && entry.processor.has_pending() =>
            {
                entry.processor.flush()
            }
            _ => return,
        };
        self.emit(batch);
    }

    fn on_error(&mut self, path: &Path, error: BackendError) {
        let exists = path.exists();

        match self.classifier.classify(&error, exists) {
            ErrorClass::ResourceExhaustion { first_report } => {
                if first_report {
                    self.log(Severity::Error, Some(path), WatchError::ResourceExhaustion);
                } else {
                    debug!("[{}] resource exhaustion again: {}", path.display(), error);
                }
                if let Some(entry) = self.table.get_mut(path) {
                    if entry.state == WatcherState::Pending {
                        entry.state = WatcherState::Failing;
                    }
                }
            }
            ErrorClass::Transient => self.fail(path, WatchError::transient(error.message)),
            ErrorClass::PathVanished => {
                debug!("[{}] error after path vanished: {}", path.display(), error);
                self.fail(
                    path,
                    WatchError::PathVanished {
                        path: path.to_path_buf(),
                    },
                );
            }
        }
    }

    /// Terminal reasons end the entry; anything else earns a restart.
    fn fail(&mut self, path: &Path, reason: WatchError) {
        if reason.is_terminal() {
            self.abandon(path, reason);
        } else {
            self.log(Severity::Warn, Some(path), reason);
            self.schedule_restart(path);
        }
    }

    fn schedule_restart(&mut self, path: &Path) {
        let max_restarts = self.config.max_restarts;
        let delay = self.config.restart_delay();

        let Some(entry) = self.table.get_mut(path) else {
            return;
        };
        if entry.state == WatcherState::Restarting {
            return;
        }

        if entry.restarts >= max_restarts {
            let restarts = entry.restarts;
            self.fail(
                path,
                WatchError::RestartsExhausted {
                    path: path.to_path_buf(),
                    restarts,
                },
            );
            return;
        }

        entry.state = WatcherState::Restarting;
        let attempt = entry.restarts + 1;
        DebouncedRestart {
            path: path.to_path_buf(),
            generation: entry.generation,
            delay,
            token: entry.token.clone(),
        }
        .schedule(self.inbox.clone());

        self.log(
            Severity::Debug,
            Some(path),
            format!(
                "restarting watcher in {}ms (attempt {} of {})",
                delay.as_millis(),
                attempt,
                max_restarts
            ),
        );
    }

    fn on_restart_due(&mut self, path: PathBuf, generation: u64) {
        match self.table.current(&path, generation) {
            Some(entry) if entry.state == WatcherState::Restarting => {}
            _ => return,
        }

        let Some(mut entry) = self.retire(&path, false) else {
            return;
        };
        let carried = entry.processor.flush();
        let previous = entry.subscription.take();

        self.start_entry(entry.request, entry.restarts + 1, carried, previous);
    }

    /// Gives up on an entry for good.
    fn abandon(&mut self, path: &Path, reason: WatchError) {
        self.log(Severity::Error, Some(path), &reason);
        self.stop_entry(path);
    }

    fn stop_entry(&mut self, path: &Path) {
        if let Some(mut entry) = self.retire(path, true) {
            if let Some(subscription) = entry.subscription.take() {
                self.release(path.to_path_buf(), subscription);
            }
        }
    }

    /// Removes an entry and cancels its token. Table membership ends
    /// here, before any subscription is released.
    fn retire(&mut self, path: &Path, flush: bool) -> Option<WatcherEntry> {
        let mut entry = self.table.remove(path)?;
        entry.token.cancel();
        entry.state = WatcherState::Stopped;

        if flush {
            let batch = entry.processor.flush();
            self.emit(batch);
        }

        Some(entry)
    }

    fn release(&self, path: PathBuf, subscription: Box<dyn Subscription>) {
        let inbox = self.inbox.clone();
        tokio::spawn(async move {
            if let Err(error) = subscription.unsubscribe().await {
                let _ = inbox.send(Message::ReleaseFailed { path, error });
            }
        });
    }

    fn emit(&self, batch: Vec<FileChange>) {
        if batch.is_empty() {
            return;
        }

        let batch = coalesce_changes(batch);
        if batch.is_empty() {
            return;
        }

        if self.verbose {
            for change in &batch {
                self.log(
                    Severity::Trace,
                    None,
                    format!(" >> normalized {} {}", change.kind, change.path.display()),
                );
            }
        }

        let _ = self.output.send(WatchOutput::Changes(batch));
    }

    fn log(&self, severity: Severity, path: Option<&Path>, text: impl fmt::Display) {
        let message = LogMessage::for_path(severity, path, text);
        match severity {
            Severity::Trace => trace!("{}", message.text),
            Severity::Debug => debug!("{}", message.text),
            Severity::Warn => warn!("{}", message.text),
            Severity::Error => error!("{}", message.text),
        }

        if severity == Severity::Trace && !self.verbose {
            return;
        }
        let _ = self.output.send(WatchOutput::Log(message));
    }
}

fn join(requests: &[WatchRequest]) -> String {
    requests
        .iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
