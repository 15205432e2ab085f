//! Native backend built on the notify crate.
//!
//! Uses the platform's recommended watcher (inotify, FSEvents,
//! ReadDirectoryChangesW) or notify's poll watcher when asked to poll.

use crate::backend::{
    BackendError, RawCallback, RawChangeKind, RawEvent, SubscribeOptions, Subscription,
    WatchBackend, POLL_BACKEND,
};
use crate::exclude::CompiledIgnore;
use async_trait::async_trait;
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, PollWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Poll interval when polling is selected without an explicit interval.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Backend backed by `notify`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotifyBackend;

impl NotifyBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl WatchBackend for NotifyBackend {
    fn name(&self) -> &'static str {
        "notify"
    }

    async fn subscribe(
        &self,
        path: &Path,
        callback: RawCallback,
        options: SubscribeOptions,
    ) -> Result<Box<dyn Subscription>, BackendError> {
        let root = path.to_path_buf();
        let (ignore, invalid) = CompiledIgnore::compile(&root, &[], &options.ignore);
        for pattern in invalid {
            warn!("Native exclude '{}' ignored: {}", pattern.pattern, pattern.reason);
        }

        let handler = move |res: Result<Event, notify::Error>| match res {
            Ok(event) => {
                let mut events = translate_event(event);
                if !ignore.is_empty() {
                    events.retain(|e| !ignore.is_ignored(&e.path));
                }
                if !events.is_empty() {
                    callback(None, events);
                }
            }
            Err(e) => {
                debug!("Watch error: {}", e);
                callback(Some(BackendError::from(e)), Vec::new());
            }
        };

        let poll = options.backend.as_deref() == Some(POLL_BACKEND)
            || options.polling_interval.is_some();

        let mut watcher: Box<dyn Watcher + Send> = if poll {
            let interval = options.polling_interval.unwrap_or(DEFAULT_POLL_INTERVAL);
            let config = notify::Config::default().with_poll_interval(interval);
            Box::new(PollWatcher::new(handler, config)?)
        } else {
            Box::new(notify::recommended_watcher(handler)?)
        };

        watcher.watch(&root, RecursiveMode::Recursive)?;

        info!(
            "Watching {} for changes ({})",
            root.display(),
            if poll { "polling" } else { "native" }
        );

        Ok(Box::new(NotifySubscription { watcher, root }))
    }
}

/// A running notify watcher. Dropping the watcher stops it.
struct NotifySubscription {
    watcher: Box<dyn Watcher + Send>,
    root: PathBuf,
}

#[async_trait]
impl Subscription for NotifySubscription {
    async fn unsubscribe(self: Box<Self>) -> Result<(), BackendError> {
        let NotifySubscription { mut watcher, root } = *self;

        // The root may already be gone, in which case there is nothing to unwatch.
        if let Err(e) = watcher.unwatch(&root) {
            debug!("Unwatch of {} reported: {}", root.display(), e);
        }
        drop(watcher);

        info!("Stopped watching {}", root.display());
        Ok(())
    }
}

/// Maps one notify event onto raw create/update/delete events.
fn translate_event(event: Event) -> Vec<RawEvent> {
    let kind = match event.kind {
        EventKind::Create(_) => RawChangeKind::Create,
        EventKind::Remove(_) => RawChangeKind::Delete,
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => RawChangeKind::Delete,
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => RawChangeKind::Create,
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut paths = event.paths.into_iter();
            return paths
                .next()
                .map(|from| RawEvent::new(from, RawChangeKind::Delete))
                .into_iter()
                .chain(paths.next().map(|to| RawEvent::new(to, RawChangeKind::Create)))
                .collect();
        }
        EventKind::Modify(ModifyKind::Name(_)) => {
            // Rename with no direction: whether the path is still there tells us.
            return event
                .paths
                .into_iter()
                .map(|path| {
                    let kind = if path.exists() {
                        RawChangeKind::Create
                    } else {
                        RawChangeKind::Delete
                    };
                    RawEvent::new(path, kind)
                })
                .collect();
        }
        EventKind::Modify(_) => RawChangeKind::Update,
        EventKind::Access(_) | EventKind::Any | EventKind::Other => return Vec::new(),
    };

    event
        .paths
        .into_iter()
        .map(|path| RawEvent::new(path, kind))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, RemoveKind};
    use std::fs;
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        let mut event = Event::new(kind);
        for path in paths {
            event = event.add_path(PathBuf::from(path));
        }
        event
    }

    #[test]
    fn test_translate_basic_kinds() {
        let created = translate_event(event(EventKind::Create(CreateKind::File), &["/a/f"]));
        assert_eq!(created, vec![RawEvent::new("/a/f", RawChangeKind::Create)]);

        let modified = translate_event(event(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            &["/a/f"],
        ));
        assert_eq!(modified, vec![RawEvent::new("/a/f", RawChangeKind::Update)]);

        let removed = translate_event(event(EventKind::Remove(RemoveKind::File), &["/a/f"]));
        assert_eq!(removed, vec![RawEvent::new("/a/f", RawChangeKind::Delete)]);

        assert!(translate_event(event(EventKind::Any, &["/a/f"])).is_empty());
    }

    #[test]
    fn test_translate_rename_both() {
        let renamed = translate_event(event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/a/old", "/a/new"],
        ));
        assert_eq!(
            renamed,
            vec![
                RawEvent::new("/a/old", RawChangeKind::Delete),
                RawEvent::new("/a/new", RawChangeKind::Create),
            ]
        );
    }

    #[tokio::test]
    async fn test_subscribe_and_unsubscribe() {
        let dir = tempdir().unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();
        let seen: Arc<Mutex<Vec<RawEvent>>> = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        let callback: RawCallback = Arc::new(move |_error, events| {
            sink.lock().unwrap().extend(events);
        });

        let subscription = NotifyBackend::new()
            .subscribe(&root, callback, SubscribeOptions::default())
            .await
            .unwrap();

        fs::write(root.join("test.rs"), "fn main() {}").unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        // Delivery timing varies by platform; only check what did arrive.
        for event in seen.lock().unwrap().iter() {
            assert!(event.path.starts_with(&root));
        }

        assert!(subscription.unsubscribe().await.is_ok());
    }

    #[tokio::test]
    async fn test_subscribe_missing_path_fails() {
        let dir = tempdir().unwrap();
        let callback: RawCallback = Arc::new(|_, _| {});

        let result = NotifyBackend::new()
            .subscribe(&dir.path().join("missing"), callback, SubscribeOptions::default())
            .await;
        assert!(result.is_err());
    }
}
