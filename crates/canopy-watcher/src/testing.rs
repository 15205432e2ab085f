//! In-memory backend for driving the manager from tests.

use crate::backend::{
    BackendError, RawCallback, RawEvent, SubscribeOptions, Subscription, WatchBackend,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

struct Subscribed {
    path: PathBuf,
    options: SubscribeOptions,
    callback: RawCallback,
}

#[derive(Default)]
struct Script {
    subscriptions: Vec<Subscribed>,
    attempts: usize,
    failures: VecDeque<BackendError>,
    released: Vec<PathBuf>,
}

/// Records every subscription and lets the test fire callbacks by hand.
#[derive(Default, Clone)]
pub(crate) struct ScriptedBackend {
    script: Arc<Mutex<Script>>,
}

impl ScriptedBackend {
    /// Makes the next `subscribe` call fail with `error`.
    pub fn fail_next_subscribe(&self, error: BackendError) {
        self.script.lock().unwrap().failures.push_back(error);
    }

    /// Fires the callback of the most recent subscription on `path`.
    pub fn emit(&self, path: &Path, error: Option<BackendError>, events: Vec<RawEvent>) {
        let callback = {
            let script = self.script.lock().unwrap();
            script
                .subscriptions
                .iter()
                .rev()
                .find(|s| s.path == path)
                .map(|s| s.callback.clone())
        };
        let callback = callback.unwrap_or_else(|| panic!("no subscription on {}", path.display()));
        callback(error, events);
    }

    /// Fires the callback of the `index`-th successful subscription,
    /// released or not.
    pub fn emit_to(&self, index: usize, error: Option<BackendError>, events: Vec<RawEvent>) {
        let callback = self.script.lock().unwrap().subscriptions[index]
            .callback
            .clone();
        callback(error, events);
    }

    /// Calls to `subscribe`, failed ones included.
    pub fn subscribe_count(&self) -> usize {
        self.script.lock().unwrap().attempts
    }

    pub fn subscribed_paths(&self) -> Vec<PathBuf> {
        self.script
            .lock()
            .unwrap()
            .subscriptions
            .iter()
            .map(|s| s.path.clone())
            .collect()
    }

    pub fn last_options(&self, path: &Path) -> Option<SubscribeOptions> {
        self.script
            .lock()
            .unwrap()
            .subscriptions
            .iter()
            .rev()
            .find(|s| s.path == path)
            .map(|s| s.options.clone())
    }

    /// Paths whose subscriptions were released, in release order.
    pub fn released(&self) -> Vec<PathBuf> {
        self.script.lock().unwrap().released.clone()
    }
}

#[async_trait]
impl WatchBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn subscribe(
        &self,
        path: &Path,
        callback: RawCallback,
        options: SubscribeOptions,
    ) -> Result<Box<dyn Subscription>, BackendError> {
        let mut script = self.script.lock().unwrap();
        script.attempts += 1;
        if let Some(error) = script.failures.pop_front() {
            return Err(error);
        }

        script.subscriptions.push(Subscribed {
            path: path.to_path_buf(),
            options,
            callback,
        });

        Ok(Box::new(ScriptedSubscription {
            path: path.to_path_buf(),
            script: self.script.clone(),
        }))
    }
}

struct ScriptedSubscription {
    path: PathBuf,
    script: Arc<Mutex<Script>>,
}

#[async_trait]
impl Subscription for ScriptedSubscription {
    async fn unsubscribe(self: Box<Self>) -> Result<(), BackendError> {
        self.script.lock().unwrap().released.push(self.path.clone());
        Ok(())
    }
}
