//! Per-path debounce of local edits
//!
//! Every `change(path)` restarts that path's timer. A timer that expires
//! without being superseded fires the callback with the path. Superseded
//! timers wake up, notice a newer token and exit without firing.

use crate::config::ChangeTrackerConfig;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

/// Invoked with a path once its debounce expires
pub type TrackerCallback = Arc<dyn Fn(String) -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Debug)]
struct Entry {
    token: u64,
    edited_at: Instant,
    pending: bool,
}

#[derive(Debug, Default)]
struct TrackerInner {
    entries: HashMap<String, Entry>,
    next_token: u64,
}

impl TrackerInner {
    fn is_finished(&self) -> bool {
        !self.entries.values().any(|entry| entry.pending)
    }
}

/// Debounces local edits per path
pub struct ChangeTracker {
    config: ChangeTrackerConfig,
    callback: TrackerCallback,
    inner: Arc<Mutex<TrackerInner>>,
    finished: Arc<Notify>,
}

impl std::fmt::Debug for ChangeTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeTracker")
            .field("config", &self.config)
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

impl ChangeTracker {
    /// Create a tracker that calls `callback` per expired path
    #[must_use]
    pub fn new(config: ChangeTrackerConfig, callback: TrackerCallback) -> Self {
        Self {
            config,
            callback,
            inner: Arc::new(Mutex::new(TrackerInner::default())),
            finished: Arc::new(Notify::new()),
        }
    }

    /// Record an edit at `path` and (re)start its timer
    ///
    /// Must be called from within a tokio runtime.
    pub fn change(&self, path: &str) {
        let token = {
            let mut inner = self.inner.lock();
            inner.next_token += 1;
            let token = inner.next_token;
            inner.entries.insert(
                path.to_string(),
                Entry {
                    token,
                    edited_at: Instant::now(),
                    pending: true,
                },
            );
            token
        };

        let inner = Arc::clone(&self.inner);
        let finished = Arc::clone(&self.finished);
        let callback = Arc::clone(&self.callback);
        let debounce = self.config.debounce();
        let path = path.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            {
                let mut guard = inner.lock();
                match guard.entries.get_mut(&path) {
                    Some(entry) if entry.token == token => entry.pending = false,
                    _ => return,
                }
                if guard.is_finished() {
                    finished.notify_waiters();
                }
            }
            debug!(path = %path, "debounce expired");
            callback(path).await;
        });
    }

    /// True while a timer for `path` is pending or its last edit is fresh
    ///
    /// Settled entries past their freshness window are dropped.
    pub fn has_changed(&self, path: &str) -> bool {
        let freshness = self.config.freshness();
        let mut inner = self.inner.lock();
        inner
            .entries
            .retain(|_, entry| entry.pending || entry.edited_at.elapsed() < freshness);
        inner.entries.contains_key(path)
    }

    /// Forget every edit; pending timers exit without firing
    pub fn reset(&self) {
        let dropped = {
            let mut inner = self.inner.lock();
            let dropped = inner.entries.len();
            inner.entries.clear();
            dropped
        };
        if dropped > 0 {
            debug!(dropped, "change tracker reset");
        }
        self.finished.notify_waiters();
    }

    /// No timer is pending
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.inner.lock().is_finished()
    }

    /// Resolve once no timer is pending
    pub async fn wait_finished(&self) {
        loop {
            let notified = self.finished.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_finished() {
                return;
            }
            notified.await;
        }
    }
}
