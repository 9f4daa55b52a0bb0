//! Background task bookkeeping.
//!
//! Long-running calls that must not block page rendering (downloads, report
//! generation) register an id here while in flight. Anyone can ask whether
//! background work is outstanding, e.g. before navigating away.
//!
//! This is a set, not a queue: no ordering, no expiry, no retries. Callers
//! own removal, so prefer [`BackgroundTaskTracker::guard`] or
//! [`BackgroundTaskTracker::track`], which remove the id on every exit path.

use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;

/// Observable loading state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadingState {
    /// Coarse full-page loading flag. Unrelated to the task set.
    pub global_loading: bool,
    pub background_tasks: HashSet<String>,
}

#[derive(Debug)]
pub struct BackgroundTaskTracker {
    state: watch::Sender<LoadingState>,
    seq: AtomicU64,
}

impl BackgroundTaskTracker {
    pub fn new() -> Self {
        let (state, _) = watch::channel(LoadingState::default());
        Self {
            state,
            seq: AtomicU64::new(0),
        }
    }

    /// Register an id. Adding an id twice leaves one entry.
    pub fn add_task(&self, id: &str) {
        self.state.send_if_modified(|s| s.background_tasks.insert(id.to_string()));
    }

    /// Remove an id. Absent ids are ignored.
    pub fn remove_task(&self, id: &str) {
        self.state.send_if_modified(|s| s.background_tasks.remove(id));
    }

    pub fn has_background_tasks(&self) -> bool {
        !self.state.borrow().background_tasks.is_empty()
    }

    pub fn task_count(&self) -> usize {
        self.state.borrow().background_tasks.len()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.state.borrow().background_tasks.contains(id)
    }

    pub fn set_global_loading(&self, loading: bool) {
        self.state.send_if_modified(|s| {
            let changed = s.global_loading != loading;
            s.global_loading = loading;
            changed
        });
    }

    pub fn global_loading(&self) -> bool {
        self.state.borrow().global_loading
    }

    pub fn subscribe(&self) -> watch::Receiver<LoadingState> {
        self.state.subscribe()
    }

    /// Fresh id of the form `<operation>-<subject>-<unix_millis>-<seq>`.
    /// The sequence keeps concurrent calls within one millisecond apart.
    pub fn next_task_id(&self, operation: &str, subject: impl std::fmt::Display) -> String {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let millis = chrono::Utc::now().timestamp_millis();
        format!("{operation}-{subject}-{millis}-{seq}")
    }

    /// Register `id` until the returned guard is dropped.
    pub fn guard(&self, id: impl Into<String>) -> TaskGuard<'_> {
        let id = id.into();
        self.add_task(&id);
        TaskGuard { tracker: self, id }
    }

    /// Run `fut` with `id` registered for exactly its lifetime, whether it
    /// succeeds, fails, or is dropped mid-flight.
    pub async fn track<F: Future>(&self, id: impl Into<String>, fut: F) -> F::Output {
        let _guard = self.guard(id);
        fut.await
    }
}

impl Default for BackgroundTaskTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Removes its task id from the tracker on drop.
#[must_use = "the task is removed as soon as the guard is dropped"]
#[derive(Debug)]
pub struct TaskGuard<'a> {
    tracker: &'a BackgroundTaskTracker,
    id: String,
}

impl TaskGuard<'_> {
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for TaskGuard<'_> {
    fn drop(&mut self) {
        self.tracker.remove_task(&self.id);
    }
}
