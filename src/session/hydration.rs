//! Boot-time hydration.
//!
//! Two independent signals feed the one-shot `hydrated` latch:
//! - the storage restore, which also installs any saved user/token;
//! - a fallback timer, so a stalled or absent storage never blocks the UI.
//!
//! Whichever finishes first flips the latch. Installing restored data is a
//! separate side effect: a restore that lands after the timer still applies.

use super::store::SessionStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Default wait before the fallback timer gives up on storage.
pub const DEFAULT_FALLBACK: Duration = Duration::from_millis(500);

/// Handle to an in-progress hydration.
pub struct Hydration {
    restore: JoinHandle<bool>,
    fallback: JoinHandle<()>,
}

impl Hydration {
    /// Wait for the storage restore to finish, regardless of who won the
    /// latch. Returns whether a saved session was applied.
    pub async fn restored(self) -> bool {
        self.fallback.abort();
        match self.restore.await {
            Ok(applied) => applied,
            Err(e) => {
                tracing::warn!("Session restore task failed: {e}");
                false
            }
        }
    }
}

/// Start restoring the persisted session and arm the fallback timer.
pub fn start(store: Arc<SessionStore>, fallback_after: Duration) -> Hydration {
    let restore = {
        let store = store.clone();
        tokio::spawn(async move {
            let storage = store.storage();
            let applied = match tokio::task::spawn_blocking(move || storage.load()).await {
                Ok(Ok(Some(record))) => store.apply_restored(&record),
                Ok(Ok(None)) => false,
                Ok(Err(e)) => {
                    tracing::warn!("Session record unreadable, starting signed out: {e}");
                    false
                }
                Err(e) => {
                    tracing::warn!("Session storage read panicked: {e}");
                    false
                }
            };
            store.set_hydrated(true);
            applied
        })
    };

    let fallback = tokio::spawn(async move {
        tokio::select! {
            () = store.wait_hydrated() => {}
            () = tokio::time::sleep(fallback_after) => {
                if !store.hydrated() {
                    tracing::info!(
                        fallback_ms = fallback_after.as_millis() as u64,
                        "Session storage slow to restore; continuing signed out"
                    );
                }
                store.set_hydrated(true);
            }
        }
    });

    Hydration { restore, fallback }
}
