//! Global reaction to a rejected credential.

use super::persist::SessionStorage;
use super::store::SessionStore;
use crate::routing::{Navigator, Route};
use crate::transport::UnauthorizedHandler;
use std::sync::{Arc, Weak};

/// Registered on the transport at composition time. On any 401 from a
/// session-bound call, whichever view issued it:
/// 1. deletes the persisted session record,
/// 2. clears the in-memory session and the default auth header,
/// 3. sends navigation to the login route.
///
/// No prompt and no return path are kept.
pub struct SessionEviction {
    // Weak: the store owns the transport, which owns this handler.
    store: Weak<SessionStore>,
    storage: Arc<dyn SessionStorage>,
    navigator: Arc<Navigator>,
}

impl SessionEviction {
    pub fn new(store: &Arc<SessionStore>, navigator: Arc<Navigator>) -> Self {
        Self {
            store: Arc::downgrade(store),
            storage: store.storage(),
            navigator,
        }
    }
}

impl UnauthorizedHandler for SessionEviction {
    fn on_unauthorized(&self, path: &str) {
        if let Err(e) = self.storage.remove() {
            tracing::warn!("Failed to delete persisted session: {e}");
        }
        if let Some(store) = self.store.upgrade() {
            store.evict();
        }
        self.navigator.redirect(Route::Login);
        tracing::warn!(path, "Session evicted; redirecting to login");
    }
}
