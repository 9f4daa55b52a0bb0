//! Composition root.
//!
//! Builds one instance of every state container and wires the session's
//! 401 eviction onto the transport. Nothing here is global; tests and
//! embedders construct as many independent roots as they like.

use crate::api::GradingApi;
use crate::config::ClientConfig;
use crate::error::Result;
use crate::routing::{self, Guard, Navigator, Route};
use crate::session::hydration::{self, Hydration};
use crate::session::{FileSessionStorage, SessionEviction, SessionStorage, SessionStore, StoredCredentials};
use crate::tasks::BackgroundTaskTracker;
use crate::transport::HttpTransport;
use std::sync::Arc;

pub struct ClientApp {
    pub config: ClientConfig,
    pub transport: Arc<HttpTransport>,
    pub session: Arc<SessionStore>,
    pub tasks: Arc<BackgroundTaskTracker>,
    pub navigator: Arc<Navigator>,
    pub api: GradingApi,
}

impl ClientApp {
    pub fn new(config: ClientConfig, storage: Arc<dyn SessionStorage>) -> Result<Self> {
        let transport = Arc::new(
            HttpTransport::new(&config.api_base_url, config.request_timeout())?
                .with_credentials(Arc::new(StoredCredentials::new(storage.clone()))),
        );
        let session = Arc::new(SessionStore::new(transport.clone(), storage));
        let tasks = Arc::new(BackgroundTaskTracker::new());
        let navigator = Arc::new(Navigator::default());

        transport.on_unauthorized(Arc::new(SessionEviction::new(&session, navigator.clone())));

        let api = GradingApi::new(transport.clone(), tasks.clone());

        Ok(Self {
            config,
            transport,
            session,
            tasks,
            navigator,
            api,
        })
    }

    /// Root backed by the on-disk session record.
    pub fn from_config(config: ClientConfig) -> Result<Self> {
        let storage = FileSessionStorage::new(&config.resolved_storage_dir(), &config.storage_name);
        tracing::debug!(path = %storage.path().display(), "Using session record");
        Self::new(config, Arc::new(storage))
    }

    /// Start hydration and wait until the latch opens (restore done or
    /// fallback fired). The handle can be awaited for a late restore.
    pub async fn boot(&self) -> Hydration {
        let hydration = hydration::start(self.session.clone(), self.config.hydration_fallback());
        self.session.wait_hydrated().await;
        hydration
    }

    pub fn guard(&self, route: &Route) -> Guard {
        routing::evaluate(route, &self.session.snapshot())
    }
}
