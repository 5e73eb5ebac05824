use std::sync::Arc;

use crate::auth::TokenVerifier;
use crate::config::Config;
use crate::store::DocumentStore;
use crate::sync::{DocSynchronizer, OperationBroadcaster, PresenceTracker, SessionRegistry};

/// Composition root: every core component, explicitly constructed and handed
/// to the handlers. No component reaches into ambient global state.
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn DocumentStore>,
    pub verifier: Option<TokenVerifier>,
    pub registry: Arc<SessionRegistry>,
    pub presence: Arc<PresenceTracker>,
    pub broadcaster: Arc<OperationBroadcaster>,
    pub synchronizer: Arc<DocSynchronizer>,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn DocumentStore>) -> Arc<Self> {
        let verifier = config.jwt_secret.as_deref().map(TokenVerifier::new);
        let registry = Arc::new(SessionRegistry::new());
        let presence = Arc::new(PresenceTracker::new(config.cursor_ttl_secs));
        let broadcaster = Arc::new(OperationBroadcaster::new(registry.clone()));
        let synchronizer = Arc::new(DocSynchronizer::new(store.clone(), broadcaster.clone()));
        Arc::new(Self {
            config,
            store,
            verifier,
            registry,
            presence,
            broadcaster,
            synchronizer,
        })
    }
}
