/// Shared application state
use crate::config::ServerConfig;
use crate::party::SessionRegistry;
use crate::services::{AuthService, ManifestBuilder, ObjectStore, RangeStreamer, TrackCatalog};
use std::sync::Arc;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub auth_service: Arc<AuthService>,
    pub store: Arc<dyn ObjectStore>,
    pub streamer: RangeStreamer,
    pub manifests: ManifestBuilder,
    pub parties: SessionRegistry,
}

impl AppState {
    pub fn new(
        config: Arc<ServerConfig>,
        auth_service: Arc<AuthService>,
        catalog: Arc<dyn TrackCatalog>,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        let streamer = RangeStreamer::new(Arc::clone(&catalog), Arc::clone(&store));
        let manifests = ManifestBuilder::new(config.stream.segment_target_ms);
        let parties = SessionRegistry::new(config.party.clone(), catalog);

        Self {
            config,
            auth_service,
            store,
            streamer,
            manifests,
            parties,
        }
    }
}
