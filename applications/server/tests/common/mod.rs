/// Common test utilities and fixtures
use axum::{
    body::{to_bytes, Body},
    http::{Request, Response},
    Router,
};
use bytes::Bytes;
use orb_core::{AlbumId, AudioFormat, SeekPoint, Track, TrackId, UserId};
use orb_server::{
    api,
    config::ServerConfig,
    services::{AuthService, LocalObjectStore, ObjectStore, SqliteCatalog},
    state::AppState,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt;

pub const TEST_SECRET: &str = "test-secret-key";

/// Router over an in-memory catalog and a temporary object store
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub catalog: Arc<SqliteCatalog>,
    pub store: Arc<LocalObjectStore>,
    _dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(LocalObjectStore::new(dir.path().join("objects")));
        store.initialize().await.unwrap();
        let catalog = Arc::new(SqliteCatalog::in_memory().await.unwrap());

        let mut config = ServerConfig::default();
        config.auth.jwt_secret = TEST_SECRET.to_string();
        let auth_service = Arc::new(AuthService::new(TEST_SECRET.to_string(), 1));

        let state = AppState::new(
            Arc::new(config),
            auth_service,
            catalog.clone(),
            store.clone(),
        );

        Self {
            router: api::router(state.clone()),
            state,
            catalog,
            store,
            _dir: dir,
        }
    }

    /// Bearer token for `user_id`
    pub fn token(&self, user_id: &str) -> String {
        self.state
            .auth_service
            .issue(&UserId::new(user_id), Some(user_id))
            .unwrap()
    }

    /// Store `data` and register a FLAC track over it
    pub async fn add_track(&self, id: &str, data: &[u8], seek_table: Vec<SeekPoint>) -> Track {
        let track = fixtures::track(id, data.len() as u64, seek_table);
        self.store
            .put(&track.file_key, Bytes::copy_from_slice(data))
            .await
            .unwrap();
        self.catalog.insert_track(&track).await.unwrap();
        track
    }

    pub async fn add_cover(&self, album_id: &str, data: &[u8]) {
        self.store
            .put(
                &format!("covers/{}.jpg", album_id),
                Bytes::copy_from_slice(data),
            )
            .await
            .unwrap();
    }

    /// Serve the router on an ephemeral local port
    pub async fn serve(&self) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = self.router.clone();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> Response<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }
}

pub async fn body_bytes(response: Response<Body>) -> Bytes {
    to_bytes(response.into_body(), usize::MAX).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

pub mod fixtures {
    use super::*;

    /// Deterministic payload where every byte encodes its position
    pub fn audio_bytes(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    pub fn track(id: &str, file_size: u64, seek_table: Vec<SeekPoint>) -> Track {
        Track {
            id: TrackId::new(id),
            album_id: Some(AlbumId::new("album-1")),
            title: format!("Track {}", id),
            artist_name: Some("Test Artist".to_string()),
            format: AudioFormat::Flac,
            bit_depth: Some(24),
            sample_rate: 96_000,
            channels: 2,
            duration_ms: 30_000,
            file_size,
            file_key: format!("audio/{}.flac", id),
            seek_table,
        }
    }

    /// One entry per second over 30 s of a 300 000 byte object
    pub fn steady_seek_table() -> Vec<SeekPoint> {
        (0..30)
            .map(|s| SeekPoint::new(s * 1000, s * 10_000))
            .collect()
    }
}
