/// Liveness endpoint
use crate::state::AppState;
use axum::{extract::State, Json};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub version: &'static str,
    /// Listen parties currently running
    pub parties: usize,
}

/// GET /api/health
pub async fn health(State(app_state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        parties: app_state.parties.len(),
    })
}
