/// Album cover art API
use crate::{
    error::{Result, ServerError},
    middleware::AuthenticatedUser,
    state::AppState,
};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::Response,
};

/// Browsers may keep covers for a day
const COVER_CACHE_CONTROL: &str = "public, max-age=86400";

/// Object key of an album's cover
pub fn cover_key(album_id: &str) -> String {
    format!("covers/{}.jpg", album_id)
}

/// GET /api/covers/:album_id
pub async fn get_cover(
    Path(album_id): Path<String>,
    State(app_state): State<AppState>,
    _auth: AuthenticatedUser,
) -> Result<Response> {
    serve_cover(&app_state, &album_id).await
}

pub(crate) async fn serve_cover(app_state: &AppState, album_id: &str) -> Result<Response> {
    // Album IDs are a single path segment
    if album_id.is_empty() || album_id.contains(['/', '\\']) || album_id.starts_with('.') {
        return Err(ServerError::NotFound(format!("Cover {}", album_id)));
    }

    let key = cover_key(album_id);
    let size = app_state.store.size(&key).await?;
    let body = app_state.store.get_range(&key, 0, size).await?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "image/jpeg")
        .header(header::CONTENT_LENGTH, size)
        .header(header::CACHE_CONTROL, COVER_CACHE_CONTROL)
        .body(Body::from_stream(body))
        .map_err(|e| ServerError::Internal(format!("Failed to build response: {}", e)))
}
