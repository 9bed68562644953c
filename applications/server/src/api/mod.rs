/// API route modules
pub mod covers;
pub mod health;
pub mod party;
pub mod stream;

use crate::{middleware, state::AppState};
use axum::{
    middleware as axum_middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};

/// Full HTTP surface, nested under `/api`
pub fn router(app_state: AppState) -> Router {
    // Public routes (no bearer required)
    let public_routes = Router::new()
        .route("/health", get(health::health))
        .route("/listen/:session_id", get(party::session_info))
        .route("/listen/:session_id/ws", get(party::session_ws))
        // Guest-token scoped
        .route(
            "/listen/:session_id/stream/:track_id",
            get(party::guest_stream),
        )
        .route(
            "/listen/:session_id/cover/:album_id",
            get(party::guest_cover),
        );

    // Protected routes (bearer required)
    let protected_routes = Router::new()
        .route("/stream/:track_id", get(stream::stream_track))
        .route("/stream/:track_id/index.m3u8", get(stream::track_manifest))
        .route("/covers/:album_id", get(covers::get_cover))
        .route("/listen", post(party::create_session))
        .route(
            "/listen/:session_id",
            delete(party::end_session),
        )
        .layer(axum_middleware::from_fn_with_state(
            Arc::clone(&app_state.auth_service),
            middleware::auth_middleware,
        ));

    Router::new()
        .nest("/api", public_routes.merge(protected_routes))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(false)),
        )
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}
