/// Audio streaming API
use crate::{
    error::{Result, ServerError},
    middleware::AuthenticatedUser,
    services::{range_streamer::parse_range_header, ByteRange, RangeStream},
    state::AppState,
};
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::Response,
};
use orb_core::{OrbError, TrackId};
use serde::Deserialize;

const MPEGURL: &str = "application/vnd.apple.mpegurl";

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    /// Start position in milliseconds, resolved through the seek table
    #[serde(default)]
    pub t: Option<u64>,
    #[serde(default)]
    pub token: Option<String>,
}

/// GET /api/stream/:track_id
/// Stream a byte range of the audio object. A request without `Range` is
/// answered as `bytes=0-`.
pub async fn stream_track(
    Path(track_id): Path<String>,
    State(app_state): State<AppState>,
    _auth: AuthenticatedUser,
    Query(query): Query<StreamQuery>,
    headers: HeaderMap,
) -> Result<Response> {
    serve_track(&app_state, &TrackId::new(track_id), query.t, &headers).await
}

/// Shared by the bearer and guest-token stream routes
pub(crate) async fn serve_track(
    app_state: &AppState,
    track_id: &TrackId,
    start_ms: Option<u64>,
    headers: &HeaderMap,
) -> Result<Response> {
    let track = app_state.streamer.lookup(track_id).await?;
    let size = track.file_size;

    // An explicit Range wins over ?t=, so players re-requesting with Range keep working
    let range = match (headers.get(header::RANGE), start_ms) {
        (Some(value), _) => {
            let value = value
                .to_str()
                .map_err(|_| ServerError::RangeNotSatisfiable { size })?;
            parse_range_header(value, size)?
        }
        (None, Some(ms)) => ByteRange::starting_at(track.seek_index()?.offset_for_time(ms)),
        (None, None) => ByteRange::full(),
    };

    let stream = app_state.streamer.open_track(&track, range).await?;
    tracing::debug!(
        track_id = %track_id,
        start = stream.start,
        end = stream.end,
        "Serving range"
    );
    range_response(stream)
}

/// 206 response for an open range
pub(crate) fn range_response(stream: RangeStream) -> Result<Response> {
    Response::builder()
        .status(StatusCode::PARTIAL_CONTENT)
        .header(header::CONTENT_TYPE, stream.format.mime_type())
        .header(header::CONTENT_LENGTH, stream.len())
        .header(header::CONTENT_RANGE, stream.content_range())
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CACHE_CONTROL, "private, max-age=3600")
        .header("x-orb-bit-depth", u16::from(stream.bit_depth.unwrap_or(0)))
        .header("x-orb-sample-rate", stream.sample_rate)
        .body(Body::from_stream(stream.body))
        .map_err(|e| ServerError::Internal(format!("Failed to build response: {}", e)))
}

/// GET /api/stream/:track_id/index.m3u8
/// HLS playlist of byte-range segments over the stream resource
pub async fn track_manifest(
    Path(track_id): Path<String>,
    State(app_state): State<AppState>,
    _auth: AuthenticatedUser,
    Query(query): Query<StreamQuery>,
    headers: HeaderMap,
) -> Result<Response> {
    let track_id = TrackId::new(track_id);
    let track = app_state.streamer.lookup(&track_id).await?;

    let manifest = app_state
        .manifests
        .build(
            &track.seek_index()?,
            track.duration_ms,
            track.file_size,
            track.average_bitrate_bps(),
        )
        .map_err(|e| match e {
            OrbError::InvalidInput(msg) => ServerError::UnprocessableEntity(msg),
            other => other.into(),
        })?;

    // Segments point back at the stream resource with the caller's credentials
    let token = query
        .token
        .or_else(|| {
            headers
                .get(header::AUTHORIZATION)
                .and_then(|h| h.to_str().ok())
                .and_then(|h| h.strip_prefix("Bearer "))
                .map(|t| t.trim().to_string())
        })
        .unwrap_or_default();
    let segment_uri = format!(
        "../{}?token={}",
        escape(track_id.as_str()),
        escape(&token)
    );

    tracing::debug!(
        track_id = %track_id,
        segments = manifest.segments.len(),
        "Serving manifest"
    );

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, MPEGURL)
        .header(header::CACHE_CONTROL, "private, max-age=3600")
        .body(Body::from(manifest.render(&segment_uri)))
        .map_err(|e| ServerError::Internal(format!("Failed to build response: {}", e)))
}

fn escape(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}
