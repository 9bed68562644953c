//! Tests for the HTTP range fetcher against a mock stream endpoint.

use orb_buffer::{BufferError, ChunkCache, HttpRangeFetcher, RangeFetcher, StreamAuth};
use orb_core::{GuestToken, SessionId, TrackId};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn bearer_fetcher(server: &MockServer) -> HttpRangeFetcher {
    HttpRangeFetcher::for_track(
        &server.uri(),
        &TrackId::new("track-1"),
        StreamAuth::Bearer("host-token".to_string()),
    )
    .unwrap()
}

#[tokio::test]
async fn test_probe_reads_size_and_audio_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/stream/track-1"))
        .and(header("range", "bytes=0-0"))
        .and(header("authorization", "Bearer host-token"))
        .respond_with(
            ResponseTemplate::new(206)
                .insert_header("content-range", "bytes 0-0/5000")
                .insert_header("content-type", "audio/flac")
                .insert_header("x-orb-bit-depth", "24")
                .insert_header("x-orb-sample-rate", "96000")
                .set_body_bytes(vec![0u8]),
        )
        .mount(&server)
        .await;

    let info = bearer_fetcher(&server).probe().await.unwrap();

    assert_eq!(info.total_size, 5000);
    assert_eq!(info.bit_depth, Some(24));
    assert_eq!(info.sample_rate, Some(96000));
    assert_eq!(info.content_type.as_deref(), Some("audio/flac"));
}

#[tokio::test]
async fn test_fetch_sends_inclusive_range() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/stream/track-1"))
        .and(header("range", "bytes=100-109"))
        .respond_with(
            ResponseTemplate::new(206)
                .insert_header("content-range", "bytes 100-109/5000")
                .set_body_bytes((100u8..110).collect::<Vec<_>>()),
        )
        .expect(1)
        .mount(&server)
        .await;

    let bytes = bearer_fetcher(&server).fetch(100, 10).await.unwrap();
    assert_eq!(&bytes[..], &(100u8..110).collect::<Vec<_>>()[..]);
}

#[tokio::test]
async fn test_guest_fetch_uses_session_path() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/listen/sess-1/stream/track-1"))
        .and(query_param("guest_token", "guest-abc"))
        .respond_with(ResponseTemplate::new(206).set_body_bytes(vec![7u8; 4]))
        .mount(&server)
        .await;

    let fetcher = HttpRangeFetcher::for_track(
        &server.uri(),
        &TrackId::new("track-1"),
        StreamAuth::Guest {
            session_id: SessionId::new("sess-1"),
            token: GuestToken::new("guest-abc"),
        },
    )
    .unwrap();

    assert_eq!(&fetcher.fetch(0, 4).await.unwrap()[..], &[7u8; 4]);
}

#[tokio::test]
async fn test_status_codes_map_to_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header("range", "bytes=0-9"))
        .respond_with(ResponseTemplate::new(404).set_body_string("track not found"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(header("range", "bytes=10-19"))
        .respond_with(ResponseTemplate::new(416))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(header("range", "bytes=20-29"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(header("range", "bytes=30-39"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let fetcher = bearer_fetcher(&server);

    match fetcher.fetch(0, 10).await.unwrap_err() {
        BufferError::NotFound(msg) => assert!(msg.contains("not found")),
        other => panic!("Expected NotFound, got {:?}", other),
    }
    assert!(matches!(
        fetcher.fetch(10, 10).await.unwrap_err(),
        BufferError::RangeNotSatisfiable(_)
    ));
    assert!(matches!(
        fetcher.fetch(20, 10).await.unwrap_err(),
        BufferError::Unauthorized(_)
    ));
    assert!(fetcher.fetch(30, 10).await.unwrap_err().is_transient());
}

#[tokio::test]
async fn test_unreachable_server_is_transient() {
    let fetcher = HttpRangeFetcher::for_track(
        "http://127.0.0.1:9",
        &TrackId::new("track-1"),
        StreamAuth::None,
    )
    .unwrap();

    assert!(fetcher.fetch(0, 10).await.unwrap_err().is_transient());
}

#[tokio::test]
async fn test_cache_over_http() {
    let server = MockServer::start().await;
    let body: Vec<u8> = (0..64u8).collect();
    Mock::given(method("GET"))
        .and(header("range", "bytes=0-63"))
        .respond_with(ResponseTemplate::new(206).set_body_bytes(body.clone()))
        .expect(1)
        .mount(&server)
        .await;

    let cache = ChunkCache::new(bearer_fetcher(&server), 64);

    assert_eq!(&cache.read(8, 8).await.unwrap()[..], &body[8..16]);
    assert_eq!(&cache.read(40, 8).await.unwrap()[..], &body[40..48]);
}
