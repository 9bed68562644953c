//! HTTP range fetcher backed by the server's stream endpoint.

use crate::error::{BufferError, Result};
use crate::fetcher::RangeFetcher;
use async_trait::async_trait;
use bytes::Bytes;
use orb_core::{GuestToken, SessionId, TrackId};
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, RANGE};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Header carrying the track's bit depth (absent when unknown)
pub const BIT_DEPTH_HEADER: &str = "x-orb-bit-depth";

/// Header carrying the track's sample rate in Hz
pub const SAMPLE_RATE_HEADER: &str = "x-orb-sample-rate";

/// Credentials for a stream request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamAuth {
    /// Library owner streaming their own track
    Bearer(String),
    /// Listen-party guest streaming through the session
    Guest {
        session_id: SessionId,
        token: GuestToken,
    },
    /// No credentials (tests, open servers)
    None,
}

/// Object metadata reported by the stream endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    pub total_size: u64,
    pub bit_depth: Option<u8>,
    pub sample_rate: Option<u32>,
    pub content_type: Option<String>,
}

/// Fetches byte ranges of one track over HTTP
#[derive(Debug, Clone)]
pub struct HttpRangeFetcher {
    http: Client,
    url: Url,
    bearer: Option<String>,
}

impl HttpRangeFetcher {
    /// Create a fetcher for `track_id` on the server at `base_url`
    ///
    /// Bearer requests go to `/api/stream/{track}`; guest requests go to
    /// `/api/listen/{session}/stream/{track}?guest_token=..`.
    pub fn for_track(base_url: &str, track_id: &TrackId, auth: StreamAuth) -> Result<Self> {
        let base = base_url.trim_end_matches('/');
        if !base.starts_with("http://") && !base.starts_with("https://") {
            return Err(BufferError::InvalidResponse(format!(
                "URL must start with http:// or https://: {}",
                base_url
            )));
        }

        let (path, bearer, guest_token) = match auth {
            StreamAuth::Bearer(token) => (format!("/api/stream/{}", track_id), Some(token), None),
            StreamAuth::Guest { session_id, token } => (
                format!("/api/listen/{}/stream/{}", session_id, track_id),
                None,
                Some(token),
            ),
            StreamAuth::None => (format!("/api/stream/{}", track_id), None, None),
        };

        let mut url = Url::parse(&format!("{}{}", base, path))
            .map_err(|e| BufferError::InvalidResponse(format!("Invalid stream URL: {}", e)))?;
        if let Some(token) = guest_token {
            url.query_pairs_mut()
                .append_pair("guest_token", token.as_str());
        }

        Self::with_url(url, bearer)
    }

    /// Create a fetcher for a complete stream URL
    ///
    /// Used when the URL was built elsewhere (a guest URL already carries its
    /// token); `bearer` is sent as an `Authorization` header when present.
    pub fn for_url(url: &str, bearer: Option<String>) -> Result<Self> {
        let url = Url::parse(url)
            .map_err(|e| BufferError::InvalidResponse(format!("Invalid stream URL: {}", e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(BufferError::InvalidResponse(format!(
                "URL must start with http:// or https://: {}",
                url
            )));
        }
        Self::with_url(url, bearer)
    }

    fn with_url(url: Url, bearer: Option<String>) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .user_agent(format!("Orb/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BufferError::Transient(e.to_string()))?;

        Ok(Self { http, url, bearer })
    }

    /// Full request URL, including any guest token
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Ask for the first byte to learn the object size and audio headers
    pub async fn probe(&self) -> Result<StreamInfo> {
        let response = self.send(self.request().header(RANGE, "bytes=0-0")).await?;
        let headers = response.headers();

        let total_size = match response.status() {
            StatusCode::PARTIAL_CONTENT => headers
                .get(CONTENT_RANGE)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_content_range_total),
            _ => headers
                .get(CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok()),
        }
        .ok_or_else(|| BufferError::InvalidResponse("Missing object size".to_string()))?;

        let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
        let info = StreamInfo {
            total_size,
            bit_depth: header(BIT_DEPTH_HEADER).and_then(|v| v.parse().ok()),
            sample_rate: header(SAMPLE_RATE_HEADER).and_then(|v| v.parse().ok()),
            content_type: header(CONTENT_TYPE.as_str()).map(str::to_string),
        };

        debug!(
            url = %self.url,
            total_size = info.total_size,
            bit_depth = ?info.bit_depth,
            "Probed stream"
        );
        Ok(info)
    }

    fn request(&self) -> RequestBuilder {
        let request = self.http.get(self.url.clone());
        match &self.bearer {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| BufferError::Transient(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(map_status(status, body))
    }
}

#[async_trait]
impl RangeFetcher for HttpRangeFetcher {
    async fn fetch(&self, start: u64, len: u64) -> Result<Bytes> {
        if len == 0 {
            return Ok(Bytes::new());
        }
        let end = start + len - 1;
        let response = self
            .send(
                self.request()
                    .header(RANGE, format!("bytes={}-{}", start, end)),
            )
            .await?;
        let status = response.status();

        let bytes = response
            .bytes()
            .await
            .map_err(|e| BufferError::Transient(e.to_string()))?;

        if status == StatusCode::PARTIAL_CONTENT {
            return Ok(bytes);
        }

        // Server ignored the Range header and sent the whole object
        warn!(url = %self.url, "Range request answered with full body");
        let from = (start as usize).min(bytes.len());
        let to = ((end + 1) as usize).min(bytes.len());
        Ok(bytes.slice(from..to))
    }
}

/// Map a non-success status to the cache's error taxonomy
fn map_status(status: StatusCode, body: String) -> BufferError {
    match status {
        StatusCode::NOT_FOUND => BufferError::NotFound(body),
        StatusCode::RANGE_NOT_SATISFIABLE => BufferError::RangeNotSatisfiable(body),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BufferError::Unauthorized(body),
        s if s.is_server_error() || s == StatusCode::TOO_MANY_REQUESTS => {
            BufferError::Transient(format!("{}: {}", s, body))
        }
        s => BufferError::InvalidResponse(format!("Unexpected status {}: {}", s, body)),
    }
}

/// Total size from `bytes a-b/total`
fn parse_content_range_total(value: &str) -> Option<u64> {
    value.rsplit_once('/')?.1.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_range_total() {
        assert_eq!(parse_content_range_total("bytes 0-0/12345"), Some(12345));
        assert_eq!(parse_content_range_total("bytes */99"), Some(99));
        assert_eq!(parse_content_range_total("bytes 0-0/*"), None);
        assert_eq!(parse_content_range_total("garbage"), None);
    }

    #[test]
    fn status_mapping() {
        assert!(matches!(
            map_status(StatusCode::NOT_FOUND, String::new()),
            BufferError::NotFound(_)
        ));
        assert!(matches!(
            map_status(StatusCode::RANGE_NOT_SATISFIABLE, String::new()),
            BufferError::RangeNotSatisfiable(_)
        ));
        assert!(matches!(
            map_status(StatusCode::FORBIDDEN, String::new()),
            BufferError::Unauthorized(_)
        ));
        assert!(map_status(StatusCode::BAD_GATEWAY, String::new()).is_transient());
        assert!(!map_status(StatusCode::BAD_REQUEST, String::new()).is_transient());
    }

    #[test]
    fn guest_url_carries_token() {
        let fetcher = HttpRangeFetcher::for_track(
            "http://localhost:8080/",
            &TrackId::new("t1"),
            StreamAuth::Guest {
                session_id: SessionId::new("s1"),
                token: GuestToken::new("g1"),
            },
        )
        .unwrap();
        assert_eq!(
            fetcher.url().as_str(),
            "http://localhost:8080/api/listen/s1/stream/t1?guest_token=g1"
        );
    }

    #[test]
    fn full_url_is_kept_as_given() {
        let fetcher = HttpRangeFetcher::for_url(
            "http://localhost:8080/api/listen/s1/stream/t1?guest_token=g1",
            None,
        )
        .unwrap();
        assert_eq!(fetcher.url().query(), Some("guest_token=g1"));
        assert!(HttpRangeFetcher::for_url("file:///tmp/a.flac", None).is_err());
        assert!(HttpRangeFetcher::for_url("not a url", None).is_err());
    }

    #[test]
    fn rejects_non_http_base() {
        assert!(
            HttpRangeFetcher::for_track("ftp://x", &TrackId::new("t1"), StreamAuth::None).is_err()
        );
    }
}
