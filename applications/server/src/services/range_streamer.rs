//! Range-aware byte streamer
//!
//! Serves arbitrary byte ranges of a track's stored object. Every request is
//! independent: the streamer holds only shared handles to the catalog and
//! object store, so it is cheap to clone into each handler.

use crate::error::{Result, ServerError};
use crate::services::catalog::TrackCatalog;
use crate::services::object_store::{ByteStream, ObjectStore};
use orb_core::{AudioFormat, Track, TrackId};
use std::fmt;
use std::sync::Arc;

/// Half-open byte range `[start, end)`; `end: None` reads to EOF
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: Option<u64>,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self {
            start,
            end: Some(end),
        }
    }

    /// `[start, EOF)`
    pub fn starting_at(start: u64) -> Self {
        Self { start, end: None }
    }

    /// The whole object
    pub fn full() -> Self {
        Self::starting_at(0)
    }

    /// Clamp to an object of `size` bytes, returning `[start, end)`
    ///
    /// A start at or past the end of the object, or a range that is empty
    /// after clamping, is unsatisfiable.
    pub fn resolve(self, size: u64) -> Result<(u64, u64)> {
        if self.start >= size {
            return Err(ServerError::RangeNotSatisfiable { size });
        }
        let end = self.end.map_or(size, |end| end.min(size));
        if end <= self.start {
            return Err(ServerError::RangeNotSatisfiable { size });
        }
        Ok((self.start, end))
    }
}

/// Parse an HTTP `Range` header against an object of `size` bytes
///
/// Supports `bytes=a-b` (inclusive), `bytes=a-` and the suffix form
/// `bytes=-n`. Only the first range of a multi-range request is honoured.
/// Anything malformed or unsatisfiable maps to `RangeNotSatisfiable` so the
/// client learns the object size.
pub fn parse_range_header(header: &str, size: u64) -> Result<ByteRange> {
    let unsatisfiable = || ServerError::RangeNotSatisfiable { size };

    let ranges = header
        .trim()
        .strip_prefix("bytes=")
        .ok_or_else(unsatisfiable)?;
    let first = ranges.split(',').next().unwrap_or_default().trim();
    let (start, end) = first.split_once('-').ok_or_else(unsatisfiable)?;
    let (start, end) = (start.trim(), end.trim());

    let range = match (start.is_empty(), end.is_empty()) {
        // bytes=-n: the last n bytes
        (true, false) => {
            let suffix: u64 = end.parse().map_err(|_| unsatisfiable())?;
            if suffix == 0 {
                return Err(unsatisfiable());
            }
            ByteRange::starting_at(size.saturating_sub(suffix))
        }
        (false, true) => ByteRange::starting_at(start.parse().map_err(|_| unsatisfiable())?),
        (false, false) => {
            let start: u64 = start.parse().map_err(|_| unsatisfiable())?;
            let last: u64 = end.parse().map_err(|_| unsatisfiable())?;
            if last < start {
                return Err(unsatisfiable());
            }
            ByteRange::new(start, last.saturating_add(1))
        }
        (true, true) => return Err(unsatisfiable()),
    };

    range.resolve(size)?;
    Ok(range)
}

/// An open ranged read plus the metadata the response needs
pub struct RangeStream {
    pub body: ByteStream,
    pub start: u64,
    /// Exclusive
    pub end: u64,
    pub total_size: u64,
    pub format: AudioFormat,
    pub bit_depth: Option<u8>,
    pub sample_rate: u32,
}

impl RangeStream {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `Content-Range` header value
    pub fn content_range(&self) -> String {
        format!("bytes {}-{}/{}", self.start, self.end - 1, self.total_size)
    }
}

impl fmt::Debug for RangeStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RangeStream")
            .field("start", &self.start)
            .field("end", &self.end)
            .field("total_size", &self.total_size)
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

/// Stateless streamer over the catalog and object store
#[derive(Clone)]
pub struct RangeStreamer {
    catalog: Arc<dyn TrackCatalog>,
    store: Arc<dyn ObjectStore>,
}

impl RangeStreamer {
    pub fn new(catalog: Arc<dyn TrackCatalog>, store: Arc<dyn ObjectStore>) -> Self {
        Self { catalog, store }
    }

    /// Resolve a track, `NotFound` if the catalog does not know it
    pub async fn lookup(&self, track_id: &TrackId) -> Result<Track> {
        self.catalog
            .get_track_by_id(track_id)
            .await?
            .ok_or_else(|| ServerError::NotFound(format!("Track {}", track_id)))
    }

    /// Open `range` of a track's audio object
    pub async fn open(&self, track_id: &TrackId, range: ByteRange) -> Result<RangeStream> {
        let track = self.lookup(track_id).await?;
        self.open_track(&track, range).await
    }

    /// Open a track's audio object from the frame boundary at or before `time_ms`
    pub async fn open_at_time(&self, track_id: &TrackId, time_ms: u64) -> Result<RangeStream> {
        let track = self.lookup(track_id).await?;
        let offset = track.seek_index()?.offset_for_time(time_ms);
        tracing::debug!(track_id = %track_id, time_ms, offset, "Time seek resolved");
        self.open_track(&track, ByteRange::starting_at(offset)).await
    }

    /// Open `range` of an already resolved track
    pub async fn open_track(&self, track: &Track, range: ByteRange) -> Result<RangeStream> {
        let (start, end) = range.resolve(track.file_size)?;

        let body = self
            .store
            .get_range(&track.file_key, start, end - start)
            .await
            .map_err(|e| match e {
                ServerError::NotFound(_) => {
                    tracing::error!(
                        track_id = %track.id,
                        file_key = %track.file_key,
                        "Catalog references a missing object"
                    );
                    ServerError::NotFound(format!("Audio for track {}", track.id))
                }
                other => other,
            })?;

        Ok(RangeStream {
            body,
            start,
            end,
            total_size: track.file_size,
            format: track.format,
            bit_depth: track.bit_depth,
            sample_rate: track.sample_rate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unsatisfiable(result: Result<ByteRange>) -> bool {
        matches!(result, Err(ServerError::RangeNotSatisfiable { size: 1000 }))
    }

    #[test]
    fn test_parse_range() {
        assert_eq!(
            parse_range_header("bytes=0-999", 1000).unwrap(),
            ByteRange::new(0, 1000)
        );
        assert_eq!(
            parse_range_header("bytes=100-", 1000).unwrap(),
            ByteRange::starting_at(100)
        );
        assert_eq!(
            parse_range_header("bytes=-200", 1000).unwrap(),
            ByteRange::starting_at(800)
        );
        // Suffix longer than the object means the whole object
        assert_eq!(
            parse_range_header("bytes=-5000", 1000).unwrap(),
            ByteRange::starting_at(0)
        );
        // End past EOF is clamped later
        assert_eq!(
            parse_range_header("bytes=900-5000", 1000).unwrap(),
            ByteRange::new(900, 5001)
        );
        assert_eq!(
            parse_range_header("bytes=0-9, 20-29", 1000).unwrap(),
            ByteRange::new(0, 10)
        );
    }

    #[test]
    fn test_parse_range_rejects() {
        assert!(unsatisfiable(parse_range_header("bytes=1000-", 1000)));
        assert!(unsatisfiable(parse_range_header("bytes=5-4", 1000)));
        assert!(unsatisfiable(parse_range_header("bytes=-0", 1000)));
        assert!(unsatisfiable(parse_range_header("bytes=-", 1000)));
        assert!(unsatisfiable(parse_range_header("items=0-1", 1000)));
        assert!(unsatisfiable(parse_range_header("bytes=a-b", 1000)));
        assert!(unsatisfiable(parse_range_header("invalid", 1000)));
    }

    #[test]
    fn test_resolve_clamps_to_size() {
        assert_eq!(ByteRange::new(10, 5000).resolve(100).unwrap(), (10, 100));
        assert_eq!(ByteRange::full().resolve(100).unwrap(), (0, 100));
        assert!(ByteRange::starting_at(100).resolve(100).is_err());
        assert!(ByteRange::new(5, 5).resolve(100).is_err());
        assert!(ByteRange::full().resolve(0).is_err());
    }
}
