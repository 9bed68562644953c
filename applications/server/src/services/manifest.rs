//! HLS manifest builder
//!
//! Describes a single stored audio object as an HLS v4 VOD playlist of
//! byte-range segments. Segment boundaries come from the track's seek index,
//! so every segment starts on a frame boundary and the segments together
//! cover the object exactly once.

use orb_core::{OrbError, Result, SeekIndex};
use std::fmt::Write as _;

/// Default segment length
pub const DEFAULT_SEGMENT_TARGET_MS: u64 = 6000;

/// One byte-range segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub duration_ms: u64,
    pub offset: u64,
    pub length: u64,
}

/// A built playlist, ready to render against a segment URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub segments: Vec<Segment>,
    /// `#EXT-X-TARGETDURATION`, whole seconds
    pub target_duration_secs: u64,
}

impl Manifest {
    /// Render the playlist; every segment references `segment_uri`
    pub fn render(&self, segment_uri: &str) -> String {
        let mut out = String::new();
        out.push_str("#EXTM3U\n");
        out.push_str("#EXT-X-VERSION:4\n");
        let _ = writeln!(out, "#EXT-X-TARGETDURATION:{}", self.target_duration_secs);
        out.push_str("#EXT-X-PLAYLIST-TYPE:VOD\n");
        out.push_str("#EXT-X-INDEPENDENT-SEGMENTS\n");

        for segment in &self.segments {
            let _ = writeln!(out, "#EXTINF:{:.6},", segment.duration_ms as f64 / 1000.0);
            let _ = writeln!(
                out,
                "#EXT-X-BYTERANGE:{}@{}",
                segment.length, segment.offset
            );
            out.push_str(segment_uri);
            out.push('\n');
        }

        out.push_str("#EXT-X-ENDLIST\n");
        out
    }

    pub fn total_duration_ms(&self) -> u64 {
        self.segments.iter().map(|s| s.duration_ms).sum()
    }
}

/// Splits a track into segments of roughly equal duration
#[derive(Debug, Clone, Copy)]
pub struct ManifestBuilder {
    target_segment_ms: u64,
}

impl Default for ManifestBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_SEGMENT_TARGET_MS)
    }
}

impl ManifestBuilder {
    pub fn new(target_segment_ms: u64) -> Self {
        Self {
            target_segment_ms: target_segment_ms.max(1),
        }
    }

    pub fn target_segment_ms(&self) -> u64 {
        self.target_segment_ms
    }

    /// Build the segment list for one object
    ///
    /// `duration_ms == 0` means the catalog does not know the duration; it is
    /// then estimated from `avg_bitrate_bps`, or failing that from the seek
    /// table's byte rate.
    pub fn build(
        &self,
        index: &SeekIndex,
        duration_ms: u64,
        file_size: u64,
        avg_bitrate_bps: Option<u64>,
    ) -> Result<Manifest> {
        if index.is_empty() {
            return Err(OrbError::invalid_input("empty playlist"));
        }
        if file_size == 0 {
            return Err(OrbError::invalid_input("empty object"));
        }

        let duration_ms = resolve_duration(index, duration_ms, file_size, avg_bitrate_bps)
            .ok_or_else(|| OrbError::invalid_input("track duration unknown"))?;

        let target = self.target_segment_ms;
        let count = duration_ms.div_ceil(target);

        // (start time, start offset) per segment, merging any segment whose
        // start does not move past the previous one
        let mut starts: Vec<(u64, u64)> = Vec::new();
        for i in 0..count {
            let time = i * target;
            let offset = index.offset_for_time(time);
            match starts.last() {
                Some(&(_, previous)) if offset <= previous || offset >= file_size => {}
                _ => starts.push((time, offset)),
            }
        }

        let segments = starts
            .iter()
            .enumerate()
            .map(|(i, &(time, offset))| {
                let (end_time, end_offset) = starts
                    .get(i + 1)
                    .copied()
                    .unwrap_or((duration_ms, file_size));
                Segment {
                    duration_ms: end_time - time,
                    offset,
                    length: end_offset - offset,
                }
            })
            .collect::<Vec<_>>();

        let longest_ms = segments.iter().map(|s| s.duration_ms).max().unwrap_or(target);

        Ok(Manifest {
            segments,
            target_duration_secs: longest_ms.div_ceil(1000).max(1),
        })
    }
}

fn resolve_duration(
    index: &SeekIndex,
    duration_ms: u64,
    file_size: u64,
    avg_bitrate_bps: Option<u64>,
) -> Option<u64> {
    if duration_ms > 0 {
        return Some(duration_ms);
    }

    if let Some(bps) = avg_bitrate_bps.filter(|&b| b > 0) {
        return Some((file_size * 8 * 1000 / bps).max(1));
    }

    // Byte rate over the span the seek table covers
    let last = index.points().last()?;
    if last.time_ms == 0 || last.byte_offset == 0 {
        return None;
    }
    Some((file_size as u128 * u128::from(last.time_ms) / u128::from(last.byte_offset)) as u64)
}
