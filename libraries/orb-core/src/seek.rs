//! Seek index over a track's precomputed frame-offset table
//!
//! The ingest pipeline records, for every seekable frame boundary, the
//! playback time and the byte offset at which that frame starts. Lookups here
//! are pure: no I/O, no allocation beyond construction.

use crate::error::{OrbError, Result};
use serde::{Deserialize, Serialize};

/// One entry of a seek table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeekPoint {
    /// Playback time at the start of the frame, in milliseconds
    pub time_ms: u64,
    /// Byte offset of the frame within the audio object
    pub byte_offset: u64,
}

impl SeekPoint {
    /// Create a seek point
    pub const fn new(time_ms: u64, byte_offset: u64) -> Self {
        Self {
            time_ms,
            byte_offset,
        }
    }
}

/// Validated, ordered seek table
///
/// Invariants (checked in [`SeekIndex::new`]):
/// - `time_ms` and `byte_offset` are strictly increasing
/// - the first entry starts at byte offset 0
///
/// An empty index is valid and means the whole file is one block: every
/// lookup resolves to offset 0.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeekIndex {
    points: Vec<SeekPoint>,
}

impl SeekIndex {
    /// Build an index, validating the table's ordering invariants
    pub fn new(points: Vec<SeekPoint>) -> Result<Self> {
        if let Some(first) = points.first() {
            if first.byte_offset != 0 {
                return Err(OrbError::invalid_input(format!(
                    "seek table must start at byte 0, starts at {}",
                    first.byte_offset
                )));
            }
        }

        for (i, pair) in points.windows(2).enumerate() {
            let (a, b) = (pair[0], pair[1]);
            if b.time_ms <= a.time_ms || b.byte_offset <= a.byte_offset {
                return Err(OrbError::invalid_input(format!(
                    "seek table not strictly increasing at entry {}",
                    i + 1
                )));
            }
        }

        Ok(Self { points })
    }

    /// Index with no entries (no frame-accurate seeking)
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse the JSON form stored by the library collaborator
    ///
    /// Empty input and `[]` both yield an empty index.
    pub fn from_json(raw: &[u8]) -> Result<Self> {
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::empty());
        }
        let points: Vec<SeekPoint> = serde_json::from_slice(raw)?;
        Self::new(points)
    }

    /// Byte offset to start reading from to play `time_ms`
    ///
    /// Returns the offset of the greatest entry whose time is `<= time_ms`.
    /// Times before the first entry resolve to 0; times past the last entry
    /// resolve to the last entry's offset (the caller reads to EOF).
    pub fn offset_for_time(&self, time_ms: u64) -> u64 {
        // Number of entries with time <= time_ms
        let idx = self.points.partition_point(|p| p.time_ms <= time_ms);
        if idx == 0 {
            0
        } else {
            self.points[idx - 1].byte_offset
        }
    }

    /// Time of the last entry, if any
    pub fn last_time_ms(&self) -> Option<u64> {
        self.points.last().map(|p| p.time_ms)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[SeekPoint] {
        &self.points
    }
}
