/// Track types as exposed by the library collaborator
use super::ids::{AlbumId, TrackId};
use crate::error::Result;
use crate::seek::{SeekIndex, SeekPoint};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Container format of a stored audio object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    /// Free Lossless Audio Codec
    Flac,
    /// RIFF/WAVE PCM
    Wav,
    /// MPEG-1 Layer III
    Mp3,
    /// Anything else the ingest pipeline stored (served as opaque bytes)
    #[serde(other)]
    Other,
}

impl AudioFormat {
    /// MIME type used for `Content-Type` on stream responses
    pub fn mime_type(&self) -> &'static str {
        match self {
            AudioFormat::Flac => "audio/flac",
            AudioFormat::Wav => "audio/wav",
            AudioFormat::Mp3 => "audio/mpeg",
            AudioFormat::Other => "application/octet-stream",
        }
    }

    /// Whether the format is lossless PCM (and so can carry 24/32-bit samples)
    pub fn is_lossless(&self) -> bool {
        matches!(self, AudioFormat::Flac | AudioFormat::Wav)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AudioFormat::Flac => "flac",
            AudioFormat::Wav => "wav",
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Other => "other",
        }
    }
}

impl FromStr for AudioFormat {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "flac" => AudioFormat::Flac,
            "wav" | "wave" => AudioFormat::Wav,
            "mp3" => AudioFormat::Mp3,
            _ => AudioFormat::Other,
        })
    }
}

/// A streamable track
///
/// Read-only to this system: the library collaborator owns it and the
/// streaming core only resolves it by ID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    pub album_id: Option<AlbumId>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub artist_name: Option<String>,
    pub format: AudioFormat,
    /// Bits per sample; `None` for lossy formats
    pub bit_depth: Option<u8>,
    pub sample_rate: u32,
    pub channels: u16,
    pub duration_ms: u64,
    pub file_size: u64,
    /// Object-store key of the audio file
    pub file_key: String,
    pub seek_table: Vec<SeekPoint>,
}

impl Track {
    /// Build the seek index for this track
    ///
    /// Fails if the stored seek table breaks its ordering invariants.
    pub fn seek_index(&self) -> Result<SeekIndex> {
        SeekIndex::new(self.seek_table.clone())
    }

    /// Average bitrate in bits per second, if the duration is known
    pub fn average_bitrate_bps(&self) -> Option<u64> {
        if self.duration_ms == 0 {
            return None;
        }
        Some(self.file_size * 8 * 1000 / self.duration_ms)
    }

    /// Subset of metadata handed to listen party guests
    pub fn info(&self) -> TrackInfo {
        TrackInfo {
            id: self.id.clone(),
            album_id: self.album_id.clone(),
            title: self.title.clone(),
            artist_name: self.artist_name.clone(),
            format: self.format,
            bit_depth: self.bit_depth,
            sample_rate: self.sample_rate,
            duration_ms: self.duration_ms,
        }
    }
}

/// Track metadata a guest needs to display and stream the host's track
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackInfo {
    pub id: TrackId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album_id: Option<AlbumId>,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist_name: Option<String>,
    pub format: AudioFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bit_depth: Option<u8>,
    pub sample_rate: u32,
    pub duration_ms: u64,
}
