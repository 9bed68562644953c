//! Decode path selection
//!
//! Lossy and CD-quality streams go to the platform's native decoder.
//! 24-bit and deeper lossless streams need a decoder that keeps the full
//! sample width.

use orb_core::AudioFormat;
use serde::{Deserialize, Serialize};

/// Bit depth the native path can reproduce
pub const NATIVE_MAX_BIT_DEPTH: u8 = 16;

/// Which decoder handles a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodePath {
    /// Platform decoder; output is at most 16-bit
    Native,
    /// Full-resolution decoder for deep lossless PCM
    HighRes,
}

impl DecodePath {
    /// Pick the decode path for a track
    ///
    /// MP3 and ≤16-bit FLAC/WAV decode natively; ≥24-bit FLAC/WAV use the
    /// high-resolution path. Unknown formats and unknown bit depths go native.
    pub fn for_track(format: AudioFormat, bit_depth: Option<u8>) -> Self {
        match (format, bit_depth) {
            (AudioFormat::Flac | AudioFormat::Wav, Some(bits)) if bits > NATIVE_MAX_BIT_DEPTH => {
                DecodePath::HighRes
            }
            _ => DecodePath::Native,
        }
    }

    /// Bit depth to show the user when `self` decodes a `bit_depth` stream
    pub fn advertised_bit_depth(self, bit_depth: Option<u8>) -> Option<u8> {
        match self {
            DecodePath::HighRes => bit_depth,
            DecodePath::Native => bit_depth.map(|bits| bits.min(NATIVE_MAX_BIT_DEPTH)),
        }
    }
}
