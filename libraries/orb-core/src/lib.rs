//! Orb Core
//!
//! Platform-agnostic types shared by the Orb streaming server and its clients.
//!
//! # Architecture
//!
//! The core crate defines:
//! - **Domain Types**: `Track`, `TrackInfo`, `AudioFormat` and the string ID newtypes
//! - **Seek Index**: time-to-byte-offset lookups over a track's precomputed seek table
//! - **Listen Party Protocol**: the JSON messages exchanged over the push channel
//! - **Error Handling**: Unified `OrbError` and `Result` types
//!
//! # Example
//!
//! ```rust
//! use orb_core::{SeekIndex, SeekPoint};
//!
//! let index = SeekIndex::new(vec![
//!     SeekPoint::new(0, 0),
//!     SeekPoint::new(1000, 4096),
//!     SeekPoint::new(2000, 9000),
//! ])
//! .unwrap();
//!
//! assert_eq!(index.offset_for_time(1500), 4096);
//! assert_eq!(index.offset_for_time(50_000), 9000);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod protocol;
pub mod seek;
pub mod types;

// Re-export commonly used types
pub use error::{OrbError, Result};
pub use seek::{SeekIndex, SeekPoint};
pub use types::{
    AlbumId, AudioFormat, GuestToken, ParticipantId, SessionId, Track, TrackId, TrackInfo,
    UserId,
};
