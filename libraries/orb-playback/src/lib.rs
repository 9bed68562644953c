//! Orb Playback
//!
//! Client-side playback adapter for Orb streams.
//!
//! This crate provides:
//! - Decode path selection (native vs. high-resolution) per track
//! - Fallback to native decoding when the high-resolution decoder refuses a stream
//! - Local volume control (linear gain, mute)
//! - Progress events over a crossbeam channel
//! - A Symphonia backend that decodes straight from the chunk cache
//!
//! # Architecture
//!
//! The adapter never decodes audio itself. Decoders implement
//! [`DecodeBackend`]; the adapter owns exactly two of them and picks one per
//! track with [`DecodePath::for_track`]. [`SymphoniaBackend`] is the bundled
//! implementation: it reads through a [`ChunkSource`] and hands samples to
//! an [`AudioSink`].
//!
//! # Example
//!
//! ```rust,ignore
//! use orb_playback::{PlaybackAdapter, PlaybackEvent};
//!
//! let (mut adapter, events) = PlaybackAdapter::new(native_decoder, hires_decoder);
//! adapter.play(&stream_url, Some(&token), 0.0, &track)?;
//!
//! // From the UI loop
//! adapter.tick();
//! for event in events.try_iter() {
//!     match event {
//!         PlaybackEvent::Position { position_ms } => update_scrubber(position_ms),
//!         PlaybackEvent::Ended { .. } => play_next(),
//!         _ => {}
//!     }
//! }
//! ```

mod adapter;
mod backend;
mod decode_path;
mod decoder;
mod error;
mod events;
mod source;
mod volume;

pub use adapter::{PlaybackAdapter, EVENT_CAPACITY};
pub use backend::{BackendStatus, DecodeBackend, LoadRequest};
pub use decode_path::{DecodePath, NATIVE_MAX_BIT_DEPTH};
pub use decoder::{
    AudioSink, BufferedLevel, HttpOpener, OpenedStream, StreamOpener, SymphoniaBackend,
};
pub use error::{PlaybackError, Result};
pub use events::{PlaybackEvent, PlayerState};
pub use source::ChunkSource;
pub use volume::Volume;
