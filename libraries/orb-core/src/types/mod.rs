//! Domain types shared across Orb crates

mod ids;
mod track;

pub use ids::{AlbumId, GuestToken, ParticipantId, SessionId, TrackId, UserId};
pub use track::{AudioFormat, Track, TrackInfo};
