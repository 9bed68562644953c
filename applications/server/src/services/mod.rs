/// Server services
pub mod auth;
pub mod catalog;
pub mod manifest;
pub mod object_store;
pub mod range_streamer;

pub use auth::AuthService;
pub use catalog::{SqliteCatalog, TrackCatalog};
pub use manifest::{Manifest, ManifestBuilder};
pub use object_store::{LocalObjectStore, ObjectStore};
pub use range_streamer::{ByteRange, RangeStream, RangeStreamer};
