//! Orb Buffer
//!
//! Client-side chunked read-through cache over Orb's range-request stream
//! endpoint.
//!
//! # Features
//!
//! - **Chunking**: reads are served from 256 KiB offset-aligned chunks
//! - **Prefetch**: after every read the next chunk is fetched in the background
//! - **Deduplication**: at most one fetch per chunk is in flight at a time
//! - **Bounded memory**: at most 32 chunks are held, evicted oldest-inserted first
//!
//! # Example
//!
//! ```ignore
//! use orb_buffer::{ChunkCache, HttpRangeFetcher, StreamAuth};
//!
//! let fetcher = HttpRangeFetcher::for_track(
//!     "https://music.example.com",
//!     &"track-1".into(),
//!     StreamAuth::Bearer(token),
//! )?;
//! let info = fetcher.probe().await?;
//! let cache = ChunkCache::new(fetcher, info.total_size);
//!
//! let header = cache.read(0, 4096).await?;
//! ```

mod cache;
mod error;
mod fetcher;
mod http;

pub use cache::{CacheStats, ChunkCache, CHUNK_SIZE, MAX_CHUNKS};
pub use error::{BufferError, Result};
pub use fetcher::RangeFetcher;
pub use http::{HttpRangeFetcher, StreamAuth, StreamInfo};
