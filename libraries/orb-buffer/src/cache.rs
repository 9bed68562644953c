//! Chunk cache with sequential prefetch
//!
//! Reads are served from 256 KiB chunks aligned to multiples of
//! [`CHUNK_SIZE`]. A missing chunk is fetched while only the calling task
//! waits; after each read the following chunk is fetched in the background.
//!
//! Eviction is FIFO by insertion order, not LRU. Playback walks the file
//! front to back, so the oldest inserted chunk is almost always the one
//! furthest behind the playhead.

use crate::error::{BufferError, Result};
use crate::fetcher::RangeFetcher;
use bytes::{Bytes, BytesMut};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

/// Size of one cached chunk in bytes
pub const CHUNK_SIZE: u64 = 256 * 1024;

/// Maximum number of chunks held at once (8 MiB)
pub const MAX_CHUNKS: usize = 32;

/// One fetch, awaited by every reader that wants the same chunk
type SharedFetch = Shared<BoxFuture<'static, Result<Bytes>>>;

/// Snapshot of cache occupancy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub cached_chunks: usize,
    pub cached_bytes: u64,
    pub inflight: usize,
    /// Fetches started over the cache's lifetime (demand + prefetch)
    pub fetches_started: u64,
    pub evictions: u64,
}

#[derive(Default)]
struct CacheState {
    chunks: HashMap<u64, Bytes>,
    /// Chunk offsets, oldest inserted first
    insertion_order: VecDeque<u64>,
    inflight: HashMap<u64, SharedFetch>,
    /// Bumped by `destroy`; fetches started under an older generation are
    /// never inserted
    generation: u64,
    fetches_started: u64,
    evictions: u64,
}

impl CacheState {
    fn insert(&mut self, start: u64, bytes: Bytes) {
        if self.chunks.insert(start, bytes).is_none() {
            self.insertion_order.push_back(start);
        }
        while self.chunks.len() > MAX_CHUNKS {
            let Some(oldest) = self.insertion_order.pop_front() else {
                break;
            };
            self.chunks.remove(&oldest);
            self.evictions += 1;
            trace!(offset = oldest, "evicted chunk");
        }
    }

    fn clear(&mut self) {
        self.chunks.clear();
        self.insertion_order.clear();
        self.inflight.clear();
        self.generation += 1;
    }

    fn cached_bytes(&self) -> u64 {
        self.chunks.values().map(|b| b.len() as u64).sum()
    }
}

struct Inner<F> {
    fetcher: F,
    file_size: u64,
    state: Mutex<CacheState>,
}

/// Read-through cache over one audio object
///
/// Cheap to clone; clones share the same chunks. Each track gets its own
/// cache: chunks are never shared between instances.
pub struct ChunkCache<F: RangeFetcher> {
    inner: Arc<Inner<F>>,
}

impl<F: RangeFetcher> Clone for ChunkCache<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: RangeFetcher> ChunkCache<F> {
    /// Create a cache for an object of `file_size` bytes
    pub fn new(fetcher: F, file_size: u64) -> Self {
        Self {
            inner: Arc::new(Inner {
                fetcher,
                file_size,
                state: Mutex::new(CacheState::default()),
            }),
        }
    }

    /// Offset of the chunk containing `offset`
    pub fn chunk_start(offset: u64) -> u64 {
        offset / CHUNK_SIZE * CHUNK_SIZE
    }

    pub fn file_size(&self) -> u64 {
        self.inner.file_size
    }

    /// Read up to `len` bytes starting at `offset`
    ///
    /// Reads that run past the end of the object are truncated at EOF. Reads
    /// spanning several chunks fetch each missing chunk in order. After the
    /// read the chunk following the last one touched is prefetched.
    pub async fn read(&self, offset: u64, len: usize) -> Result<Bytes> {
        let size = self.inner.file_size;
        if len == 0 {
            return Ok(Bytes::new());
        }
        if offset >= size {
            return Err(BufferError::OutOfRange { offset, size });
        }

        let end = offset.saturating_add(len as u64).min(size);
        let first = Self::chunk_start(offset);
        let last = Self::chunk_start(end - 1);

        let out = if first == last {
            let chunk = self.demand(first).await?;
            slice_chunk(&chunk, first, offset, end)
        } else {
            let mut buf = BytesMut::with_capacity((end - offset) as usize);
            let mut chunk_start = first;
            while chunk_start <= last {
                let chunk = self.demand(chunk_start).await?;
                let from = offset.max(chunk_start);
                let to = end.min(chunk_start + CHUNK_SIZE);
                buf.extend_from_slice(&slice_chunk(&chunk, chunk_start, from, to));
                chunk_start += CHUNK_SIZE;
            }
            buf.freeze()
        };

        self.prefetch(last + CHUNK_SIZE);
        Ok(out)
    }

    /// Drop every cached chunk and forget in-flight fetches
    ///
    /// Safe while fetches are running: their results are handed to any
    /// reader already waiting on them but never inserted into the cache.
    pub fn destroy(&self) {
        let mut state = self.inner.state.lock();
        state.clear();
        debug!(generation = state.generation, "chunk cache destroyed");
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.inner.state.lock();
        CacheStats {
            cached_chunks: state.chunks.len(),
            cached_bytes: state.cached_bytes(),
            inflight: state.inflight.len(),
            fetches_started: state.fetches_started,
            evictions: state.evictions,
        }
    }

    /// Fraction of the object currently held in memory, in `[0, 1]`
    pub fn buffered_fraction(&self) -> f64 {
        if self.inner.file_size == 0 {
            return 1.0;
        }
        let cached = self.inner.state.lock().cached_bytes();
        (cached as f64 / self.inner.file_size as f64).min(1.0)
    }

    pub fn is_cached(&self, offset: u64) -> bool {
        self.inner
            .state
            .lock()
            .chunks
            .contains_key(&Self::chunk_start(offset))
    }

    pub fn is_inflight(&self, offset: u64) -> bool {
        self.inner
            .state
            .lock()
            .inflight
            .contains_key(&Self::chunk_start(offset))
    }

    /// Cached chunk offsets, oldest inserted first
    pub fn cached_offsets(&self) -> Vec<u64> {
        self.inner
            .state
            .lock()
            .insertion_order
            .iter()
            .copied()
            .collect()
    }

    /// Return a cached chunk, join an in-flight fetch, or start one
    async fn demand(&self, start: u64) -> Result<Bytes> {
        let pending = {
            let mut state = self.inner.state.lock();
            if let Some(bytes) = state.chunks.get(&start) {
                return Ok(bytes.clone());
            }
            match state.inflight.get(&start) {
                Some(pending) => pending.clone(),
                None => Self::start_fetch(&self.inner, &mut state, start),
            }
        };
        pending.await
    }

    /// Fire-and-forget fetch of the chunk at `start`
    fn prefetch(&self, start: u64) {
        if start >= self.inner.file_size {
            return;
        }
        let pending = {
            let mut state = self.inner.state.lock();
            if state.chunks.contains_key(&start) || state.inflight.contains_key(&start) {
                return;
            }
            Self::start_fetch(&self.inner, &mut state, start)
        };

        tokio::spawn(async move {
            if let Err(e) = pending.await {
                debug!(offset = start, error = %e, "prefetch failed");
            }
        });
    }

    /// Register a fetch for `start` in the in-flight set
    ///
    /// The returned future does nothing until polled. On completion it
    /// removes itself from the in-flight set and inserts the chunk, unless
    /// the cache was destroyed in the meantime.
    fn start_fetch(inner: &Arc<Inner<F>>, state: &mut CacheState, start: u64) -> SharedFetch {
        let generation = state.generation;
        let expected = CHUNK_SIZE.min(inner.file_size - start);
        let owner: Weak<Inner<F>> = Arc::downgrade(inner);
        state.fetches_started += 1;

        let fetch = async move {
            let Some(inner) = owner.upgrade() else {
                return Err(BufferError::Transient("cache dropped".to_string()));
            };
            trace!(offset = start, len = expected, "fetching chunk");

            let result = inner
                .fetcher
                .fetch(start, expected)
                .await
                .and_then(|bytes| {
                    if bytes.len() as u64 == expected {
                        Ok(bytes)
                    } else {
                        Err(BufferError::InvalidResponse(format!(
                            "chunk at {} returned {} bytes, expected {}",
                            start,
                            bytes.len(),
                            expected
                        )))
                    }
                });

            let mut state = inner.state.lock();
            if state.generation != generation {
                debug!(offset = start, "discarding chunk fetched before destroy");
                return result;
            }
            state.inflight.remove(&start);
            if let Ok(bytes) = &result {
                state.insert(start, bytes.clone());
            }
            result
        }
        .boxed()
        .shared();

        state.inflight.insert(start, fetch.clone());
        fetch
    }
}

/// Bytes `[from, to)` of a chunk that starts at `chunk_start`
///
/// Chunks are only cached at their full expected length, so the slice is
/// always in bounds.
fn slice_chunk(chunk: &Bytes, chunk_start: u64, from: u64, to: u64) -> Bytes {
    chunk.slice((from - chunk_start) as usize..(to - chunk_start) as usize)
}
