//! Blocking byte source over a chunk cache
//!
//! Symphonia pulls bytes through `std::io::Read + Seek` while the cache is
//! async. Every read blocks on the runtime handle, so a `ChunkSource` must be
//! read from a plain thread, never from a task on that runtime.

use orb_buffer::{BufferError, ChunkCache, RangeFetcher};
use std::io::{self, Read, Seek, SeekFrom};
use symphonia::core::io::MediaSource;
use tokio::runtime::Handle;

/// Seekable reader over one cached stream
pub struct ChunkSource<F: RangeFetcher> {
    cache: ChunkCache<F>,
    runtime: Handle,
    position: u64,
}

impl<F: RangeFetcher> ChunkSource<F> {
    pub fn new(cache: ChunkCache<F>, runtime: Handle) -> Self {
        Self {
            cache,
            runtime,
            position: 0,
        }
    }

    pub fn cache(&self) -> &ChunkCache<F> {
        &self.cache
    }

    pub fn position(&self) -> u64 {
        self.position
    }
}

impl<F: RangeFetcher> Read for ChunkSource<F> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || self.position >= self.cache.file_size() {
            return Ok(0);
        }

        let bytes = self
            .runtime
            .block_on(self.cache.read(self.position, buf.len()))
            .map_err(to_io_error)?;

        let n = bytes.len().min(buf.len());
        buf[..n].copy_from_slice(&bytes[..n]);
        self.position += n as u64;
        Ok(n)
    }
}

impl<F: RangeFetcher> Seek for ChunkSource<F> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.cache.file_size().checked_add_signed(delta),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
        };
        let Some(target) = target else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before the start of the stream",
            ));
        };
        self.position = target;
        Ok(target)
    }
}

impl<F: RangeFetcher> MediaSource for ChunkSource<F> {
    fn is_seekable(&self) -> bool {
        true
    }

    fn byte_len(&self) -> Option<u64> {
        Some(self.cache.file_size())
    }
}

/// Transient failures surface as `Other` so `read_exact` does not spin on them
fn to_io_error(err: BufferError) -> io::Error {
    let kind = match &err {
        BufferError::NotFound(_) => io::ErrorKind::NotFound,
        BufferError::Unauthorized(_) => io::ErrorKind::PermissionDenied,
        BufferError::OutOfRange { .. } | BufferError::RangeNotSatisfiable(_) => {
            io::ErrorKind::UnexpectedEof
        }
        BufferError::Transient(_) | BufferError::InvalidResponse(_) => io::ErrorKind::Other,
    };
    io::Error::new(kind, err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_errors_map_to_io_kinds() {
        assert_eq!(
            to_io_error(BufferError::Unauthorized("kicked".into())).kind(),
            io::ErrorKind::PermissionDenied
        );
        assert_eq!(
            to_io_error(BufferError::OutOfRange { offset: 9, size: 4 }).kind(),
            io::ErrorKind::UnexpectedEof
        );
        assert_eq!(
            to_io_error(BufferError::Transient("reset".into())).kind(),
            io::ErrorKind::Other
        );
    }
}
