//! Range fetcher trait
//!
//! Abstracts the transport behind the cache so it can run against the HTTP
//! stream endpoint in production and an in-memory object in tests.

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

/// Source of byte ranges for one audio object
#[async_trait]
pub trait RangeFetcher: Send + Sync + 'static {
    /// Fetch `len` bytes starting at `start`
    ///
    /// May return fewer bytes only at the end of the object.
    async fn fetch(&self, start: u64, len: u64) -> Result<Bytes>;
}

#[async_trait]
impl<T: RangeFetcher + ?Sized> RangeFetcher for Arc<T> {
    async fn fetch(&self, start: u64, len: u64) -> Result<Bytes> {
        (**self).fetch(start, len).await
    }
}
