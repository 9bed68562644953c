/// Object store - audio files and cover art addressed by key
use crate::error::{Result, ServerError};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{BoxStream, StreamExt};
use std::io::SeekFrom;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

/// Body of a ranged read
pub type ByteStream = BoxStream<'static, std::io::Result<Bytes>>;

/// Blob storage consumed by the streamer
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stream `len` bytes of `key` starting at `offset`
    async fn get_range(&self, key: &str, offset: u64, len: u64) -> Result<ByteStream>;

    /// Object size in bytes; `NotFound` if absent
    async fn size(&self, key: &str) -> Result<u64>;

    async fn exists(&self, key: &str) -> Result<bool>;

    async fn put(&self, key: &str, data: Bytes) -> Result<()>;
}

/// Object store over a local directory
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    base_path: PathBuf,
}

impl LocalObjectStore {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    /// Create the root directory
    pub async fn initialize(&self) -> Result<()> {
        fs::create_dir_all(&self.base_path).await?;
        Ok(())
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Resolve a key to a path under the root
    ///
    /// Keys are relative, `/`-separated and may not climb out of the root.
    fn resolve(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || key.contains('\\') {
            return Err(ServerError::BadRequest(format!("Invalid object key: {:?}", key)));
        }

        let relative = Path::new(key);
        let normal = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if !normal {
            return Err(ServerError::BadRequest(format!("Invalid object key: {:?}", key)));
        }

        Ok(self.base_path.join(relative))
    }
}

fn not_found(key: &str, err: std::io::Error) -> ServerError {
    if err.kind() == std::io::ErrorKind::NotFound {
        ServerError::NotFound(format!("Object {}", key))
    } else {
        ServerError::Io(err)
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn get_range(&self, key: &str, offset: u64, len: u64) -> Result<ByteStream> {
        let path = self.resolve(key)?;
        let mut file = fs::File::open(&path).await.map_err(|e| not_found(key, e))?;
        file.seek(SeekFrom::Start(offset)).await?;

        let reader = ReaderStream::new(file.take(len));
        Ok(reader.boxed())
    }

    async fn size(&self, key: &str) -> Result<u64> {
        let path = self.resolve(key)?;
        let metadata = fs::metadata(&path).await.map_err(|e| not_found(key, e))?;
        if !metadata.is_file() {
            return Err(ServerError::NotFound(format!("Object {}", key)));
        }
        Ok(metadata.len())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.resolve(key)?;
        Ok(fs::metadata(&path).await.map(|m| m.is_file()).unwrap_or(false))
    }

    async fn put(&self, key: &str, data: Bytes) -> Result<()> {
        let path = self.resolve(key)?;

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        fs::write(&path, &data).await?;
        Ok(())
    }
}

/// Collect a byte stream into one buffer
pub async fn collect(mut stream: ByteStream) -> Result<Bytes> {
    let mut out = bytes::BytesMut::new();
    while let Some(chunk) = stream.next().await {
        out.extend_from_slice(&chunk?);
    }
    Ok(out.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> (tempfile::TempDir, LocalObjectStore) {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(temp_dir.path().join("objects"));
        store.initialize().await.unwrap();
        (temp_dir, store)
    }

    #[tokio::test]
    async fn test_put_and_read_range() {
        let (_dir, store) = store().await;
        store
            .put("audio/t1.flac", Bytes::from_static(b"0123456789"))
            .await
            .unwrap();

        assert!(store.exists("audio/t1.flac").await.unwrap());
        assert_eq!(store.size("audio/t1.flac").await.unwrap(), 10);

        let body = collect(store.get_range("audio/t1.flac", 3, 4).await.unwrap())
            .await
            .unwrap();
        assert_eq!(&body[..], b"3456");
    }

    #[tokio::test]
    async fn test_range_past_end_is_truncated() {
        let (_dir, store) = store().await;
        store.put("a", Bytes::from_static(b"abc")).await.unwrap();

        let body = collect(store.get_range("a", 1, 100).await.unwrap())
            .await
            .unwrap();
        assert_eq!(&body[..], b"bc");
    }

    #[tokio::test]
    async fn test_missing_object() {
        let (_dir, store) = store().await;
        assert!(!store.exists("nope").await.unwrap());
        assert!(matches!(
            store.size("nope").await,
            Err(ServerError::NotFound(_))
        ));
        assert!(matches!(
            store.get_range("nope", 0, 1).await,
            Err(ServerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_keys_cannot_escape_root() {
        let (_dir, store) = store().await;
        for key in ["../secret", "/etc/passwd", "a/../../b", "", "a\\b", "./a"] {
            assert!(
                matches!(store.size(key).await, Err(ServerError::BadRequest(_))),
                "key {:?} should be rejected",
                key
            );
        }
    }
}
