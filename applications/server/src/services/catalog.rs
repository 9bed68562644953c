/// Track catalog - read access to the library service's track records
use crate::error::{Result, ServerError};
use async_trait::async_trait;
use orb_core::{AlbumId, AudioFormat, SeekPoint, Track, TrackId};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;

/// Resolves tracks by ID
#[async_trait]
pub trait TrackCatalog: Send + Sync {
    async fn get_track_by_id(&self, id: &TrackId) -> Result<Option<Track>>;
}

/// SQLite-backed catalog
#[derive(Debug, Clone)]
pub struct SqliteCatalog {
    pool: SqlitePool,
}

impl SqliteCatalog {
    /// Connect (creating the database file if needed) and apply migrations
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Self::run_migrations(&pool).await?;

        Ok(Self { pool })
    }

    /// Private in-memory catalog
    ///
    /// A single connection that never expires, since every new in-memory
    /// connection would open an empty database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        Self::run_migrations(&pool).await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn run_migrations(pool: &SqlitePool) -> Result<()> {
        const MIGRATIONS: &[&str] = &[include_str!(
            "../../migrations/20250301000001_create_tracks.sql"
        )];

        for migration in MIGRATIONS {
            sqlx::raw_sql(migration)
                .execute(pool)
                .await
                .map_err(|e| ServerError::Storage(format!("Migration failed: {}", e)))?;
        }

        Ok(())
    }

    /// Insert or replace a track record (ingest and test fixtures)
    pub async fn insert_track(&self, track: &Track) -> Result<()> {
        let seek_table = serde_json::to_string(&track.seek_table)
            .map_err(|e| ServerError::Internal(e.to_string()))?;

        sqlx::query(
            "INSERT OR REPLACE INTO tracks
                (id, album_id, title, artist_name, format, bit_depth, sample_rate, channels, duration_ms, file_size, file_key, seek_table)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(track.id.as_str())
        .bind(track.album_id.as_ref().map(AlbumId::as_str))
        .bind(&track.title)
        .bind(track.artist_name.as_deref())
        .bind(track.format.as_str())
        .bind(track.bit_depth.map(i64::from))
        .bind(i64::from(track.sample_rate))
        .bind(i64::from(track.channels))
        .bind(track.duration_ms as i64)
        .bind(track.file_size as i64)
        .bind(&track.file_key)
        .bind(seek_table)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl TrackCatalog for SqliteCatalog {
    async fn get_track_by_id(&self, id: &TrackId) -> Result<Option<Track>> {
        let row = sqlx::query(
            "SELECT id, album_id, title, artist_name, format, bit_depth, sample_rate, channels, duration_ms, file_size, file_key, seek_table
             FROM tracks WHERE id = ?",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(track_from_row).transpose()
    }
}

fn track_from_row(row: &SqliteRow) -> Result<Track> {
    let format: String = row.try_get("format")?;
    let seek_table: String = row.try_get("seek_table")?;
    let seek_table: Vec<SeekPoint> = if seek_table.trim().is_empty() {
        Vec::new()
    } else {
        serde_json::from_str(&seek_table)
            .map_err(|e| ServerError::Storage(format!("Corrupt seek table: {}", e)))?
    };

    Ok(Track {
        id: TrackId::new(row.try_get::<String, _>("id")?),
        album_id: row
            .try_get::<Option<String>, _>("album_id")?
            .map(AlbumId::new),
        title: row.try_get("title")?,
        artist_name: row.try_get("artist_name")?,
        format: AudioFormat::from_str(&format).unwrap_or(AudioFormat::Other),
        bit_depth: row
            .try_get::<Option<i64>, _>("bit_depth")?
            .and_then(|b| u8::try_from(b).ok()),
        sample_rate: u32::try_from(row.try_get::<i64, _>("sample_rate")?).unwrap_or(0),
        channels: u16::try_from(row.try_get::<i64, _>("channels")?).unwrap_or(0),
        duration_ms: u64::try_from(row.try_get::<i64, _>("duration_ms")?).unwrap_or(0),
        file_size: u64::try_from(row.try_get::<i64, _>("file_size")?).unwrap_or(0),
        file_key: row.try_get("file_key")?,
        seek_table,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track() -> Track {
        Track {
            id: TrackId::new("t1"),
            album_id: Some(AlbumId::new("a1")),
            title: "Blue in Green".to_string(),
            artist_name: Some("Miles Davis".to_string()),
            format: AudioFormat::Flac,
            bit_depth: Some(24),
            sample_rate: 96_000,
            channels: 2,
            duration_ms: 30_000,
            file_size: 1_000_000,
            file_key: "audio/t1.flac".to_string(),
            seek_table: vec![SeekPoint::new(0, 0), SeekPoint::new(10_000, 300_000)],
        }
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let catalog = SqliteCatalog::in_memory().await.unwrap();
        catalog.insert_track(&track()).await.unwrap();

        let loaded = catalog
            .get_track_by_id(&TrackId::new("t1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded, track());
        assert_eq!(loaded.seek_index().unwrap().offset_for_time(15_000), 300_000);
    }

    #[tokio::test]
    async fn test_missing_track() {
        let catalog = SqliteCatalog::in_memory().await.unwrap();
        assert!(catalog
            .get_track_by_id(&TrackId::new("missing"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_unknown_format_and_lossy_bit_depth() {
        let catalog = SqliteCatalog::in_memory().await.unwrap();
        sqlx::query(
            "INSERT INTO tracks (id, format, sample_rate, file_size, file_key) VALUES ('t2', 'aiff', 44100, 10, 'k')",
        )
        .execute(catalog.pool())
        .await
        .unwrap();

        let loaded = catalog
            .get_track_by_id(&TrackId::new("t2"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.format, AudioFormat::Other);
        assert_eq!(loaded.bit_depth, None);
        assert_eq!(loaded.channels, 2);
        assert!(loaded.seek_table.is_empty());
        assert_eq!(loaded.title, "");
        assert_eq!(loaded.artist_name, None);
    }
}
