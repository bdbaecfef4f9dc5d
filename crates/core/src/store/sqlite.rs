//! SQLite-backed metadata store.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use serde::de::DeserializeOwned;

use super::{MediaAggregate, MetadataStore, SeriesEpisode, StoreError, TorrentStream, TvChannel};
use crate::ingest::MediaKind;

const STREAM_COLUMNS: &str = "info_hash, meta_id, torrent_name, announce_list, size, source, \
     uploader, catalog, languages, quality, resolution, codec, audio, hdr, seeders, \
     episode_files, created_at";

const AGGREGATE_COLUMNS: &str =
    "id, kind, title, year, poster, background, episodes, created_at";

/// SQLite-backed metadata store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open the database file, creating tables if needed.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(db_error)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(db_error)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            -- Canonical torrent metadata (one row per unique info_hash)
            CREATE TABLE IF NOT EXISTS torrent_streams (
                info_hash TEXT PRIMARY KEY,
                meta_id TEXT NOT NULL,
                torrent_name TEXT NOT NULL,
                announce_list TEXT NOT NULL,
                size INTEGER NOT NULL,
                source TEXT NOT NULL,
                uploader TEXT,
                catalog TEXT NOT NULL,
                languages TEXT NOT NULL,
                quality TEXT,
                resolution TEXT,
                codec TEXT,
                audio TEXT NOT NULL,
                hdr TEXT NOT NULL,
                seeders INTEGER,
                episode_files TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_torrent_streams_meta_id ON torrent_streams(meta_id);

            -- Per-title aggregates
            CREATE TABLE IF NOT EXISTS aggregates (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                title TEXT NOT NULL COLLATE NOCASE,
                year INTEGER,
                poster TEXT,
                background TEXT,
                episodes TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL,
                UNIQUE(kind, title)
            );

            -- Live TV channels
            CREATE TABLE IF NOT EXISTS tv_channels (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                country TEXT,
                poster TEXT,
                genres TEXT NOT NULL,
                stream_urls TEXT NOT NULL,
                source TEXT,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .map_err(db_error)?;

        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert_stream(conn: &Connection, s: &TorrentStream) -> Result<(), StoreError> {
        let episode_files = s
            .episode_files
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        conn.execute(
            &format!(
                "INSERT INTO torrent_streams ({}) VALUES \
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
                STREAM_COLUMNS
            ),
            params![
                s.info_hash,
                s.meta_id,
                s.torrent_name,
                serde_json::to_string(&s.announce_list)?,
                s.size as i64,
                s.source,
                s.uploader,
                serde_json::to_string(&s.catalog)?,
                serde_json::to_string(&s.languages)?,
                s.quality,
                s.resolution,
                s.codec,
                serde_json::to_string(&s.audio)?,
                serde_json::to_string(&s.hdr)?,
                s.seeders.map(i64::from),
                episode_files,
                s.created_at.to_rfc3339(),
            ],
        )
        .map_err(|e| {
            if is_constraint_violation(&e) {
                StoreError::Duplicate(s.info_hash.clone())
            } else {
                db_error(e)
            }
        })?;
        Ok(())
    }

    fn row_to_stream(row: &Row<'_>) -> rusqlite::Result<TorrentStream> {
        let size: i64 = row.get(4)?;
        let seeders: Option<i64> = row.get(14)?;
        let episode_files: Option<String> = row.get(15)?;
        Ok(TorrentStream {
            info_hash: row.get(0)?,
            meta_id: row.get(1)?,
            torrent_name: row.get(2)?,
            announce_list: json_column(row, 3)?,
            size: size.max(0) as u64,
            source: row.get(5)?,
            uploader: row.get(6)?,
            catalog: json_column(row, 7)?,
            languages: json_column(row, 8)?,
            quality: row.get(9)?,
            resolution: row.get(10)?,
            codec: row.get(11)?,
            audio: json_column(row, 12)?,
            hdr: json_column(row, 13)?,
            seeders: seeders.map(|s| s.clamp(0, u32::MAX as i64) as u32),
            episode_files: episode_files
                .map(|raw| parse_json(15, &raw))
                .transpose()?,
            created_at: time_column(row, 16)?,
        })
    }

    fn row_to_aggregate(row: &Row<'_>) -> rusqlite::Result<MediaAggregate> {
        let kind: String = row.get(1)?;
        let kind = MediaKind::parse(&kind).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                1,
                Type::Text,
                format!("unknown media kind '{}'", kind).into(),
            )
        })?;
        Ok(MediaAggregate {
            id: row.get(0)?,
            kind,
            title: row.get(2)?,
            year: row.get(3)?,
            poster: row.get(4)?,
            background: row.get(5)?,
            episodes: json_column(row, 6)?,
            created_at: time_column(row, 7)?,
        })
    }

    fn row_to_channel(row: &Row<'_>) -> rusqlite::Result<TvChannel> {
        Ok(TvChannel {
            id: row.get(0)?,
            title: row.get(1)?,
            country: row.get(2)?,
            poster: row.get(3)?,
            genres: json_column(row, 4)?,
            stream_urls: json_column(row, 5)?,
            source: row.get(6)?,
            updated_at: time_column(row, 7)?,
        })
    }
}

fn db_error(e: rusqlite::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(e, rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation)
}

fn parse_json<T: DeserializeOwned>(idx: usize, raw: &str) -> rusqlite::Result<T> {
    serde_json::from_str(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn json_column<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    parse_json(idx, &raw)
}

fn time_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

impl MetadataStore for SqliteStore {
    fn find_by_hash(&self, info_hash: &str) -> Result<Option<TorrentStream>, StoreError> {
        let conn = self.lock();
        conn.query_row(
            &format!(
                "SELECT {} FROM torrent_streams WHERE info_hash = ?",
                STREAM_COLUMNS
            ),
            params![info_hash],
            Self::row_to_stream,
        )
        .optional()
        .map_err(db_error)
    }

    fn insert(&self, stream: &TorrentStream) -> Result<(), StoreError> {
        let conn = self.lock();
        Self::insert_stream(&conn, stream)
    }

    fn delete(&self, info_hash: &str) -> Result<bool, StoreError> {
        let conn = self.lock();
        let deleted = conn
            .execute(
                "DELETE FROM torrent_streams WHERE info_hash = ?",
                params![info_hash],
            )
            .map_err(db_error)?;
        Ok(deleted > 0)
    }

    /// Delete and insert inside one transaction, so readers never see the hash missing.
    fn replace(&self, stream: &TorrentStream) -> Result<(), StoreError> {
        let mut conn = self.lock();
        let tx = conn.transaction().map_err(db_error)?;
        tx.execute(
            "DELETE FROM torrent_streams WHERE info_hash = ?",
            params![stream.info_hash],
        )
        .map_err(db_error)?;
        Self::insert_stream(&tx, stream)?;
        tx.commit().map_err(db_error)
    }

    fn find_aggregate_by_title(
        &self,
        kind: MediaKind,
        title: &str,
    ) -> Result<Option<MediaAggregate>, StoreError> {
        let conn = self.lock();
        conn.query_row(
            &format!(
                "SELECT {} FROM aggregates WHERE kind = ? AND title = ?",
                AGGREGATE_COLUMNS
            ),
            params![kind.as_str(), title],
            Self::row_to_aggregate,
        )
        .optional()
        .map_err(db_error)
    }

    fn find_aggregate(&self, id: &str) -> Result<Option<MediaAggregate>, StoreError> {
        let conn = self.lock();
        conn.query_row(
            &format!("SELECT {} FROM aggregates WHERE id = ?", AGGREGATE_COLUMNS),
            params![id],
            Self::row_to_aggregate,
        )
        .optional()
        .map_err(db_error)
    }

    fn insert_aggregate(&self, aggregate: &MediaAggregate) -> Result<(), StoreError> {
        let conn = self.lock();
        conn.execute(
            &format!(
                "INSERT INTO aggregates ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                AGGREGATE_COLUMNS
            ),
            params![
                aggregate.id,
                aggregate.kind.as_str(),
                aggregate.title,
                aggregate.year,
                aggregate.poster,
                aggregate.background,
                serde_json::to_string(&aggregate.episodes)?,
                aggregate.created_at.to_rfc3339(),
            ],
        )
        .map_err(|e| {
            if is_constraint_violation(&e) {
                StoreError::Duplicate(format!("{}:{}", aggregate.kind, aggregate.title))
            } else {
                db_error(e)
            }
        })?;
        Ok(())
    }

    fn list_by_meta_id(&self, meta_id: &str) -> Result<Vec<TorrentStream>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM torrent_streams WHERE meta_id = ? ORDER BY created_at, info_hash",
                STREAM_COLUMNS
            ))
            .map_err(db_error)?;
        let rows = stmt
            .query_map(params![meta_id], Self::row_to_stream)
            .map_err(db_error)?;

        let mut streams = Vec::new();
        for row in rows {
            streams.push(row.map_err(db_error)?);
        }
        Ok(streams)
    }

    fn update_episodes(&self, meta_id: &str, episodes: &[SeriesEpisode]) -> Result<(), StoreError> {
        let conn = self.lock();
        let updated = conn
            .execute(
                "UPDATE aggregates SET episodes = ? WHERE id = ?",
                params![serde_json::to_string(episodes)?, meta_id],
            )
            .map_err(db_error)?;
        if updated == 0 {
            return Err(StoreError::NotFound(meta_id.to_string()));
        }
        Ok(())
    }

    fn upsert_tv_channel(&self, channel: &TvChannel) -> Result<Option<TvChannel>, StoreError> {
        let mut conn = self.lock();
        let tx = conn.transaction().map_err(db_error)?;
        let previous = tx
            .query_row(
                "SELECT id, title, country, poster, genres, stream_urls, source, updated_at
                 FROM tv_channels WHERE id = ?",
                params![channel.id],
                Self::row_to_channel,
            )
            .optional()
            .map_err(db_error)?;
        tx.execute(
            "INSERT INTO tv_channels (id, title, country, poster, genres, stream_urls, source, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                country = excluded.country,
                poster = excluded.poster,
                genres = excluded.genres,
                stream_urls = excluded.stream_urls,
                source = excluded.source,
                updated_at = excluded.updated_at",
            params![
                channel.id,
                channel.title,
                channel.country,
                channel.poster,
                serde_json::to_string(&channel.genres)?,
                serde_json::to_string(&channel.stream_urls)?,
                channel.source,
                channel.updated_at.to_rfc3339(),
            ],
        )
        .map_err(db_error)?;
        tx.commit().map_err(db_error)?;
        Ok(previous)
    }

    fn find_tv_channel(&self, id: &str) -> Result<Option<TvChannel>, StoreError> {
        let conn = self.lock();
        conn.query_row(
            "SELECT id, title, country, poster, genres, stream_urls, source, updated_at
             FROM tv_channels WHERE id = ?",
            params![id],
            Self::row_to_channel,
        )
        .optional()
        .map_err(db_error)
    }

    fn count_streams(&self) -> Result<u64, StoreError> {
        let conn = self.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM torrent_streams", [], |row| row.get(0))
            .map_err(db_error)?;
        Ok(count.max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;
    use crate::store::{EpisodeFile, EpisodeSource};
    use tempfile::TempDir;

    #[test]
    fn test_insert_and_find() {
        let store = SqliteStore::in_memory().unwrap();
        let mut stream = fixtures::stream("a".repeat(40), "mf1", "SourceA");
        stream.episode_files = Some(vec![EpisodeFile {
            season_number: 1,
            episode_number: 2,
            filename: "Show.S01E02.mkv".to_string(),
            size: 100,
            file_index: 0,
        }]);
        stream.audio = vec!["AAC".to_string()];
        store.insert(&stream).unwrap();

        let found = store.find_by_hash(&stream.info_hash).unwrap().unwrap();
        assert_eq!(found.source, "SourceA");
        assert_eq!(found.announce_list, stream.announce_list);
        assert_eq!(found.episode_files, stream.episode_files);
        assert_eq!(found.audio, vec!["AAC"]);
        assert_eq!(found.created_at.timestamp(), stream.created_at.timestamp());
        assert!(store.find_by_hash(&"b".repeat(40)).unwrap().is_none());
    }

    #[test]
    fn test_insert_duplicate_hash_rejected() {
        let store = SqliteStore::in_memory().unwrap();
        let stream = fixtures::stream("a".repeat(40), "mf1", "SourceA");
        store.insert(&stream).unwrap();

        let err = store.insert(&stream).unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(h) if h == stream.info_hash));
        assert_eq!(store.count_streams().unwrap(), 1);
    }

    #[test]
    fn test_unparseable_timestamp_is_an_error() {
        let store = SqliteStore::in_memory().unwrap();
        let stream = fixtures::stream("a".repeat(40), "mf1", "SourceA");
        store.insert(&stream).unwrap();
        store
            .lock()
            .execute(
                "UPDATE torrent_streams SET created_at = 'yesterday' WHERE info_hash = ?",
                params![stream.info_hash],
            )
            .unwrap();

        assert!(matches!(
            store.find_by_hash(&stream.info_hash),
            Err(StoreError::Database(_))
        ));
    }

    #[test]
    fn test_delete() {
        let store = SqliteStore::in_memory().unwrap();
        let stream = fixtures::stream("a".repeat(40), "mf1", "SourceA");
        store.insert(&stream).unwrap();

        assert!(store.delete(&stream.info_hash).unwrap());
        assert!(!store.delete(&stream.info_hash).unwrap());
        assert_eq!(store.count_streams().unwrap(), 0);
    }

    #[test]
    fn test_replace_swaps_record() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .insert(&fixtures::stream("a".repeat(40), "mf1", "SourceA"))
            .unwrap();

        store
            .replace(&fixtures::stream("a".repeat(40), "mf1", "SourceB"))
            .unwrap();

        let found = store.find_by_hash(&"a".repeat(40)).unwrap().unwrap();
        assert_eq!(found.source, "SourceB");
        assert_eq!(store.count_streams().unwrap(), 1);
    }

    #[test]
    fn test_aggregate_lookup_is_case_insensitive_and_unique() {
        let store = SqliteStore::in_memory().unwrap();
        let aggregate = fixtures::aggregate("mf1", MediaKind::Series, "Some Show");
        store.insert_aggregate(&aggregate).unwrap();

        let found = store
            .find_aggregate_by_title(MediaKind::Series, "some show")
            .unwrap()
            .unwrap();
        assert_eq!(found.id, "mf1");
        assert!(store
            .find_aggregate_by_title(MediaKind::Movie, "Some Show")
            .unwrap()
            .is_none());

        let dup = fixtures::aggregate("mf2", MediaKind::Series, "SOME SHOW");
        assert!(matches!(
            store.insert_aggregate(&dup),
            Err(StoreError::Duplicate(_))
        ));
    }

    #[test]
    fn test_list_by_meta_id_and_update_episodes() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .insert_aggregate(&fixtures::aggregate("mf1", MediaKind::Series, "Show"))
            .unwrap();
        store
            .insert(&fixtures::stream("a".repeat(40), "mf1", "A"))
            .unwrap();
        store
            .insert(&fixtures::stream("b".repeat(40), "mf1", "A"))
            .unwrap();
        store
            .insert(&fixtures::stream("c".repeat(40), "mf2", "A"))
            .unwrap();

        assert_eq!(store.list_by_meta_id("mf1").unwrap().len(), 2);

        let episodes = vec![SeriesEpisode {
            season: 1,
            episode: 1,
            sources: vec![EpisodeSource {
                info_hash: "a".repeat(40),
                file_index: 0,
                filename: "e1.mkv".to_string(),
                size: 1,
            }],
        }];
        store.update_episodes("mf1", &episodes).unwrap();
        assert_eq!(store.find_aggregate("mf1").unwrap().unwrap().episodes, episodes);

        assert!(matches!(
            store.update_episodes("missing", &episodes),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_upsert_tv_channel_returns_previous() {
        let store = SqliteStore::in_memory().unwrap();
        let mut channel = fixtures::tv_channel("news-24", "News 24");

        assert!(store.upsert_tv_channel(&channel).unwrap().is_none());

        channel.stream_urls = vec!["https://cdn/new.m3u8".to_string()];
        let previous = store.upsert_tv_channel(&channel).unwrap().unwrap();
        assert_ne!(previous.stream_urls, channel.stream_urls);

        let found = store.find_tv_channel("news-24").unwrap().unwrap();
        assert_eq!(found.stream_urls, vec!["https://cdn/new.m3u8"]);
    }

    #[test]
    fn test_file_store_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vault.db");
        {
            let store = SqliteStore::new(&path).unwrap();
            store
                .insert(&fixtures::stream("a".repeat(40), "mf1", "A"))
                .unwrap();
        }
        let store = SqliteStore::new(&path).unwrap();
        assert_eq!(store.count_streams().unwrap(), 1);
    }
}
