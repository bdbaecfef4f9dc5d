//! Durable storage of torrent metadata, aggregates and TV channels.

mod sqlite;
mod types;

pub use sqlite::SqliteStore;
pub use types::*;

use crate::ingest::MediaKind;

/// Durable metadata store.
///
/// Implementations must enforce uniqueness of `info_hash` themselves:
/// `insert` on an existing hash fails with `StoreError::Duplicate`.
pub trait MetadataStore: Send + Sync {
    fn find_by_hash(&self, info_hash: &str) -> Result<Option<TorrentStream>, StoreError>;

    fn insert(&self, stream: &TorrentStream) -> Result<(), StoreError>;

    /// Returns whether a record was deleted.
    fn delete(&self, info_hash: &str) -> Result<bool, StoreError>;

    /// Swap the record stored under `stream.info_hash` for `stream`.
    ///
    /// The default deletes then inserts; a crash in between leaves the hash
    /// absent until the item is ingested again.
    fn replace(&self, stream: &TorrentStream) -> Result<(), StoreError> {
        self.delete(&stream.info_hash)?;
        self.insert(stream)
    }

    fn find_aggregate_by_title(
        &self,
        kind: MediaKind,
        title: &str,
    ) -> Result<Option<MediaAggregate>, StoreError>;

    fn find_aggregate(&self, id: &str) -> Result<Option<MediaAggregate>, StoreError>;

    fn insert_aggregate(&self, aggregate: &MediaAggregate) -> Result<(), StoreError>;

    fn list_by_meta_id(&self, meta_id: &str) -> Result<Vec<TorrentStream>, StoreError>;

    fn update_episodes(&self, meta_id: &str, episodes: &[SeriesEpisode]) -> Result<(), StoreError>;

    /// Insert or update a channel by id. Returns the previous version.
    fn upsert_tv_channel(&self, channel: &TvChannel) -> Result<Option<TvChannel>, StoreError>;

    fn find_tv_channel(&self, id: &str) -> Result<Option<TvChannel>, StoreError>;

    fn count_streams(&self) -> Result<u64, StoreError>;
}
