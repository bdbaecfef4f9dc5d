use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::ingest::{MediaKind, ScrapedItem};
use crate::store::{
    EpisodeSource, MediaAggregate, MetadataStore, SeriesEpisode, StoreError, TorrentStream,
};

/// Generate an opaque aggregate id.
pub fn new_aggregate_id() -> String {
    format!("mf{}", Uuid::new_v4().simple())
}

/// Derive the episode mapping from every torrent linked to an aggregate.
///
/// Episodes are ordered by season then episode; sources within an episode
/// are ordered by info hash then file index.
pub fn organize_episodes(streams: &[TorrentStream]) -> Vec<SeriesEpisode> {
    let mut by_episode: BTreeMap<(u32, u32), Vec<EpisodeSource>> = BTreeMap::new();
    for stream in streams {
        let Some(files) = &stream.episode_files else {
            continue;
        };
        for file in files {
            by_episode
                .entry((file.season_number, file.episode_number))
                .or_default()
                .push(EpisodeSource {
                    info_hash: stream.info_hash.clone(),
                    file_index: file.file_index,
                    filename: file.filename.clone(),
                    size: file.size,
                });
        }
    }

    by_episode
        .into_iter()
        .map(|((season, episode), mut sources)| {
            sources.sort_by(|a, b| {
                a.info_hash
                    .cmp(&b.info_hash)
                    .then(a.file_index.cmp(&b.file_index))
            });
            SeriesEpisode {
                season,
                episode,
                sources,
            }
        })
        .collect()
}

/// Maintains per-title aggregates and their episode mapping.
pub struct SeriesAggregator {
    store: Arc<dyn MetadataStore>,
}

impl SeriesAggregator {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self { store }
    }

    /// Return the aggregate for `title`, creating it on first sighting.
    pub fn ensure_aggregate(
        &self,
        kind: MediaKind,
        title: &str,
        item: &ScrapedItem,
    ) -> Result<MediaAggregate, StoreError> {
        if let Some(existing) = self.store.find_aggregate_by_title(kind, title)? {
            return Ok(existing);
        }

        let aggregate = MediaAggregate {
            id: new_aggregate_id(),
            kind,
            title: title.to_string(),
            year: item.year,
            poster: item.poster.clone(),
            background: item.background.clone(),
            episodes: Vec::new(),
            created_at: Utc::now(),
        };

        match self.store.insert_aggregate(&aggregate) {
            Ok(()) => {
                info!(meta_id = %aggregate.id, kind = %kind, title = %title, "Created aggregate");
                Ok(aggregate)
            }
            // Another pipeline created it between our lookup and insert.
            Err(StoreError::Duplicate(_)) => self
                .store
                .find_aggregate_by_title(kind, title)?
                .ok_or_else(|| StoreError::NotFound(title.to_string())),
            Err(e) => Err(e),
        }
    }

    /// Recompute and store the episode mapping of `meta_id` from all its torrents.
    pub fn reorganize_episodes(&self, meta_id: &str) -> Result<Vec<SeriesEpisode>, StoreError> {
        let streams = self.store.list_by_meta_id(meta_id)?;
        let episodes = organize_episodes(&streams);
        self.store.update_episodes(meta_id, &episodes)?;
        debug!(
            meta_id = %meta_id,
            torrents = streams.len(),
            episodes = episodes.len(),
            "Reorganized episodes"
        );
        Ok(episodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{EpisodeFile, SqliteStore};
    use crate::testing::fixtures;

    fn episode(season: u32, episode: u32, index: usize) -> EpisodeFile {
        EpisodeFile {
            season_number: season,
            episode_number: episode,
            filename: format!("S{:02}E{:02}.mkv", season, episode),
            size: 100,
            file_index: index,
        }
    }

    #[test]
    fn test_new_aggregate_id_format() {
        let id = new_aggregate_id();
        assert!(id.starts_with("mf"));
        assert_eq!(id.len(), 34);
        assert_ne!(id, new_aggregate_id());
    }

    #[test]
    fn test_organize_merges_sources_per_episode() {
        let mut a = fixtures::stream("b".repeat(40), "mf1", "A");
        a.episode_files = Some(vec![episode(1, 2, 1), episode(1, 1, 0)]);
        let mut b = fixtures::stream("a".repeat(40), "mf1", "A");
        b.episode_files = Some(vec![episode(1, 1, 3)]);
        let c = fixtures::stream("c".repeat(40), "mf1", "A");

        let episodes = organize_episodes(&[a, b, c]);

        assert_eq!(episodes.len(), 2);
        assert_eq!((episodes[0].season, episodes[0].episode), (1, 1));
        assert_eq!(episodes[0].sources.len(), 2);
        assert_eq!(episodes[0].sources[0].info_hash, "a".repeat(40));
        assert_eq!(episodes[1].sources.len(), 1);
    }

    #[test]
    fn test_organize_empty() {
        assert!(organize_episodes(&[]).is_empty());
    }

    #[test]
    fn test_ensure_aggregate_creates_once() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let aggregator = SeriesAggregator::new(store.clone());
        let mut item = ScrapedItem::new(MediaKind::Series, "Show");
        item.year = Some(2021);

        let first = aggregator
            .ensure_aggregate(MediaKind::Series, "Show", &item)
            .unwrap();
        let second = aggregator
            .ensure_aggregate(MediaKind::Series, "Show", &item)
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.year, Some(2021));
    }

    #[test]
    fn test_reorganize_reflects_current_torrents() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let aggregator = SeriesAggregator::new(store.clone());
        let aggregate = aggregator
            .ensure_aggregate(
                MediaKind::Series,
                "Show",
                &ScrapedItem::new(MediaKind::Series, "Show"),
            )
            .unwrap();

        let mut a = fixtures::stream("a".repeat(40), aggregate.id.clone(), "A");
        a.episode_files = Some(vec![episode(1, 1, 0), episode(1, 2, 1)]);
        store.insert(&a).unwrap();
        assert_eq!(aggregator.reorganize_episodes(&aggregate.id).unwrap().len(), 2);

        store.delete(&a.info_hash).unwrap();
        let mut b = fixtures::stream("b".repeat(40), aggregate.id.clone(), "B");
        b.episode_files = Some(vec![episode(2, 1, 0)]);
        store.insert(&b).unwrap();

        let episodes = aggregator.reorganize_episodes(&aggregate.id).unwrap();
        assert_eq!(episodes.len(), 1);
        assert_eq!((episodes[0].season, episodes[0].episode), (2, 1));

        let stored = store.find_aggregate(&aggregate.id).unwrap().unwrap();
        assert_eq!(stored.episodes, episodes);
    }
}
