//! Pipeline handlers: torrent-backed media and TV channels.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

use super::{DropReason, IngestError, IngestOutcome, ItemHandler, MediaKind, ScrapedItem};
use crate::dedup::{DeduplicationGate, ScrapeMarkers};
use crate::metadata::{ExtractError, ExtractStatus, MetadataExtractor};
use crate::series::SeriesAggregator;
use crate::store::{MetadataStore, TorrentStream, TvChannel};

const UNKNOWN_SOURCE: &str = "unknown";

/// Stores torrents for movies, series or live events.
///
/// Per item: validate the title, extract metadata, run the dedup gate, link
/// to the title's aggregate, refresh the episode mapping, then record the
/// hash in the item's session marker set.
pub struct TorrentStoreHandler {
    kind: MediaKind,
    extractor: Arc<MetadataExtractor>,
    gate: DeduplicationGate,
    aggregator: SeriesAggregator,
    markers: Arc<ScrapeMarkers>,
}

impl TorrentStoreHandler {
    pub fn movies(
        store: Arc<dyn MetadataStore>,
        extractor: Arc<MetadataExtractor>,
        markers: Arc<ScrapeMarkers>,
    ) -> Self {
        Self::with_kind(MediaKind::Movie, store, extractor, markers)
    }

    pub fn series(
        store: Arc<dyn MetadataStore>,
        extractor: Arc<MetadataExtractor>,
        markers: Arc<ScrapeMarkers>,
    ) -> Self {
        Self::with_kind(MediaKind::Series, store, extractor, markers)
    }

    pub fn events(
        store: Arc<dyn MetadataStore>,
        extractor: Arc<MetadataExtractor>,
        markers: Arc<ScrapeMarkers>,
    ) -> Self {
        Self::with_kind(MediaKind::Events, store, extractor, markers)
    }

    fn with_kind(
        kind: MediaKind,
        store: Arc<dyn MetadataStore>,
        extractor: Arc<MetadataExtractor>,
        markers: Arc<ScrapeMarkers>,
    ) -> Self {
        Self {
            kind,
            extractor,
            gate: DeduplicationGate::new(Arc::clone(&store)),
            aggregator: SeriesAggregator::new(store),
            markers,
        }
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    async fn mark(&self, key: Option<String>, info_hash: &str) {
        if let Some(key) = key {
            if !self.markers.mark(&key, info_hash).await {
                debug!(set = %key, info_hash = %info_hash, "Hash already marked this session");
            }
        }
    }
}

#[async_trait]
impl ItemHandler for TorrentStoreHandler {
    fn name(&self) -> &str {
        self.kind.as_str()
    }

    async fn process(&self, item: ScrapedItem) -> Result<IngestOutcome, IngestError> {
        let Some(title) = item.normalized_title().map(str::to_string) else {
            return Ok(IngestOutcome::Dropped(DropReason::MissingField("title")));
        };

        let extraction = match self.extractor.extract(item, self.kind).await {
            Ok(extraction) => extraction,
            Err(ExtractError::Magnet(e)) => {
                return Ok(IngestOutcome::Dropped(DropReason::InvalidMagnet(e.to_string())))
            }
            Err(ExtractError::Title(e)) => {
                return Ok(IngestOutcome::Dropped(DropReason::TitleParse(e.to_string())))
            }
        };

        let item = extraction.item;
        let Some(info_hash) = item.info_hash.clone() else {
            return Ok(match extraction.status {
                ExtractStatus::Deferred { reason } | ExtractStatus::PassedThrough { reason } => {
                    IngestOutcome::Deferred { reason }
                }
                ExtractStatus::Complete => IngestOutcome::Dropped(DropReason::MissingInfoHash),
            });
        };
        if let ExtractStatus::Deferred { reason } = extraction.status {
            return Ok(IngestOutcome::Deferred { reason });
        }

        let expected_sources = item.expected_sources.clone();
        let marker_key = item.scraped_info_hash_key.clone();

        // Duplicates are settled before anything is written.
        if self.gate.evaluate(&info_hash, expected_sources.as_deref())? == IngestOutcome::Skip {
            debug!(pipeline = %self.kind, info_hash = %info_hash, "Duplicate torrent skipped");
            self.mark(marker_key, &info_hash).await;
            return Ok(IngestOutcome::Skip);
        }

        let aggregate = self.aggregator.ensure_aggregate(self.kind, &title, &item)?;

        let stream = TorrentStream {
            info_hash: info_hash.clone(),
            meta_id: aggregate.id.clone(),
            torrent_name: item
                .torrent_name
                .or(item.torrent_title)
                .unwrap_or_else(|| title.clone()),
            announce_list: item.announce_list.unwrap_or_default(),
            size: item.total_size.unwrap_or(0),
            source: item.source.unwrap_or_else(|| UNKNOWN_SOURCE.to_string()),
            uploader: item.uploader,
            catalog: item.catalog.unwrap_or_default(),
            languages: item.languages.unwrap_or_default(),
            quality: item.quality,
            resolution: item.resolution,
            codec: item.codec,
            audio: item.audio.unwrap_or_default(),
            hdr: item.hdr.unwrap_or_default(),
            seeders: item.seeders,
            episode_files: item.episode_files.filter(|_| self.kind.has_episodes()),
            created_at: item.created_at.unwrap_or_else(Utc::now),
        };

        let admission = self.gate.admit(&stream, expected_sources.as_deref())?;
        let outcome = admission.outcome;

        if outcome.wrote() {
            info!(
                pipeline = %self.kind,
                info_hash = %info_hash,
                meta_id = %aggregate.id,
                title = %title,
                source = %stream.source,
                outcome = outcome.label(),
                "Stored torrent"
            );
            if self.kind.has_episodes() {
                self.aggregator.reorganize_episodes(&aggregate.id)?;
                // The replaced record may have belonged to another title.
                if let Some(previous) = admission
                    .previous_meta_id
                    .filter(|previous| *previous != aggregate.id)
                {
                    self.aggregator.reorganize_episodes(&previous)?;
                }
            }
        }

        self.mark(marker_key, &info_hash).await;
        Ok(outcome)
    }
}

/// Upserts live TV channels by title.
pub struct TvChannelHandler {
    store: Arc<dyn MetadataStore>,
}

impl TvChannelHandler {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ItemHandler for TvChannelHandler {
    fn name(&self) -> &str {
        MediaKind::Tv.as_str()
    }

    async fn process(&self, item: ScrapedItem) -> Result<IngestOutcome, IngestError> {
        let Some(title) = item.normalized_title().map(str::to_string) else {
            return Ok(IngestOutcome::Dropped(DropReason::MissingField("title")));
        };
        let stream_urls: Vec<String> = item
            .stream_urls
            .unwrap_or_default()
            .into_iter()
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .collect();
        if stream_urls.is_empty() {
            return Ok(IngestOutcome::Dropped(DropReason::MissingField("stream_urls")));
        }

        let channel = TvChannel {
            id: channel_id(&title),
            title,
            country: item.country,
            poster: item.poster,
            genres: item.genres.unwrap_or_default(),
            stream_urls,
            source: item.source,
            updated_at: Utc::now(),
        };

        let previous = self.store.upsert_tv_channel(&channel)?;
        debug!(channel = %channel.id, urls = channel.stream_urls.len(), "Upserted TV channel");
        Ok(match previous {
            None => IngestOutcome::Insert,
            Some(previous) => IngestOutcome::Replace {
                previous_source: previous.source,
            },
        })
    }
}

/// Channel id derived from the lowercased title.
pub fn channel_id(title: &str) -> String {
    let mut id = String::with_capacity(title.len());
    for c in title.trim().chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            id.push(c);
        } else if !id.is_empty() && !id.ends_with('-') {
            id.push('-');
        }
    }
    id.trim_end_matches('-').to_string()
}
