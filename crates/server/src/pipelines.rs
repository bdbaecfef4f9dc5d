//! The four ingestion pipelines and routing between them.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::info;

use streamvault_core::{
    EnqueueError, IngestQueue, MediaKind, MetadataExtractor, MetadataStore, QueueStats,
    ScrapeMarkers, ScrapedItem, TorrentStoreHandler, TvChannelHandler,
};

/// One queue per media kind, sharing a store and extractor.
pub struct Pipelines {
    movies: IngestQueue<TorrentStoreHandler>,
    series: IngestQueue<TorrentStoreHandler>,
    events: IngestQueue<TorrentStoreHandler>,
    tv: IngestQueue<TvChannelHandler>,
}

impl Pipelines {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        extractor: Arc<MetadataExtractor>,
        markers: Arc<ScrapeMarkers>,
        capacity: usize,
    ) -> Self {
        Self {
            movies: IngestQueue::new(
                TorrentStoreHandler::movies(store.clone(), extractor.clone(), markers.clone()),
                capacity,
            ),
            series: IngestQueue::new(
                TorrentStoreHandler::series(store.clone(), extractor.clone(), markers.clone()),
                capacity,
            ),
            events: IngestQueue::new(
                TorrentStoreHandler::events(store.clone(), extractor, markers),
                capacity,
            ),
            tv: IngestQueue::new(TvChannelHandler::new(store), capacity),
        }
    }

    pub async fn start(&self) {
        self.movies.start().await;
        self.series.start().await;
        self.events.start().await;
        self.tv.start().await;
        info!("Ingest pipelines started");
    }

    /// Close every queue and wait until buffered items are processed.
    pub async fn shutdown(&self) {
        tokio::join!(
            self.movies.shutdown(),
            self.series.shutdown(),
            self.events.shutdown(),
            self.tv.shutdown(),
        );
        info!("Ingest pipelines drained");
    }

    /// Enqueue on the pipeline for `kind`, waiting while it is full.
    pub async fn route(
        &self,
        kind: MediaKind,
        item: ScrapedItem,
    ) -> Result<(), EnqueueError<ScrapedItem>> {
        match kind {
            MediaKind::Movie => self.movies.enqueue_wait(item).await,
            MediaKind::Series => self.series.enqueue_wait(item).await,
            MediaKind::Events => self.events.enqueue_wait(item).await,
            MediaKind::Tv => self.tv.enqueue_wait(item).await,
        }
    }

    pub fn stats(&self) -> BTreeMap<&'static str, QueueStats> {
        BTreeMap::from([
            (MediaKind::Movie.as_str(), self.movies.stats()),
            (MediaKind::Series.as_str(), self.series.stats()),
            (MediaKind::Events.as_str(), self.events.stats()),
            (MediaKind::Tv.as_str(), self.tv.stats()),
        ])
    }
}
