//! Ingestion pipeline integration tests.
//!
//! These tests run the queues end to end against an on-disk store:
//! - Idempotent ingestion of the same item
//! - Replace and skip decisions on hash conflicts
//! - Worker isolation from invalid items
//! - Series aggregation across torrents and titles

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use streamvault_core::{
    cache::{RateLimitedCache, RateLimiter},
    ingest::{IngestQueue, MediaKind, ScrapedItem, TorrentStoreHandler, TvChannelHandler},
    metadata::{MetadataExtractor, PatternTitleParser},
    testing::{fixtures, MockFetcher},
    MetadataStore, ScrapeMarkers, SqliteStore,
};

const HASH: &str = "abcdef1234567890abcdef1234567890abcdef12";

/// Test helper wiring the pipelines to a temporary database.
struct TestHarness {
    store: Arc<SqliteStore>,
    extractor: Arc<MetadataExtractor>,
    markers: Arc<ScrapeMarkers>,
    fetcher: Arc<MockFetcher>,
    _temp_dir: TempDir,
}

impl TestHarness {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = Arc::new(
            SqliteStore::new(&temp_dir.path().join("test.db")).expect("Failed to create store"),
        );
        let fetcher = Arc::new(MockFetcher::new());
        let limiter = Arc::new(RateLimiter::new("torrent", 50, Duration::from_secs(1)));
        let cache = RateLimitedCache::new(
            "torrent",
            Duration::from_secs(60),
            Duration::from_secs(5),
            limiter,
        );
        let extractor = Arc::new(MetadataExtractor::new(
            fetcher.clone(),
            cache,
            Arc::new(PatternTitleParser::new()),
        ));

        Self {
            store,
            extractor,
            markers: Arc::new(ScrapeMarkers::new()),
            fetcher,
            _temp_dir: temp_dir,
        }
    }

    fn movies(&self) -> IngestQueue<TorrentStoreHandler> {
        IngestQueue::new(
            TorrentStoreHandler::movies(self.store.clone(), self.extractor.clone(), self.markers.clone()),
            64,
        )
    }

    fn series(&self) -> IngestQueue<TorrentStoreHandler> {
        IngestQueue::new(
            TorrentStoreHandler::series(self.store.clone(), self.extractor.clone(), self.markers.clone()),
            64,
        )
    }

    fn events(&self) -> IngestQueue<TorrentStoreHandler> {
        IngestQueue::new(
            TorrentStoreHandler::events(self.store.clone(), self.extractor.clone(), self.markers.clone()),
            64,
        )
    }
}

#[tokio::test]
async fn test_same_item_twice_stores_one_record() {
    let h = TestHarness::new();
    let queue = h.movies();
    queue.start().await;

    let item = fixtures::movie_item("Some Movie", HASH, "SourceA").with_marker_key("session");
    queue.enqueue(item.clone()).unwrap();
    queue.enqueue(item).unwrap();
    queue.shutdown().await;

    assert_eq!(h.store.count_streams().unwrap(), 1);
    let stats = queue.stats();
    assert_eq!(stats.inserted, 1);
    assert_eq!(stats.skipped, 1);
    assert_eq!(h.markers.len("session").await, 1);
}

#[tokio::test]
async fn test_conflict_from_disallowed_source_is_replaced() {
    let h = TestHarness::new();
    let queue = h.movies();
    queue.start().await;

    queue
        .enqueue(fixtures::movie_item("Some Movie", HASH, "A"))
        .unwrap();
    queue
        .enqueue(fixtures::movie_item("Some Movie", HASH, "B").with_expected_sources(["B"]))
        .unwrap();
    queue.shutdown().await;

    assert_eq!(h.store.count_streams().unwrap(), 1);
    assert_eq!(h.store.find_by_hash(HASH).unwrap().unwrap().source, "B");
    assert_eq!(queue.stats().replaced, 1);
}

#[tokio::test]
async fn test_conflict_from_allowed_source_is_skipped() {
    let h = TestHarness::new();
    let queue = h.movies();
    queue.start().await;

    queue
        .enqueue(fixtures::movie_item("Some Movie", HASH, "A"))
        .unwrap();
    queue.shutdown().await;
    let before = h.store.find_by_hash(HASH).unwrap().unwrap();

    let queue = h.movies();
    queue.start().await;
    queue
        .enqueue(fixtures::movie_item("Some Movie", HASH, "A").with_expected_sources(["A"]))
        .unwrap();
    queue.shutdown().await;

    assert_eq!(queue.stats().skipped, 1);
    assert_eq!(h.store.count_streams().unwrap(), 1);
    assert_eq!(h.store.find_by_hash(HASH).unwrap().unwrap(), before);
}

#[tokio::test]
async fn test_item_without_title_is_dropped_and_worker_continues() {
    let h = TestHarness::new();
    let queue = h.movies();
    queue.start().await;

    let mut untitled = fixtures::movie_item("Some Movie", HASH, "A");
    untitled.title = None;
    queue.enqueue(untitled).unwrap();
    queue
        .enqueue(ScrapedItem::new(MediaKind::Movie, "Broken").with_magnet("magnet:?xt=urn:btih:zz"))
        .unwrap();
    queue
        .enqueue(fixtures::movie_item(
            "Other Movie",
            "1111111111111111111111111111111111111111",
            "A",
        ))
        .unwrap();
    queue.shutdown().await;

    let stats = queue.stats();
    assert_eq!(stats.dropped, 2);
    assert_eq!(stats.inserted, 1);
    assert!(h.store.find_by_hash(HASH).unwrap().is_none());
    assert_eq!(h.store.count_streams().unwrap(), 1);
}

#[tokio::test]
async fn test_series_torrents_share_one_aggregate() {
    let h = TestHarness::new();
    let queue = h.series();
    queue.start().await;

    queue
        .enqueue(fixtures::series_item("Some Show", 1, &[1, 2, 3], "A"))
        .unwrap();
    queue
        .enqueue(fixtures::series_item("Some Show", 2, &[1, 2], "A"))
        .unwrap();
    queue.shutdown().await;

    let aggregate = h
        .store
        .find_aggregate_by_title(MediaKind::Series, "Some Show")
        .unwrap()
        .expect("aggregate created");
    assert!(aggregate.id.starts_with("mf"));
    assert_eq!(h.store.list_by_meta_id(&aggregate.id).unwrap().len(), 2);

    let numbers: Vec<(u32, u32)> = aggregate
        .episodes
        .iter()
        .map(|e| (e.season, e.episode))
        .collect();
    assert_eq!(numbers, vec![(1, 1), (1, 2), (1, 3), (2, 1), (2, 2)]);
}

#[tokio::test]
async fn test_replaced_torrent_leaves_previous_title_mapping() {
    let h = TestHarness::new();
    let queue = h.series();
    queue.start().await;

    let original = fixtures::series_item("Show A", 1, &[1, 2], "A");
    let mut moved = original.clone().with_source("B").with_expected_sources(["B"]);
    moved.title = Some("Show B".to_string());
    queue.enqueue(original).unwrap();
    queue.enqueue(moved).unwrap();
    queue.shutdown().await;

    assert_eq!(queue.stats().replaced, 1);
    let show_a = h
        .store
        .find_aggregate_by_title(MediaKind::Series, "Show A")
        .unwrap()
        .expect("first aggregate kept");
    assert!(h.store.list_by_meta_id(&show_a.id).unwrap().is_empty());
    assert!(show_a.episodes.is_empty());

    let show_b = h
        .store
        .find_aggregate_by_title(MediaKind::Series, "Show B")
        .unwrap()
        .expect("second aggregate created");
    let numbers: Vec<(u32, u32)> = show_b.episodes.iter().map(|e| (e.season, e.episode)).collect();
    assert_eq!(numbers, vec![(1, 1), (1, 2)]);
}

#[tokio::test]
async fn test_skipped_duplicate_creates_no_aggregate() {
    let h = TestHarness::new();
    let queue = h.series();
    queue.start().await;

    let original = fixtures::series_item("Show A", 1, &[1], "A");
    let mut retitled = original.clone();
    retitled.title = Some("Other Title".to_string());
    queue.enqueue(original).unwrap();
    queue.enqueue(retitled).unwrap();
    queue.shutdown().await;

    assert_eq!(queue.stats().skipped, 1);
    assert!(h
        .store
        .find_aggregate_by_title(MediaKind::Series, "Other Title")
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_downloaded_torrent_link_is_ingested() {
    let h = TestHarness::new();
    let bytes = fixtures::torrent_bytes(
        "Live.Event.2024.1080p",
        &[("Live.Event.2024.E01.mkv", 1000), ("Live.Event.2024.E02.mkv", 1000)],
        0,
        &["udp://tracker.example:80"],
    );
    h.fetcher
        .respond_torrent("https://site.example/t/9.torrent", bytes)
        .await;

    let queue = h.events();
    queue.start().await;
    let mut item = ScrapedItem::new(MediaKind::Events, "Live Event")
        .with_torrent_link("https://site.example/t/9.torrent")
        .with_source("A");
    item.webpage_url = Some("https://site.example/t/9".to_string());
    queue.enqueue(item).unwrap();
    queue.shutdown().await;

    assert_eq!(queue.stats().inserted, 1);
    let aggregate = h
        .store
        .find_aggregate_by_title(MediaKind::Events, "Live Event")
        .unwrap()
        .unwrap();
    let streams = h.store.list_by_meta_id(&aggregate.id).unwrap();
    assert_eq!(streams[0].size, 2000);
    assert_eq!(streams[0].announce_list, vec!["udp://tracker.example:80"]);
}

#[tokio::test]
async fn test_pipelines_run_independently_on_one_store() {
    let h = TestHarness::new();
    let movies = h.movies();
    let series = h.series();
    let tv = IngestQueue::new(TvChannelHandler::new(h.store.clone()), 16);
    movies.start().await;
    series.start().await;
    tv.start().await;

    for i in 0..10 {
        let hash = format!("{:040x}", i + 1);
        movies
            .enqueue(fixtures::movie_item(&format!("Movie {}", i), &hash, "A"))
            .unwrap();
    }
    series
        .enqueue(fixtures::series_item("Some Show", 1, &[1], "A"))
        .unwrap();
    let mut channel = ScrapedItem::new(MediaKind::Tv, "News 24");
    channel.stream_urls = Some(vec!["https://live.example/news.m3u8".to_string()]);
    tv.enqueue(channel).unwrap();

    movies.shutdown().await;
    series.shutdown().await;
    tv.shutdown().await;

    assert_eq!(h.store.count_streams().unwrap(), 11);
    assert!(h.store.find_tv_channel("news-24").unwrap().is_some());
}
