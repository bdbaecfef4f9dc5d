pub mod cache;
pub mod config;
pub mod dedup;
pub mod ingest;
pub mod metadata;
pub mod metrics;
pub mod provider;
pub mod series;
pub mod store;
pub mod testing;

pub use cache::{CacheError, CacheKey, RateLimitedCache, RateLimiter, RateLimiterPool};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, ProviderConfig,
    ProviderKind, SanitizedConfig,
};
pub use dedup::{Admission, DeduplicationGate, ScrapeMarkers};
pub use ingest::{
    DropReason, EnqueueError, IngestError, IngestOutcome, IngestQueue, ItemHandler, MediaKind,
    QueueStats, ScrapedItem, TorrentStoreHandler, TvChannelHandler,
};
pub use metadata::{
    ByteFetcher, ExtractError, HttpFetcher, MetadataExtractor, PatternTitleParser, TitleParser,
};
pub use provider::{
    create_provider, retry_with_backoff, ErrorCategory, ProviderClient, ProviderError,
    RetryPolicy,
};
pub use series::SeriesAggregator;
pub use store::{MetadataStore, SqliteStore, StoreError};
