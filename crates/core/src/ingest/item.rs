use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::metadata::TorrentFile;
use crate::store::EpisodeFile;

/// Semantic pipeline an item belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Movie,
    Series,
    #[serde(alias = "tv_channel")]
    Tv,
    #[serde(alias = "event")]
    Events,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Movie => "movie",
            MediaKind::Series => "series",
            MediaKind::Tv => "tv",
            MediaKind::Events => "events",
        }
    }

    /// Whether aggregates of this kind carry an episode mapping.
    pub fn has_episodes(&self) -> bool {
        matches!(self, MediaKind::Series | MediaKind::Events)
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "movie" => Some(MediaKind::Movie),
            "series" => Some(MediaKind::Series),
            "tv" | "tv_channel" => Some(MediaKind::Tv),
            "events" | "event" => Some(MediaKind::Events),
            _ => None,
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A raw record handed over by a scraper.
///
/// Everything is optional; pipelines validate what they need. Unknown
/// fields are kept in `extra` as provenance tags.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapedItem {
    pub media_type: Option<MediaKind>,

    // Media identity
    pub title: Option<String>,
    pub year: Option<i32>,
    pub poster: Option<String>,
    pub background: Option<String>,

    // Raw inputs
    pub torrent_title: Option<String>,
    pub magnet_link: Option<String>,
    pub torrent_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub torrent_bytes: Option<Vec<u8>>,
    pub webpage_url: Option<String>,

    // Canonical torrent fields, filled by the producer or the extractor
    pub info_hash: Option<String>,
    pub torrent_name: Option<String>,
    pub announce_list: Option<Vec<String>>,
    pub total_size: Option<u64>,
    pub files: Option<Vec<TorrentFile>>,
    pub episode_files: Option<Vec<EpisodeFile>>,

    // Title attributes
    pub quality: Option<String>,
    pub resolution: Option<String>,
    pub codec: Option<String>,
    pub audio: Option<Vec<String>>,
    pub hdr: Option<Vec<String>>,
    pub languages: Option<Vec<String>>,

    // Provenance
    pub source: Option<String>,
    pub uploader: Option<String>,
    pub catalog: Option<Vec<String>>,
    pub expected_sources: Option<Vec<String>>,
    pub seeders: Option<u32>,
    pub created_at: Option<DateTime<Utc>>,
    pub scraped_info_hash_key: Option<String>,

    // TV channels
    pub stream_urls: Option<Vec<String>>,
    pub country: Option<String>,
    pub genres: Option<Vec<String>>,

    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl ScrapedItem {
    pub fn new(kind: MediaKind, title: impl Into<String>) -> Self {
        Self {
            media_type: Some(kind),
            title: Some(title.into()),
            ..Default::default()
        }
    }

    pub fn with_magnet(mut self, magnet: impl Into<String>) -> Self {
        self.magnet_link = Some(magnet.into());
        self
    }

    pub fn with_torrent_link(mut self, url: impl Into<String>) -> Self {
        self.torrent_link = Some(url.into());
        self
    }

    pub fn with_torrent_bytes(mut self, bytes: Vec<u8>) -> Self {
        self.torrent_bytes = Some(bytes);
        self
    }

    pub fn with_torrent_title(mut self, title: impl Into<String>) -> Self {
        self.torrent_title = Some(title.into());
        self
    }

    pub fn with_info_hash(mut self, hash: impl Into<String>) -> Self {
        self.info_hash = Some(hash.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_expected_sources<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.expected_sources = Some(sources.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_marker_key(mut self, key: impl Into<String>) -> Self {
        self.scraped_info_hash_key = Some(key.into());
        self
    }

    /// Title with surrounding whitespace removed, if non-empty.
    pub fn normalized_title(&self) -> Option<&str> {
        self.title.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }
}
