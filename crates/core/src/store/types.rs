use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ingest::MediaKind;

/// A video file of a torrent mapped to an episode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeFile {
    pub season_number: u32,
    pub episode_number: u32,
    pub filename: String,
    pub size: u64,
    /// Index of the file in the torrent's file list.
    pub file_index: usize,
}

/// Canonical torrent metadata, unique by `info_hash`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TorrentStream {
    pub info_hash: String,
    /// Id of the owning aggregate.
    pub meta_id: String,
    pub torrent_name: String,
    pub announce_list: Vec<String>,
    pub size: u64,
    pub source: String,
    pub uploader: Option<String>,
    pub catalog: Vec<String>,
    pub languages: Vec<String>,
    pub quality: Option<String>,
    pub resolution: Option<String>,
    pub codec: Option<String>,
    pub audio: Vec<String>,
    pub hdr: Vec<String>,
    pub seeders: Option<u32>,
    pub episode_files: Option<Vec<EpisodeFile>>,
    pub created_at: DateTime<Utc>,
}

/// One file of one torrent that provides an episode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeSource {
    pub info_hash: String,
    pub file_index: usize,
    pub filename: String,
    pub size: u64,
}

/// Episode entry of an aggregate, derived from all linked torrents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesEpisode {
    pub season: u32,
    pub episode: u32,
    pub sources: Vec<EpisodeSource>,
}

/// Per-title grouping of torrents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaAggregate {
    pub id: String,
    pub kind: MediaKind,
    pub title: String,
    pub year: Option<i32>,
    pub poster: Option<String>,
    pub background: Option<String>,
    pub episodes: Vec<SeriesEpisode>,
    pub created_at: DateTime<Utc>,
}

/// Live TV channel with its stream URLs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TvChannel {
    pub id: String,
    pub title: String,
    pub country: Option<String>,
    pub poster: Option<String>,
    pub genres: Vec<String>,
    pub stream_urls: Vec<String>,
    pub source: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Errors from the metadata store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Duplicate key: {0}")]
    Duplicate(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}
