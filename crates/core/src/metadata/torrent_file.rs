//! Torrent file decoding.
//!
//! Uses librqbit-core to parse bencoded .torrent data into the canonical
//! fields: info hash, trackers, file list and total size.

use librqbit_core::torrent_metainfo::{torrent_from_bytes, TorrentMetaV1Owned};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when decoding torrent files.
#[derive(Debug, Clone, Error)]
pub enum TorrentParseError {
    #[error("Failed to parse torrent: {0}")]
    ParseError(String),

    #[error("Empty torrent (no files)")]
    EmptyTorrent,
}

/// A file inside a torrent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TorrentFile {
    /// Full path, `/`-separated, rooted at the torrent name for multi-file torrents.
    pub path: String,
    pub size: u64,
}

impl TorrentFile {
    /// Last path component.
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// Canonical fields decoded from a .torrent file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentInfo {
    /// Lowercase hex info hash.
    pub info_hash: String,
    pub name: String,
    /// Trackers in announce order, deduplicated.
    pub announce_list: Vec<String>,
    pub files: Vec<TorrentFile>,
    pub total_size: u64,
}

/// Decode a .torrent file.
///
/// Supports both single-file and multi-file torrents.
pub fn decode_torrent(bytes: &[u8]) -> Result<TorrentInfo, TorrentParseError> {
    let torrent: TorrentMetaV1Owned =
        torrent_from_bytes(bytes).map_err(|e| TorrentParseError::ParseError(e.to_string()))?;

    let info = &torrent.info;
    let name = info
        .name
        .as_ref()
        .map(|b| bytes_to_string(b.as_ref()))
        .unwrap_or_else(|| "unknown".to_string());

    let files = if let Some(ref files) = info.files {
        let mut result = Vec::with_capacity(files.len());
        for file in files {
            let mut parts = vec![name.clone()];
            parts.extend(file.path.iter().map(|p| bytes_to_string(p.as_ref())));
            result.push(TorrentFile {
                path: parts.join("/"),
                size: file.length,
            });
        }
        result
    } else if let Some(length) = info.length {
        vec![TorrentFile {
            path: name.clone(),
            size: length,
        }]
    } else {
        Vec::new()
    };

    if files.is_empty() {
        return Err(TorrentParseError::EmptyTorrent);
    }

    let mut announce_list: Vec<String> = Vec::new();
    let tiers = torrent.announce.iter().chain(torrent.announce_list.iter().flatten());
    for tracker in tiers {
        let tracker = bytes_to_string(tracker.as_ref());
        if !tracker.is_empty() && !announce_list.contains(&tracker) {
            announce_list.push(tracker);
        }
    }

    Ok(TorrentInfo {
        info_hash: torrent.info_hash.as_string(),
        total_size: files.iter().map(|f| f.size).sum(),
        name,
        announce_list,
        files,
    })
}

/// Convert bytes to a UTF-8 string, replacing invalid sequences.
fn bytes_to_string(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => String::from_utf8_lossy(bytes).into_owned(),
    }
}
