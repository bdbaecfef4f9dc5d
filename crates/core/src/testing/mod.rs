//! Testing utilities and mock implementations.
//!
//! Mocks stand in for the network-facing traits so the pipelines can be
//! exercised end to end against an in-memory store.
//!
//! # Example
//!
//! ```rust,ignore
//! use streamvault_core::testing::{fixtures, MockFetcher};
//!
//! let fetcher = MockFetcher::new();
//! fetcher
//!     .respond_torrent("https://site/t/1.torrent", fixtures::torrent_bytes("a.mkv", &[], 10, &[]))
//!     .await;
//! ```

mod mock_fetcher;
mod mock_title_parser;

pub use mock_fetcher::{MockFetcher, RecordedFetch};
pub use mock_title_parser::FailingTitleParser;

/// Test fixtures and helper functions.
pub mod fixtures {
    use chrono::Utc;

    use crate::ingest::{MediaKind, ScrapedItem};
    use crate::store::{MediaAggregate, TorrentStream, TvChannel};

    /// Create a torrent stream with reasonable defaults.
    pub fn stream(
        info_hash: impl Into<String>,
        meta_id: impl Into<String>,
        source: &str,
    ) -> TorrentStream {
        TorrentStream {
            info_hash: info_hash.into(),
            meta_id: meta_id.into(),
            torrent_name: "Some.Release.1080p.WEB-DL.mkv".to_string(),
            announce_list: vec!["udp://tracker.example:80/announce".to_string()],
            size: 1024 * 1024 * 700, // 700 MB
            source: source.to_string(),
            uploader: None,
            catalog: vec![],
            languages: vec!["English".to_string()],
            quality: Some("WEB-DL".to_string()),
            resolution: Some("1080p".to_string()),
            codec: None,
            audio: vec![],
            hdr: vec![],
            seeders: Some(10),
            episode_files: None,
            created_at: Utc::now(),
        }
    }

    /// Create an aggregate with no episodes.
    pub fn aggregate(id: &str, kind: MediaKind, title: &str) -> MediaAggregate {
        MediaAggregate {
            id: id.to_string(),
            kind,
            title: title.to_string(),
            year: None,
            poster: None,
            background: None,
            episodes: vec![],
            created_at: Utc::now(),
        }
    }

    /// Create a TV channel with a single stream URL.
    pub fn tv_channel(id: &str, title: &str) -> TvChannel {
        TvChannel {
            id: id.to_string(),
            title: title.to_string(),
            country: Some("IN".to_string()),
            poster: None,
            genres: vec!["News".to_string()],
            stream_urls: vec![format!("https://live.example/{}.m3u8", id)],
            source: Some("mock-source".to_string()),
            updated_at: Utc::now(),
        }
    }

    /// A movie item carrying a magnet for `info_hash`.
    pub fn movie_item(title: &str, info_hash: &str, source: &str) -> ScrapedItem {
        ScrapedItem::new(MediaKind::Movie, title)
            .with_magnet(format!(
                "magnet:?xt=urn:btih:{}&dn={}.2020.1080p.WEB-DL&tr=udp%3A%2F%2Ftracker.example%3A80",
                info_hash,
                title.replace(' ', ".")
            ))
            .with_torrent_title(format!("{}.2020.1080p.WEB-DL", title.replace(' ', ".")))
            .with_source(source)
    }

    /// A series item carrying raw torrent bytes with one file per episode.
    pub fn series_item(title: &str, season: u32, episodes: &[u32], source: &str) -> ScrapedItem {
        let dotted = title.replace(' ', ".");
        let name = format!("{}.S{:02}.1080p.WEB-DL", dotted, season);
        let files: Vec<(String, u64)> = episodes
            .iter()
            .map(|e| (format!("{}.S{:02}E{:02}.1080p.mkv", dotted, season, e), 500_000))
            .collect();
        let file_refs: Vec<(&str, u64)> = files.iter().map(|(p, s)| (p.as_str(), *s)).collect();

        ScrapedItem::new(MediaKind::Series, title)
            .with_torrent_bytes(torrent_bytes(&name, &file_refs, 0, &[]))
            .with_torrent_title(name)
            .with_source(source)
    }

    /// Build a minimal bencoded .torrent.
    ///
    /// An empty `files` produces a single-file torrent of `length` bytes.
    /// Otherwise `length` is ignored and a multi-file torrent is built.
    pub fn torrent_bytes(
        name: &str,
        files: &[(&str, u64)],
        length: u64,
        trackers: &[&str],
    ) -> Vec<u8> {
        let mut info = Vec::new();
        info.push(b'd');
        if !files.is_empty() {
            bstr(&mut info, "files");
            info.push(b'l');
            for (path, size) in files {
                info.push(b'd');
                bstr(&mut info, "length");
                bint(&mut info, *size);
                bstr(&mut info, "path");
                info.push(b'l');
                for part in path.split('/') {
                    bstr(&mut info, part);
                }
                info.push(b'e');
                info.push(b'e');
            }
            info.push(b'e');
        } else {
            bstr(&mut info, "length");
            bint(&mut info, length);
        }
        bstr(&mut info, "name");
        bstr(&mut info, name);
        bstr(&mut info, "piece length");
        bint(&mut info, 16384);
        bstr(&mut info, "pieces");
        bbytes(&mut info, &[0u8; 20]);
        info.push(b'e');

        let mut out = Vec::new();
        out.push(b'd');
        if let Some(first) = trackers.first() {
            bstr(&mut out, "announce");
            bstr(&mut out, first);
            bstr(&mut out, "announce-list");
            out.push(b'l');
            for tracker in trackers {
                out.push(b'l');
                bstr(&mut out, tracker);
                out.push(b'e');
            }
            out.push(b'e');
        }
        bstr(&mut out, "info");
        out.extend_from_slice(&info);
        out.push(b'e');
        out
    }

    fn bstr(out: &mut Vec<u8>, s: &str) {
        bbytes(out, s.as_bytes());
    }

    fn bbytes(out: &mut Vec<u8>, b: &[u8]) {
        out.extend_from_slice(b.len().to_string().as_bytes());
        out.push(b':');
        out.extend_from_slice(b);
    }

    fn bint(out: &mut Vec<u8>, n: u64) {
        out.push(b'i');
        out.extend_from_slice(n.to_string().as_bytes());
        out.push(b'e');
    }
}
