//! Metadata extraction from magnet links, torrent files and release titles.

mod extractor;
mod fetch;
mod magnet;
mod title;
mod torrent_file;

pub use extractor::{
    ExtractError, ExtractStatus, Extraction, MetadataExtractor, TorrentFetchCache,
    TORRENT_CONTENT_TYPE,
};
pub use fetch::{referer_headers, ByteFetcher, FetchError, FetchResponse, HttpFetcher};
pub use magnet::{parse_magnet, validate_info_hash, MagnetError, MagnetLink};
pub use title::{PatternTitleParser, TitleAttributes, TitleParseError, TitleParser};
pub use torrent_file::{decode_torrent, TorrentFile, TorrentInfo, TorrentParseError};
