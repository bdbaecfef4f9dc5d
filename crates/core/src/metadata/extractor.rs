//! Turns raw scraped items into canonical torrent metadata.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use super::fetch::{referer_headers, ByteFetcher, FetchError, FetchResponse};
use super::magnet::{parse_magnet, validate_info_hash, MagnetError, MagnetLink};
use super::title::{TitleAttributes, TitleParseError, TitleParser};
use super::torrent_file::{decode_torrent, TorrentInfo};
use crate::cache::{CacheError, CacheKey, RateLimitedCache};
use crate::ingest::{MediaKind, ScrapedItem};
use crate::metrics::EXTRACTION_ERRORS;
use crate::series::episode_files_from;

pub const TORRENT_CONTENT_TYPE: &str = "application/x-bittorrent";

/// Hard extraction failures. The caller drops the item.
#[derive(Debug, Clone, Error)]
pub enum ExtractError {
    #[error("Invalid magnet: {0}")]
    Magnet(#[from] MagnetError),

    #[error("Title parse failed: {0}")]
    Title(#[from] TitleParseError),
}

/// How complete the extracted metadata is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractStatus {
    Complete,
    /// A soft failure left the item as the producer supplied it.
    PassedThrough { reason: String },
    /// The magnet was unusable and so were the attached bytes.
    Deferred { reason: String },
}

/// An item augmented with whatever metadata could be extracted.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub item: ScrapedItem,
    pub status: ExtractStatus,
}

/// Cache of torrent file downloads.
pub type TorrentFetchCache = RateLimitedCache<FetchResponse, FetchError>;

/// Extracts canonical metadata from magnet links, torrent bytes and titles.
///
/// Fields the producer already supplied are never overwritten.
pub struct MetadataExtractor {
    fetcher: Arc<dyn ByteFetcher>,
    cache: TorrentFetchCache,
    title_parser: Arc<dyn TitleParser>,
}

impl MetadataExtractor {
    pub fn new(
        fetcher: Arc<dyn ByteFetcher>,
        cache: TorrentFetchCache,
        title_parser: Arc<dyn TitleParser>,
    ) -> Self {
        Self {
            fetcher,
            cache,
            title_parser,
        }
    }

    pub async fn extract(
        &self,
        mut item: ScrapedItem,
        kind: MediaKind,
    ) -> Result<Extraction, ExtractError> {
        let mut status = ExtractStatus::Complete;

        let mut magnet_error = None;
        if let Some(uri) = item.magnet_link.as_deref() {
            match parse_magnet(uri) {
                Ok(magnet) => merge_magnet(&mut item, magnet),
                Err(e) => {
                    EXTRACTION_ERRORS.with_label_values(&["magnet"]).inc();
                    if item.torrent_bytes.is_none() {
                        return Err(ExtractError::Magnet(e));
                    }
                    debug!(error = %e, "Magnet unusable, falling back to torrent bytes");
                    magnet_error = Some(e);
                }
            }
        }

        if let Some(bytes) = item.torrent_bytes.as_deref() {
            match decode_torrent(bytes) {
                Ok(info) => merge_torrent(&mut item, info),
                Err(e) => {
                    EXTRACTION_ERRORS.with_label_values(&["torrent"]).inc();
                    if let Some(magnet_error) = magnet_error {
                        return Ok(Extraction {
                            item,
                            status: ExtractStatus::Deferred {
                                reason: format!("{}; {}", magnet_error, e),
                            },
                        });
                    }
                    warn!(error = %e, "Attached torrent bytes could not be decoded");
                    status = ExtractStatus::PassedThrough {
                        reason: e.to_string(),
                    };
                }
            }
        } else if let Some(link) = item.torrent_link.clone() {
            if item.files.is_none() {
                match self.download(&link, item.webpage_url.as_deref()).await {
                    Ok(info) => merge_torrent(&mut item, info),
                    Err(reason) => {
                        debug!(link = %link, reason = %reason, "Passing item through without torrent metadata");
                        status = ExtractStatus::PassedThrough { reason };
                    }
                }
            }
        }

        if let Some(hash) = item.info_hash.as_deref() {
            item.info_hash = Some(validate_info_hash(hash).inspect_err(|_| {
                EXTRACTION_ERRORS.with_label_values(&["magnet"]).inc();
            })?);
        }

        let raw_title = item.torrent_title.clone().or_else(|| item.torrent_name.clone());
        let mut parsed_seasons = Vec::new();
        if let Some(raw) = raw_title {
            let attrs = self.title_parser.parse(&raw).map_err(|e| {
                EXTRACTION_ERRORS.with_label_values(&["title"]).inc();
                warn!(title = %raw, error = %e, "Title parsing failed");
                e
            })?;
            parsed_seasons = attrs.seasons.clone();
            merge_title(&mut item, attrs);
        }

        if kind.has_episodes() && item.episode_files.is_none() {
            if let Some(files) = &item.files {
                let default_season = match parsed_seasons.as_slice() {
                    [single] => Some(*single),
                    _ => None,
                };
                let episodes = episode_files_from(files, default_season);
                if !episodes.is_empty() {
                    item.episode_files = Some(episodes);
                }
            }
        }

        Ok(Extraction { item, status })
    }

    /// Download and decode a torrent file. Errors are soft failures described as text.
    async fn download(&self, link: &str, referer: Option<&str>) -> Result<TorrentInfo, String> {
        let fetcher = self.fetcher.clone();
        let uri = link.to_string();
        let headers = referer_headers(referer);

        let response = self
            .cache
            .call(CacheKey::for_url(link), move || async move {
                let response = fetcher.fetch(&uri, &headers).await?;
                if !response.is_success() {
                    return Err(FetchError::Status(response.status));
                }
                Ok(response)
            })
            .await
            .map_err(|e| {
                EXTRACTION_ERRORS.with_label_values(&["fetch"]).inc();
                match e {
                    CacheError::Timeout { .. } => format!("torrent download timed out: {}", e),
                    CacheError::Upstream(e) => format!("torrent download failed: {}", e),
                }
            })?;

        if !response.has_content_type(TORRENT_CONTENT_TYPE) {
            EXTRACTION_ERRORS.with_label_values(&["content_type"]).inc();
            return Err(format!(
                "unexpected content type {}",
                response.content_type.as_deref().unwrap_or("<none>")
            ));
        }

        decode_torrent(&response.body).map_err(|e| {
            EXTRACTION_ERRORS.with_label_values(&["torrent"]).inc();
            e.to_string()
        })
    }
}

fn merge_magnet(item: &mut ScrapedItem, magnet: MagnetLink) {
    item.info_hash.get_or_insert(magnet.info_hash);
    if item.announce_list.as_ref().is_none_or(Vec::is_empty) && !magnet.trackers.is_empty() {
        item.announce_list = Some(magnet.trackers);
    }
    if item.torrent_name.is_none() {
        item.torrent_name = magnet.display_name;
    }
}

fn merge_torrent(item: &mut ScrapedItem, info: TorrentInfo) {
    match &item.info_hash {
        Some(existing) if !existing.eq_ignore_ascii_case(&info.info_hash) => {
            warn!(
                item_hash = %existing,
                torrent_hash = %info.info_hash,
                "Torrent file hash differs from supplied hash, keeping supplied"
            );
        }
        Some(_) => {}
        None => item.info_hash = Some(info.info_hash),
    }
    item.torrent_name.get_or_insert(info.name);
    if item.announce_list.as_ref().is_none_or(Vec::is_empty) && !info.announce_list.is_empty() {
        item.announce_list = Some(info.announce_list);
    }
    item.total_size.get_or_insert(info.total_size);
    item.files.get_or_insert(info.files);
}

fn merge_title(item: &mut ScrapedItem, attrs: TitleAttributes) {
    fn fill_list(slot: &mut Option<Vec<String>>, values: Vec<String>) {
        if slot.is_none() && !values.is_empty() {
            *slot = Some(values);
        }
    }

    if item.year.is_none() {
        item.year = attrs.year;
    }
    if item.resolution.is_none() {
        item.resolution = attrs.resolution;
    }
    if item.quality.is_none() {
        item.quality = attrs.quality;
    }
    if item.codec.is_none() {
        item.codec = attrs.codec;
    }
    fill_list(&mut item.audio, attrs.audio);
    fill_list(&mut item.hdr, attrs.hdr);
    fill_list(&mut item.languages, attrs.languages);
}
