use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Cache key derived from the fields that identify an upstream request.
///
/// Keys are SHA-256 digests so arbitrarily long URLs or composite request
/// descriptions all map to a fixed-size key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    /// Key for a plain URL fetch.
    pub fn for_url(url: &str) -> Self {
        Self::from_parts(&[("url", url)])
    }

    /// Key for a stream lookup request.
    ///
    /// `requester_class` separates callers that must not share results,
    /// e.g. different debrid services for the same media.
    pub fn for_request(
        media_id: &str,
        season: Option<u32>,
        episode: Option<u32>,
        requester_class: &str,
    ) -> Self {
        let season = season.map(|s| s.to_string()).unwrap_or_default();
        let episode = episode.map(|e| e.to_string()).unwrap_or_default();
        Self::from_parts(&[
            ("media_id", media_id),
            ("season", &season),
            ("episode", &episode),
            ("requester", requester_class),
        ])
    }

    /// Hash named parts in order. Names are included so that
    /// `("a", "bc")` and `("ab", "c")` never collide.
    pub fn from_parts(parts: &[(&str, &str)]) -> Self {
        let mut hasher = Sha256::new();
        for (name, value) in parts {
            hasher.update((name.len() as u64).to_le_bytes());
            hasher.update(name.as_bytes());
            hasher.update((value.len() as u64).to_le_bytes());
            hasher.update(value.as_bytes());
        }
        let digest = hasher.finalize();
        Self(digest.iter().map(|b| format!("{:02x}", b)).collect())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_hex_digest() {
        let key = CacheKey::for_url("https://example.com/a.torrent");
        assert_eq!(key.as_str().len(), 64);
        assert!(key.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_same_request_same_key() {
        let a = CacheKey::for_request("tt0944947", Some(1), Some(2), "realdebrid");
        let b = CacheKey::for_request("tt0944947", Some(1), Some(2), "realdebrid");
        assert_eq!(a, b);
    }

    #[test]
    fn test_request_fields_are_distinguished() {
        let base = CacheKey::for_request("tt0944947", Some(1), Some(2), "realdebrid");
        assert_ne!(base, CacheKey::for_request("tt0944947", Some(1), Some(3), "realdebrid"));
        assert_ne!(base, CacheKey::for_request("tt0944947", Some(12), None, "realdebrid"));
        assert_ne!(base, CacheKey::for_request("tt0944947", Some(1), Some(2), "alldebrid"));
    }

    #[test]
    fn test_part_boundaries_do_not_collide() {
        assert_ne!(
            CacheKey::from_parts(&[("a", "bc")]),
            CacheKey::from_parts(&[("ab", "c")])
        );
    }
}
