//! Session markers of info hashes already seen by a scrape run.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::RwLock;
use tracing::{debug, info};

/// Named sets of info hashes observed during a scrape session.
///
/// Markers are advisory: scrapers use them to skip work they already did,
/// while the deduplication gate remains authoritative. After `close`,
/// marking is a no-op.
#[derive(Debug, Default)]
pub struct ScrapeMarkers {
    sets: RwLock<HashMap<String, HashSet<String>>>,
    closed: AtomicBool,
}

impl ScrapeMarkers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `info_hash` in `set_key`. Returns true if it was not there yet.
    pub async fn mark(&self, set_key: &str, info_hash: &str) -> bool {
        if self.closed.load(Ordering::Acquire) {
            debug!(set = %set_key, info_hash = %info_hash, "Marker set closed, ignoring");
            return false;
        }
        self.sets
            .write()
            .await
            .entry(set_key.to_string())
            .or_default()
            .insert(info_hash.to_ascii_lowercase())
    }

    pub async fn contains(&self, set_key: &str, info_hash: &str) -> bool {
        self.sets
            .read()
            .await
            .get(set_key)
            .is_some_and(|set| set.contains(&info_hash.to_ascii_lowercase()))
    }

    pub async fn len(&self, set_key: &str) -> usize {
        self.sets.read().await.get(set_key).map_or(0, HashSet::len)
    }

    /// Drop one set. Returns how many hashes it held.
    pub async fn clear(&self, set_key: &str) -> usize {
        self.sets
            .write()
            .await
            .remove(set_key)
            .map_or(0, |set| set.len())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Release all sets and stop accepting marks.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut sets = self.sets.write().await;
        let total: usize = sets.values().map(HashSet::len).sum();
        info!(sets = sets.len(), hashes = total, "Closing scrape markers");
        sets.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mark_reports_new_hashes() {
        let markers = ScrapeMarkers::new();
        assert!(markers.mark("tamil_blasters", "ABC").await);
        assert!(!markers.mark("tamil_blasters", "abc").await);
        assert!(markers.mark("other", "abc").await);

        assert!(markers.contains("tamil_blasters", "Abc").await);
        assert_eq!(markers.len("tamil_blasters").await, 1);
        assert_eq!(markers.len("missing").await, 0);
    }

    #[tokio::test]
    async fn test_clear_single_set() {
        let markers = ScrapeMarkers::new();
        markers.mark("a", "1").await;
        markers.mark("a", "2").await;
        markers.mark("b", "1").await;

        assert_eq!(markers.clear("a").await, 2);
        assert!(!markers.contains("a", "1").await);
        assert!(markers.contains("b", "1").await);
    }

    #[tokio::test]
    async fn test_close_stops_marking() {
        let markers = ScrapeMarkers::new();
        markers.mark("a", "1").await;
        markers.close().await;

        assert!(markers.is_closed());
        assert!(!markers.mark("a", "2").await);
        assert_eq!(markers.len("a").await, 0);

        // Closing twice is harmless.
        markers.close().await;
    }
}
