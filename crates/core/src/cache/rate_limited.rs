//! TTL cache with single-flight and a shared rate limiter around an upstream fetch.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::time::{Duration, Instant};
use tracing::{debug, warn};

use super::{CacheKey, RateLimiter};
use crate::metrics::{CACHE_LOOKUPS, UPSTREAM_FETCHES};

/// Failure of a cached upstream call. Cloned to every waiter of a single-flight group.
#[derive(Debug, Clone, Error)]
pub enum CacheError<E> {
    #[error("upstream '{upstream}' timed out after {timeout_ms}ms")]
    Timeout { upstream: String, timeout_ms: u64 },

    #[error("{0}")]
    Upstream(E),
}

impl<E> CacheError<E> {
    /// The upstream's own error, if the call got that far.
    pub fn upstream(&self) -> Option<&E> {
        match self {
            CacheError::Upstream(e) => Some(e),
            CacheError::Timeout { .. } => None,
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

type SharedFetch<V, E> = Shared<BoxFuture<'static, Result<V, CacheError<E>>>>;

struct Inner<V, E> {
    name: String,
    ttl: Duration,
    timeout: Duration,
    limiter: Arc<RateLimiter>,
    entries: Mutex<HashMap<CacheKey, CacheEntry<V>>>,
    in_flight: Mutex<HashMap<CacheKey, SharedFetch<V, E>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<V: Clone, E> Inner<V, E> {
    fn lookup(&self, key: &CacheKey) -> Option<V> {
        let mut entries = lock(&self.entries);
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Store a successful result and retire the single-flight group.
    fn complete(&self, key: &CacheKey, result: &Result<V, CacheError<E>>) {
        let mut in_flight = lock(&self.in_flight);
        if let Ok(value) = result {
            lock(&self.entries).insert(
                key.clone(),
                CacheEntry {
                    value: value.clone(),
                    expires_at: Instant::now() + self.ttl,
                },
            );
        }
        in_flight.remove(key);
    }
}

/// Wraps an upstream fetch with a TTL cache, single-flight coalescing and a
/// rate limiter.
///
/// Cloning is cheap and clones share all state. Failures are never cached so
/// the next call retries immediately.
pub struct RateLimitedCache<V, E> {
    inner: Arc<Inner<V, E>>,
}

impl<V, E> Clone for RateLimitedCache<V, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<V, E> RateLimitedCache<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Create a cache for the upstream served by `limiter`.
    ///
    /// `timeout` bounds each upstream call; rate limiter waits do not count
    /// against it.
    pub fn new(
        name: impl Into<String>,
        ttl: Duration,
        timeout: Duration,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                ttl,
                timeout,
                limiter,
                entries: Mutex::new(HashMap::new()),
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Return the cached value for `key`, or run `fetch` once for all
    /// concurrent callers sharing `key`.
    pub async fn call<F, Fut>(&self, key: CacheKey, fetch: F) -> Result<V, CacheError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        if let Some(value) = self.inner.lookup(&key) {
            CACHE_LOOKUPS
                .with_label_values(&[&self.inner.name, "hit"])
                .inc();
            return Ok(value);
        }

        let shared = {
            let mut in_flight = lock(&self.inner.in_flight);
            // The leader may have finished between the lookup above and taking the lock.
            if let Some(value) = self.inner.lookup(&key) {
                CACHE_LOOKUPS
                    .with_label_values(&[&self.inner.name, "hit"])
                    .inc();
                return Ok(value);
            }
            match in_flight.get(&key) {
                Some(existing) => {
                    CACHE_LOOKUPS
                        .with_label_values(&[&self.inner.name, "coalesced"])
                        .inc();
                    existing.clone()
                }
                None => {
                    CACHE_LOOKUPS
                        .with_label_values(&[&self.inner.name, "miss"])
                        .inc();
                    let fut = Self::run(self.inner.clone(), key.clone(), fetch())
                        .boxed()
                        .shared();
                    in_flight.insert(key, fut.clone());
                    fut
                }
            }
        };

        shared.await
    }

    async fn run<Fut>(inner: Arc<Inner<V, E>>, key: CacheKey, fetch: Fut) -> Result<V, CacheError<E>>
    where
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        inner.limiter.acquire().await;

        let result = match tokio::time::timeout(inner.timeout, fetch).await {
            Ok(Ok(value)) => {
                UPSTREAM_FETCHES
                    .with_label_values(&[&inner.name, "success"])
                    .inc();
                Ok(value)
            }
            Ok(Err(e)) => {
                UPSTREAM_FETCHES
                    .with_label_values(&[&inner.name, "error"])
                    .inc();
                debug!(upstream = %inner.name, key = %key, "Upstream fetch failed");
                Err(CacheError::Upstream(e))
            }
            Err(_) => {
                UPSTREAM_FETCHES
                    .with_label_values(&[&inner.name, "timeout"])
                    .inc();
                warn!(
                    upstream = %inner.name,
                    key = %key,
                    timeout_ms = inner.timeout.as_millis() as u64,
                    "Upstream fetch timed out"
                );
                Err(CacheError::Timeout {
                    upstream: inner.name.clone(),
                    timeout_ms: inner.timeout.as_millis() as u64,
                })
            }
        };

        inner.complete(&key, &result);
        result
    }

    /// Cached value for `key` without touching the upstream.
    pub fn peek(&self, key: &CacheKey) -> Option<V> {
        self.inner.lookup(key)
    }

    /// Drop the cached value for `key`.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        lock(&self.inner.entries).remove(key).is_some()
    }

    /// Remove expired entries. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = lock(&self.inner.entries);
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    /// Number of stored entries, including ones that expired but were not purged yet.
    pub fn len(&self) -> usize {
        lock(&self.inner.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn cache(ttl: Duration) -> RateLimitedCache<String, String> {
        let limiter = Arc::new(RateLimiter::new("test", 100, Duration::from_secs(1)));
        RateLimitedCache::new("test", ttl, Duration::from_secs(5), limiter)
    }

    #[tokio::test(start_paused = true)]
    async fn test_cached_value_reused_within_ttl() {
        let cache = cache(Duration::from_secs(60));
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let calls = calls.clone();
            let value = cache
                .call(CacheKey::for_url("a"), move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>("value".to_string())
                })
                .await
                .unwrap();
            assert_eq!(value, "value");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_refetched() {
        let cache = cache(Duration::from_secs(10));
        let calls = Arc::new(AtomicUsize::new(0));

        let fetch = |calls: Arc<AtomicUsize>| {
            move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(format!("v{}", n))
            }
        };

        let first = cache
            .call(CacheKey::for_url("a"), fetch(calls.clone()))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(11)).await;
        let second = cache
            .call(CacheKey::for_url("a"), fetch(calls.clone()))
            .await
            .unwrap();

        assert_eq!(first, "v0");
        assert_eq!(second, "v1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_are_not_cached() {
        let cache = cache(Duration::from_secs(60));

        let err = cache
            .call(CacheKey::for_url("a"), || async {
                Err::<String, _>("boom".to_string())
            })
            .await
            .unwrap_err();
        assert_eq!(err.upstream().map(String::as_str), Some("boom"));
        assert!(cache.is_empty());

        let ok = cache
            .call(CacheKey::for_url("a"), || async { Ok::<_, String>("ok".to_string()) })
            .await
            .unwrap();
        assert_eq!(ok, "ok");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_reported() {
        let cache = cache(Duration::from_secs(60));

        let err = cache
            .call(CacheKey::for_url("slow"), || async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok::<_, String>("late".to_string())
            })
            .await
            .unwrap_err();

        assert!(matches!(err, CacheError::Timeout { .. }));
        assert!(cache.peek(&CacheKey::for_url("slow")).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_and_invalidate() {
        let cache = cache(Duration::from_secs(5));
        for url in ["a", "b"] {
            cache
                .call(CacheKey::for_url(url), || async { Ok::<_, String>("x".to_string()) })
                .await
                .unwrap();
        }
        assert_eq!(cache.len(), 2);

        assert!(cache.invalidate(&CacheKey::for_url("a")));
        assert!(!cache.invalidate(&CacheKey::for_url("a")));

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(cache.purge_expired(), 1);
        assert!(cache.is_empty());
    }
}
