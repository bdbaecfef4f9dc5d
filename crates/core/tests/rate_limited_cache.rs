//! Rate limiting and single-flight behaviour of the upstream cache.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::time::Instant;

use streamvault_core::cache::{CacheKey, RateLimitedCache, RateLimiter, RateLimiterPool};

fn cache(limiter: Arc<RateLimiter>) -> RateLimitedCache<String, String> {
    RateLimitedCache::new("upstream", Duration::from_secs(300), Duration::from_secs(10), limiter)
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_distinct_keys_respect_rate_limit() {
    let limiter = Arc::new(RateLimiter::new("upstream", 5, Duration::from_secs(1)));
    let cache = cache(limiter);
    let start = Instant::now();

    let calls = (0..20).map(|i| {
        let cache = cache.clone();
        async move {
            cache
                .call(CacheKey::for_url(&format!("https://upstream/{}", i)), move || async move {
                    Ok::<_, String>(format!("value-{}", i))
                })
                .await
        }
    });
    let results = join_all(calls).await;

    assert!(results.iter().all(Result::is_ok));
    assert!(
        start.elapsed() >= Duration::from_secs(3),
        "20 calls at 5/s finished in {:?}",
        start.elapsed()
    );
}

#[tokio::test(start_paused = true)]
async fn test_identical_keys_share_one_fetch() {
    let limiter = Arc::new(RateLimiter::new("upstream", 5, Duration::from_secs(1)));
    let cache = cache(limiter);
    let fetches = Arc::new(AtomicUsize::new(0));

    let calls = (0..10).map(|_| {
        let cache = cache.clone();
        let fetches = fetches.clone();
        async move {
            cache
                .call(CacheKey::for_request("tt123", Some(1), Some(2), "anon"), move || async move {
                    fetches.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    Ok::<_, String>("shared".to_string())
                })
                .await
        }
    });
    let results = join_all(calls).await;

    assert_eq!(fetches.load(Ordering::SeqCst), 1);
    assert!(results.iter().all(|r| matches!(r.as_deref(), Ok("shared"))));
}

#[tokio::test(start_paused = true)]
async fn test_failure_is_shared_then_retried() {
    let limiter = Arc::new(RateLimiter::new("upstream", 5, Duration::from_secs(1)));
    let cache = cache(limiter);
    let fetches = Arc::new(AtomicUsize::new(0));
    let key = CacheKey::for_url("https://upstream/flaky");

    let calls = (0..3).map(|_| {
        let cache = cache.clone();
        let fetches = fetches.clone();
        let key = key.clone();
        async move {
            cache
                .call(key, move || async move {
                    fetches.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Err::<String, _>("unavailable".to_string())
                })
                .await
        }
    });
    let results = join_all(calls).await;
    assert!(results.iter().all(Result::is_err));
    assert_eq!(fetches.load(Ordering::SeqCst), 1);

    let retried = cache
        .call(key, || async { Ok::<_, String>("recovered".to_string()) })
        .await
        .unwrap();
    assert_eq!(retried, "recovered");
}

#[tokio::test(start_paused = true)]
async fn test_pool_shares_quota_per_scope() {
    let pool = RateLimiterPool::new(2, Duration::from_secs(1));
    let a = pool.limiter("scraper-a").await;
    let a_again = pool.limiter("scraper-a").await;
    let b = pool.limiter("scraper-b").await;

    assert!(a.try_acquire().await);
    assert!(a_again.try_acquire().await);
    assert!(!a.try_acquire().await);
    assert!(b.try_acquire().await);
}
