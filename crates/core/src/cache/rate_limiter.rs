//! Fixed-window rate limiter shared by every caller of one upstream.
//!
//! A window admits at most `calls` acquisitions. Callers beyond the limit
//! sleep until the window rolls over instead of failing.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::time::{Duration, Instant};
use tracing::trace;

use crate::metrics::RATE_LIMIT_WAITS;

/// Rate limit status for an upstream.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitStatus {
    pub calls_per_period: u32,
    pub period: Duration,
    pub calls_in_window: u32,
    pub next_window_in_ms: Option<u64>,
}

/// Counter for the current window.
#[derive(Debug)]
struct FixedWindow {
    capacity: u32,
    period: Duration,
    window_start: Instant,
    count: u32,
}

impl FixedWindow {
    fn new(capacity: u32, period: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            period,
            window_start: Instant::now(),
            count: 0,
        }
    }

    /// Take a slot in the current window, or return how long to wait.
    fn try_acquire(&mut self) -> Result<(), Duration> {
        self.roll();
        if self.count < self.capacity {
            self.count += 1;
            Ok(())
        } else {
            Err((self.window_start + self.period).saturating_duration_since(Instant::now()))
        }
    }

    fn roll(&mut self) {
        let now = Instant::now();
        if now.duration_since(self.window_start) >= self.period {
            self.window_start = now;
            self.count = 0;
        }
    }

    fn status(&mut self) -> RateLimitStatus {
        self.roll();
        RateLimitStatus {
            calls_per_period: self.capacity,
            period: self.period,
            calls_in_window: self.count,
            next_window_in_ms: if self.count < self.capacity {
                None
            } else {
                Some(
                    (self.window_start + self.period)
                        .saturating_duration_since(Instant::now())
                        .as_millis() as u64,
                )
            },
        }
    }
}

/// Rate limiter for a single upstream, shared across tasks.
#[derive(Debug)]
pub struct RateLimiter {
    name: String,
    window: Mutex<FixedWindow>,
}

impl RateLimiter {
    /// Allow `calls` acquisitions per `period`.
    pub fn new(name: impl Into<String>, calls: u32, period: Duration) -> Self {
        Self {
            name: name.into(),
            window: Mutex::new(FixedWindow::new(calls, period)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait until a slot is available in the current window and take it.
    pub async fn acquire(&self) {
        let mut waited = false;
        loop {
            let wait = {
                let mut window = self.window.lock().await;
                match window.try_acquire() {
                    Ok(()) => return,
                    Err(wait) => wait,
                }
            };
            if !waited {
                RATE_LIMIT_WAITS.with_label_values(&[&self.name]).inc();
                waited = true;
            }
            trace!(upstream = %self.name, wait_ms = wait.as_millis() as u64, "Rate limited, waiting");
            // A zero wait means the window ends now; yield so the next loop rolls it.
            if wait.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(wait).await;
            }
        }
    }

    /// Take a slot only if one is free right now.
    pub async fn try_acquire(&self) -> bool {
        self.window.lock().await.try_acquire().is_ok()
    }

    pub async fn status(&self) -> RateLimitStatus {
        self.window.lock().await.status()
    }
}

/// Pool of rate limiters, one per upstream scope.
///
/// Every scraper or provider instance that talks to the same upstream
/// should obtain its limiter here so the quota is shared.
pub struct RateLimiterPool {
    default_calls: u32,
    default_period: Duration,
    limiters: RwLock<HashMap<String, Arc<RateLimiter>>>,
}

impl RateLimiterPool {
    /// Create a pool whose limiters default to `calls` per `period`.
    pub fn new(calls: u32, period: Duration) -> Self {
        Self {
            default_calls: calls,
            default_period: period,
            limiters: RwLock::new(HashMap::new()),
        }
    }

    /// Get the limiter for `scope`, creating it with the pool defaults.
    pub async fn limiter(&self, scope: &str) -> Arc<RateLimiter> {
        if let Some(limiter) = self.limiters.read().await.get(scope) {
            return limiter.clone();
        }
        let mut limiters = self.limiters.write().await;
        limiters
            .entry(scope.to_string())
            .or_insert_with(|| {
                Arc::new(RateLimiter::new(scope, self.default_calls, self.default_period))
            })
            .clone()
    }

    /// Register a limiter for `scope` with its own quota, replacing any existing one.
    pub async fn configure(&self, scope: &str, calls: u32, period: Duration) -> Arc<RateLimiter> {
        let limiter = Arc::new(RateLimiter::new(scope, calls, period));
        self.limiters
            .write()
            .await
            .insert(scope.to_string(), limiter.clone());
        limiter
    }

    /// Get status of all upstreams.
    pub async fn all_status(&self) -> Vec<(String, RateLimitStatus)> {
        let limiters: Vec<_> = self
            .limiters
            .read()
            .await
            .iter()
            .map(|(name, l)| (name.clone(), l.clone()))
            .collect();
        let mut out = Vec::with_capacity(limiters.len());
        for (name, limiter) in limiters {
            out.push((name, limiter.status().await));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_window_admits_capacity_immediately() {
        let limiter = RateLimiter::new("test", 3, Duration::from_secs(1));
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert!(!limiter.try_acquire().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_waits_for_next_window() {
        let limiter = RateLimiter::new("test", 2, Duration::from_secs(1));
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_reports_window_usage() {
        let limiter = RateLimiter::new("test", 2, Duration::from_millis(500));
        assert_eq!(limiter.status().await.calls_in_window, 0);

        limiter.acquire().await;
        limiter.acquire().await;
        let status = limiter.status().await;
        assert_eq!(status.calls_in_window, 2);
        assert!(status.next_window_in_ms.is_some());

        tokio::time::advance(Duration::from_millis(500)).await;
        let status = limiter.status().await;
        assert_eq!(status.calls_in_window, 0);
        assert!(status.next_window_in_ms.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_capacity_is_clamped_to_one() {
        let limiter = RateLimiter::new("test", 0, Duration::from_secs(1));
        assert!(limiter.try_acquire().await);
        assert!(!limiter.try_acquire().await);
    }

    #[tokio::test]
    async fn test_pool_shares_limiter_per_scope() {
        let pool = RateLimiterPool::new(5, Duration::from_secs(1));
        let a = pool.limiter("torrentio").await;
        let b = pool.limiter("torrentio").await;
        let c = pool.limiter("mediafusion").await;

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(pool.all_status().await.len(), 2);
    }

    #[tokio::test]
    async fn test_pool_configure_overrides_quota() {
        let pool = RateLimiterPool::new(5, Duration::from_secs(1));
        pool.configure("slow", 1, Duration::from_secs(10)).await;

        let limiter = pool.limiter("slow").await;
        assert_eq!(limiter.status().await.calls_per_period, 1);
        assert!(limiter.try_acquire().await);
        assert!(!limiter.try_acquire().await);
    }
}
