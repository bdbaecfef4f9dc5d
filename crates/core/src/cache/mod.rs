//! Rate limited, single-flight caching of upstream fetches.

mod key;
mod rate_limited;
mod rate_limiter;

pub use key::CacheKey;
pub use rate_limited::{CacheError, RateLimitedCache};
pub use rate_limiter::{RateLimitStatus, RateLimiter, RateLimiterPool};
