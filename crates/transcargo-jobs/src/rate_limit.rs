//! Global ceiling on article-generation calls per rolling minute.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use transcargo_core::{Error, Result};
use transcargo_store::Cache;

#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Take one permit, or fail with [`Error::RateLimited`].
    async fn acquire(&self) -> Result<()>;
}

/// Fixed one-minute windows counted in the shared cache, so every worker
/// process draws from the same budget. When the cache errors the limiter keeps
/// counting in-process.
pub struct WindowRateLimiter {
    cache: Arc<dyn Cache>,
    key_prefix: String,
    max_per_window: u32,
    local: Mutex<LocalWindow>,
}

#[derive(Default)]
struct LocalWindow {
    window: i64,
    count: i64,
}

impl WindowRateLimiter {
    pub fn new(cache: Arc<dyn Cache>, max_per_minute: u32) -> Self {
        Self {
            cache,
            key_prefix: "openai:requests".to_string(),
            max_per_window: max_per_minute,
            local: Mutex::new(LocalWindow::default()),
        }
    }

    async fn acquire_in(&self, window: i64) -> Result<()> {
        let key = format!("{}:{}", self.key_prefix, window);
        let count = match self.cache.incr(&key, Duration::from_secs(60)) {
            Ok(count) => count,
            Err(e) => {
                warn!("Shared rate-limit counter unavailable, counting locally: {}", e);
                let mut local = self.local.lock().await;
                if local.window != window {
                    local.window = window;
                    local.count = 0;
                }
                local.count += 1;
                local.count
            }
        };

        if count > i64::from(self.max_per_window) {
            return Err(Error::RateLimited(format!(
                "{} generation requests per minute",
                self.max_per_window
            )));
        }
        debug!("Generation permit {}/{} in window {}", count, self.max_per_window, window);
        Ok(())
    }
}

#[async_trait]
impl RateLimiter for WindowRateLimiter {
    async fn acquire(&self) -> Result<()> {
        self.acquire_in(Utc::now().timestamp().div_euclid(60)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use transcargo_store::MemoryCache;

    struct BrokenCache;

    impl Cache for BrokenCache {
        fn get_json(&self, _key: &str) -> Result<Option<serde_json::Value>> {
            Err(Error::StoreUnavailable("down".into()))
        }
        fn set_json(&self, _key: &str, _value: &serde_json::Value, _ttl: Duration) -> Result<()> {
            Err(Error::StoreUnavailable("down".into()))
        }
        fn delete(&self, _key: &str) -> Result<()> {
            Err(Error::StoreUnavailable("down".into()))
        }
        fn incr(&self, _key: &str, _ttl: Duration) -> Result<i64> {
            Err(Error::StoreUnavailable("down".into()))
        }
    }

    #[tokio::test]
    async fn test_window_ceiling() {
        let limiter = WindowRateLimiter::new(Arc::new(MemoryCache::default()), 3);
        for _ in 0..3 {
            limiter.acquire_in(100).await.unwrap();
        }
        let err = limiter.acquire_in(100).await.unwrap_err();
        assert!(matches!(err, Error::RateLimited(_)));
        assert!(err.is_retryable());
        // The next minute starts a fresh budget.
        limiter.acquire_in(101).await.unwrap();
    }

    #[tokio::test]
    async fn test_budget_is_shared_through_cache() {
        let cache: Arc<dyn Cache> = Arc::new(MemoryCache::default());
        let a = WindowRateLimiter::new(cache.clone(), 3);
        let b = WindowRateLimiter::new(cache.clone(), 3);
        a.acquire_in(7).await.unwrap();
        b.acquire_in(7).await.unwrap();
        a.acquire_in(7).await.unwrap();
        assert!(b.acquire_in(7).await.is_err());
        assert_eq!(
            cache.get_json("openai:requests:7").unwrap(),
            Some(serde_json::json!(4))
        );
    }

    #[tokio::test]
    async fn test_local_fallback_still_limits() {
        let limiter = WindowRateLimiter::new(Arc::new(BrokenCache), 2);
        limiter.acquire_in(5).await.unwrap();
        limiter.acquire_in(5).await.unwrap();
        assert!(limiter.acquire_in(5).await.is_err());
        limiter.acquire_in(6).await.unwrap();
    }

    #[tokio::test]
    async fn test_acquire_uses_current_window() {
        let limiter = WindowRateLimiter::new(Arc::new(MemoryCache::default()), 1);
        limiter.acquire().await.unwrap();
    }
}
