use std::time::Duration;

use moka::future::Cache;

/// Short-lived hot cache for market cache reads.
///
/// The monitor step asks for the latest price every cycle; a few seconds of
/// TTL keeps repeated reads within one cycle off SQLite without serving
/// prices from a previous cycle.
pub struct MemoryCache {
    inner: Cache<String, String>,
}

impl MemoryCache {
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key).await
    }

    pub async fn insert(&self, key: String, value_json: String) {
        self.inner.insert(key, value_json).await;
    }

    pub async fn invalidate(&self, key: &str) {
        self.inner.invalidate(key).await;
    }

    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_and_get_quote() {
        let cache = MemoryCache::new(10, Duration::from_secs(60));
        cache
            .insert("quote:BTC/USDT".to_string(), r#"{"price":"36500"}"#.to_string())
            .await;

        assert_eq!(
            cache.get("quote:BTC/USDT").await.as_deref(),
            Some(r#"{"price":"36500"}"#)
        );
        assert_eq!(cache.get("quote:ETH/USDT").await, None);
    }

    #[tokio::test]
    async fn invalidate_drops_entry() {
        let cache = MemoryCache::new(10, Duration::from_secs(60));
        cache
            .insert("bars:BTC/USDT:1h".to_string(), "[]".to_string())
            .await;
        cache.invalidate("bars:BTC/USDT:1h").await;
        assert_eq!(cache.get("bars:BTC/USDT:1h").await, None);
    }

    #[tokio::test]
    async fn expires_after_ttl() {
        let cache = MemoryCache::new(10, Duration::from_millis(50));
        cache
            .insert("quote:BTC/USDT".to_string(), r#"{"price":"1"}"#.to_string())
            .await;
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(cache.get("quote:BTC/USDT").await, None);
    }
}
