use std::sync::Mutex;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tradeloop_models::cache_schema::key_patterns;
use tradeloop_models::market::{Bar, Quote};

use crate::error::StoreError;
use crate::memory::MemoryCache;
use crate::sqlite::SqliteReader;

/// Read-through market cache: moka (hot) → SQLite (shared) → None.
///
/// SQLite hits are promoted to moka. SQLite access is synchronized via `Mutex`
/// since `rusqlite::Connection` is not `Sync`.
pub struct CacheReader {
    memory: MemoryCache,
    sqlite: Mutex<SqliteReader>,
}

impl CacheReader {
    pub fn new(sqlite: SqliteReader, max_capacity: u64, memory_ttl: Duration) -> Self {
        Self {
            memory: MemoryCache::new(max_capacity, memory_ttl),
            sqlite: Mutex::new(sqlite),
        }
    }

    /// Get a typed value by cache key.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        if let Some(json) = self.memory.get(key).await {
            return Ok(Some(serde_json::from_str(&json)?));
        }

        let value = {
            let sqlite = self
                .sqlite
                .lock()
                .map_err(|e| StoreError::Unavailable(format!("SQLite mutex poisoned: {e}")))?;
            sqlite.get_value(key)?
        };

        match value {
            Some(json) => {
                let parsed = serde_json::from_str(&json)?;
                self.memory.insert(key.to_string(), json).await;
                Ok(Some(parsed))
            }
            None => Ok(None),
        }
    }

    /// Bars for a symbol/timeframe, oldest first. Empty when nothing is cached.
    pub async fn bars(&self, symbol: &str, timeframe: &str) -> Result<Vec<Bar>, StoreError> {
        Ok(self
            .get::<Vec<Bar>>(&key_patterns::bars(symbol, timeframe))
            .await?
            .unwrap_or_default())
    }

    pub async fn quote(&self, symbol: &str) -> Result<Option<Quote>, StoreError> {
        self.get(&key_patterns::quote(symbol)).await
    }

    /// Number of entries in the hot moka cache.
    pub fn hot_cache_size(&self) -> u64 {
        self.memory.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};
    use rust_decimal_macros::dec;
    use tradeloop_models::cache_schema::CacheRow;

    fn make_row(key: &str, value_json: &str) -> CacheRow {
        let now = Utc::now();
        CacheRow {
            key: key.to_string(),
            category: "market_data".to_string(),
            value_json: value_json.to_string(),
            source: "test".to_string(),
            symbol: Some("BTC/USDT".to_string()),
            created_at: now.to_rfc3339(),
            expires_at: (now + ChronoDuration::seconds(300)).to_rfc3339(),
            updated_at: now.to_rfc3339(),
        }
    }

    fn setup_reader() -> CacheReader {
        let sqlite = SqliteReader::open_in_memory().unwrap();
        sqlite
            .insert(&make_row(
                "bars:BTC/USDT:1h",
                r#"[
                    {"timestamp": "2024-01-01T00:00:00Z", "open": "36000", "high": "36400", "low": "35900", "close": "36300", "volume": 1500},
                    {"timestamp": "2024-01-01T01:00:00Z", "open": "36300", "high": "36600", "low": "36250", "close": "36500", "volume": 2000}
                ]"#,
            ))
            .unwrap();
        sqlite
            .insert(&make_row(
                "quote:BTC/USDT",
                r#"{"price": "36510.5", "volume": 12}"#,
            ))
            .unwrap();
        CacheReader::new(sqlite, 100, Duration::from_secs(60))
    }

    #[tokio::test]
    async fn reads_bars_in_order() {
        let reader = setup_reader();
        let bars = reader.bars("BTC/USDT", "1h").await.unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[1].close, dec!(36500));
    }

    #[tokio::test]
    async fn missing_bars_are_empty() {
        let reader = setup_reader();
        assert!(reader.bars("BTC/USDT", "4h").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn quote_read_is_promoted_to_memory() {
        let reader = setup_reader();
        assert_eq!(reader.hot_cache_size(), 0);

        let quote = reader.quote("BTC/USDT").await.unwrap().unwrap();
        assert_eq!(quote.price, dec!(36510.5));
        assert!(reader.memory.get("quote:BTC/USDT").await.is_some());
    }

    #[tokio::test]
    async fn missing_quote_is_none() {
        let reader = setup_reader();
        assert!(reader.quote("ETH/USDT").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn malformed_value_is_an_error() {
        let sqlite = SqliteReader::open_in_memory().unwrap();
        sqlite
            .insert(&make_row("quote:BTC/USDT", r#"{"last": 1}"#))
            .unwrap();
        let reader = CacheReader::new(sqlite, 100, Duration::from_secs(60));

        let result = reader.quote("BTC/USDT").await;
        assert!(matches!(result, Err(StoreError::Json(_))));
    }
}
