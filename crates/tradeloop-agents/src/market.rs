use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tradeloop_models::market::MarketSnapshot;
use tradeloop_store::CacheReader;
use tracing::debug;

use crate::error::MarketDataError;

/// Supplies market state to the workflow. Mockable for testing.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Symbol this source serves.
    fn symbol(&self) -> &str;

    /// Full snapshot for plan formulation.
    async fn snapshot(&self) -> Result<MarketSnapshot, MarketDataError>;

    /// Cheaper latest-price read for the monitor step.
    async fn current_price(&self, symbol: &str) -> Result<Decimal, MarketDataError>;
}

/// Market data read from the shared cache populated by the data pipeline.
pub struct CacheMarketData {
    cache: Arc<CacheReader>,
    symbol: String,
    timeframe: String,
    chart_reference: Option<String>,
}

impl CacheMarketData {
    pub fn new(
        cache: Arc<CacheReader>,
        symbol: impl Into<String>,
        timeframe: impl Into<String>,
        chart_reference: Option<String>,
    ) -> Self {
        Self {
            cache,
            symbol: symbol.into(),
            timeframe: timeframe.into(),
            chart_reference,
        }
    }
}

#[async_trait]
impl MarketDataSource for CacheMarketData {
    fn symbol(&self) -> &str {
        &self.symbol
    }

    async fn snapshot(&self) -> Result<MarketSnapshot, MarketDataError> {
        let bars = self.cache.bars(&self.symbol, &self.timeframe).await?;
        debug!(symbol = %self.symbol, timeframe = %self.timeframe, bars = bars.len(), "Read bars");

        MarketSnapshot::from_bars(
            &self.symbol,
            &self.timeframe,
            &bars,
            self.chart_reference.clone(),
        )
        .ok_or_else(|| {
            MarketDataError::DataUnavailable(format!(
                "no {} bars cached for {}",
                self.timeframe, self.symbol
            ))
        })
    }

    /// Quote first, then the close of the latest bar.
    async fn current_price(&self, symbol: &str) -> Result<Decimal, MarketDataError> {
        if let Some(quote) = self.cache.quote(symbol).await? {
            return Ok(quote.price);
        }

        self.cache
            .bars(symbol, &self.timeframe)
            .await?
            .last()
            .map(|bar| bar.close)
            .ok_or_else(|| MarketDataError::DataUnavailable(format!("no price cached for {symbol}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};
    use rust_decimal_macros::dec;
    use std::time::Duration;
    use tradeloop_models::cache_schema::CacheRow;
    use tradeloop_store::SqliteReader;

    const BARS: &str = r#"[
        {"timestamp": "2024-01-01T00:00:00Z", "open": "36000", "high": "36400", "low": "35900", "close": "36300", "volume": 1500},
        {"timestamp": "2024-01-01T01:00:00Z", "open": "36300", "high": "36600", "low": "36250", "close": "36500", "volume": 2000}
    ]"#;

    fn row(key: &str, value_json: &str) -> CacheRow {
        let now = Utc::now();
        CacheRow {
            key: key.to_string(),
            category: "market_data".to_string(),
            value_json: value_json.to_string(),
            source: "test".to_string(),
            symbol: Some("BTC/USDT".to_string()),
            created_at: now.to_rfc3339(),
            expires_at: (now + ChronoDuration::hours(1)).to_rfc3339(),
            updated_at: now.to_rfc3339(),
        }
    }

    fn source(rows: &[CacheRow]) -> CacheMarketData {
        let sqlite = SqliteReader::open_in_memory().unwrap();
        for r in rows {
            sqlite.insert(r).unwrap();
        }
        let cache = Arc::new(CacheReader::new(sqlite, 100, Duration::from_secs(60)));
        CacheMarketData::new(cache, "BTC/USDT", "1h", Some("charts/BTC_USDT_1h.png".to_string()))
    }

    #[tokio::test]
    async fn snapshot_from_cached_bars() {
        let market = source(&[row("bars:BTC/USDT:1h", BARS)]);
        let snapshot = market.snapshot().await.unwrap();
        assert_eq!(snapshot.symbol, "BTC/USDT");
        assert_eq!(snapshot.current_price, dec!(36500));
        assert_eq!(snapshot.volume_24h, dec!(2000));
        assert_eq!(
            snapshot.chart_reference.as_deref(),
            Some("charts/BTC_USDT_1h.png")
        );
    }

    #[tokio::test]
    async fn snapshot_without_bars_is_unavailable() {
        let market = source(&[]);
        assert!(matches!(
            market.snapshot().await,
            Err(MarketDataError::DataUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn current_price_prefers_quote() {
        let market = source(&[
            row("bars:BTC/USDT:1h", BARS),
            row("quote:BTC/USDT", r#"{"price": "36150"}"#),
        ]);
        assert_eq!(market.current_price("BTC/USDT").await.unwrap(), dec!(36150));
    }

    #[tokio::test]
    async fn current_price_falls_back_to_last_close() {
        let market = source(&[row("bars:BTC/USDT:1h", BARS)]);
        assert_eq!(market.current_price("BTC/USDT").await.unwrap(), dec!(36500));
    }

    #[tokio::test]
    async fn current_price_unavailable() {
        let market = source(&[]);
        assert!(market.current_price("BTC/USDT").await.is_err());
    }
}
