use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One OHLCV bar as written to the shared cache by the data pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// Latest traded price for a symbol.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Quote {
    pub price: Decimal,
    #[serde(default)]
    pub volume: Option<Decimal>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Numeric market state handed to the advisor, plus a reference to a chart image.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarketSnapshot {
    pub symbol: String,
    pub timeframe: String,
    pub current_price: Decimal,
    /// Volume of the most recent bar.
    pub volume_24h: Decimal,
    /// Opaque handle to a rendered chart (a file path in practice).
    pub chart_reference: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl MarketSnapshot {
    /// Summarize a bar series. Returns `None` when there are no bars.
    pub fn from_bars(
        symbol: &str,
        timeframe: &str,
        bars: &[Bar],
        chart_reference: Option<String>,
    ) -> Option<Self> {
        let last = bars.last()?;
        Some(Self {
            symbol: symbol.to_string(),
            timeframe: timeframe.to_string(),
            current_price: last.close,
            volume_24h: last.volume,
            chart_reference,
            timestamp: last.timestamp,
        })
    }
}
