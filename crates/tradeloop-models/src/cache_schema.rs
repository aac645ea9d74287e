/// Table the market data pipeline writes and the agent reads bars/quotes from.
///
/// ```sql
/// CREATE TABLE IF NOT EXISTS cache_entries (
///     key         TEXT PRIMARY KEY,
///     category    TEXT NOT NULL,
///     value_json  TEXT NOT NULL,
///     source      TEXT NOT NULL,
///     symbol      TEXT,
///     created_at  TEXT NOT NULL,
///     expires_at  TEXT NOT NULL,
///     updated_at  TEXT NOT NULL
/// );
/// ```
pub const CACHE_TABLE_DDL: &str = "\
CREATE TABLE IF NOT EXISTS cache_entries (
    key         TEXT PRIMARY KEY,
    category    TEXT NOT NULL,
    value_json  TEXT NOT NULL,
    source      TEXT NOT NULL,
    symbol      TEXT,
    created_at  TEXT NOT NULL,
    expires_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_cache_symbol ON cache_entries(symbol);
CREATE INDEX IF NOT EXISTS idx_cache_expires ON cache_entries(expires_at);
";

/// Agent memory, one JSON document per traded symbol.
pub const STATE_TABLE_DDL: &str = "\
CREATE TABLE IF NOT EXISTS agent_state (
    symbol      TEXT PRIMARY KEY,
    state_json  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);
";

/// Key conventions for market data in the shared cache.
///
/// - Bars: `bars:{symbol}:{timeframe}` (e.g., `bars:BTC/USDT:1h`)
/// - Latest quote: `quote:{symbol}` (e.g., `quote:BTC/USDT`)
pub mod key_patterns {
    pub fn bars(symbol: &str, timeframe: &str) -> String {
        format!("bars:{symbol}:{timeframe}")
    }

    pub fn quote(symbol: &str) -> String {
        format!("quote:{symbol}")
    }
}

/// A raw cache row as read from SQLite.
#[derive(Debug, Clone)]
pub struct CacheRow {
    pub key: String,
    pub category: String,
    pub value_json: String,
    pub source: String,
    pub symbol: Option<String>,
    pub created_at: String,
    pub expires_at: String,
    pub updated_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_pattern_bars() {
        assert_eq!(key_patterns::bars("BTC/USDT", "1h"), "bars:BTC/USDT:1h");
    }

    #[test]
    fn key_pattern_quote() {
        assert_eq!(key_patterns::quote("ETH/USDT"), "quote:ETH/USDT");
    }
}
