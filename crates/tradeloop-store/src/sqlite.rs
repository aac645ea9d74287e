use chrono::Utc;
use rusqlite::Connection;
use tradeloop_models::cache_schema::{CacheRow, CACHE_TABLE_DDL};

use crate::error::StoreError;

/// Read-only accessor for the shared market data cache.
///
/// The data pipeline owns writes; the agent only ever reads bars and quotes.
pub struct SqliteReader {
    conn: Connection,
}

impl SqliteReader {
    /// Open a read-only connection to the shared cache database.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self { conn })
    }

    /// Open a writable in-memory database with the schema applied, for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(CACHE_TABLE_DDL)?;
        Ok(Self { conn })
    }

    /// Get the value JSON for a key. Expired rows read as missing.
    pub fn get_value(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Utc::now().to_rfc3339();
        let mut stmt = self.conn.prepare_cached(
            "SELECT value_json FROM cache_entries WHERE key = ?1 AND expires_at > ?2",
        )?;

        match stmt.query_row(rusqlite::params![key, now], |row| row.get(0)) {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Sqlite(e)),
        }
    }

    /// Seed a cache row. Used by tests and local tooling; production rows come
    /// from the data pipeline.
    pub fn insert(&self, row: &CacheRow) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO cache_entries \
             (key, category, value_json, source, symbol, created_at, expires_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                row.key,
                row.category,
                row.value_json,
                row.source,
                row.symbol,
                row.created_at,
                row.expires_at,
                row.updated_at,
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn make_row(key: &str, value_json: &str, ttl_seconds: i64) -> CacheRow {
        let now = Utc::now();
        CacheRow {
            key: key.to_string(),
            category: "market_data".to_string(),
            value_json: value_json.to_string(),
            source: "test".to_string(),
            symbol: Some("BTC/USDT".to_string()),
            created_at: now.to_rfc3339(),
            expires_at: (now + Duration::seconds(ttl_seconds)).to_rfc3339(),
            updated_at: now.to_rfc3339(),
        }
    }

    #[test]
    fn get_existing_key() {
        let reader = SqliteReader::open_in_memory().unwrap();
        reader
            .insert(&make_row("quote:BTC/USDT", r#"{"price": "36500"}"#, 300))
            .unwrap();

        let value = reader.get_value("quote:BTC/USDT").unwrap();
        assert_eq!(value.as_deref(), Some(r#"{"price": "36500"}"#));
    }

    #[test]
    fn get_missing_key() {
        let reader = SqliteReader::open_in_memory().unwrap();
        assert!(reader.get_value("quote:ETH/USDT").unwrap().is_none());
    }

    #[test]
    fn expired_rows_read_as_missing() {
        let reader = SqliteReader::open_in_memory().unwrap();
        reader
            .insert(&make_row("quote:BTC/USDT", r#"{"price": "36500"}"#, -10))
            .unwrap();
        assert!(reader.get_value("quote:BTC/USDT").unwrap().is_none());
    }

    #[test]
    fn insert_replaces_existing_key() {
        let reader = SqliteReader::open_in_memory().unwrap();
        reader
            .insert(&make_row("quote:BTC/USDT", r#"{"price": "36500"}"#, 300))
            .unwrap();
        reader
            .insert(&make_row("quote:BTC/USDT", r#"{"price": "36150"}"#, 300))
            .unwrap();

        let value = reader.get_value("quote:BTC/USDT").unwrap().unwrap();
        assert!(value.contains("36150"));
    }
}
