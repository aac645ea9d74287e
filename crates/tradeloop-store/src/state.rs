use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::Connection;
use tradeloop_models::agent_state::AgentState;
use tradeloop_models::cache_schema::STATE_TABLE_DDL;
use tracing::debug;

use crate::error::StoreError;

/// Durable home of the single `AgentState` record. Last write wins.
///
/// Callers guarantee a single writer per symbol; implementations do no
/// cross-invocation locking.
pub trait StateStore: Send + Sync {
    fn load(&self) -> Result<Option<AgentState>, StoreError>;
    fn save(&self, state: &AgentState) -> Result<(), StoreError>;
}

/// SQLite-backed store holding one JSON document per symbol.
pub struct SqliteStateStore {
    conn: Mutex<Connection>,
    symbol: String,
}

impl SqliteStateStore {
    /// Open (creating if needed) the state database in WAL mode.
    pub fn open(path: &str, symbol: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(STATE_TABLE_DDL)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Ok(Self {
            conn: Mutex::new(conn),
            symbol: symbol.to_string(),
        })
    }

    pub fn open_in_memory(symbol: &str) -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(STATE_TABLE_DDL)?;
        Ok(Self {
            conn: Mutex::new(conn),
            symbol: symbol.to_string(),
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("SQLite mutex poisoned: {e}")))
    }
}

impl StateStore for SqliteStateStore {
    fn load(&self) -> Result<Option<AgentState>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached("SELECT state_json FROM agent_state WHERE symbol = ?1")?;

        let json: String = match stmt.query_row(rusqlite::params![self.symbol], |row| row.get(0)) {
            Ok(json) => json,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(StoreError::Sqlite(e)),
        };

        Ok(Some(serde_json::from_str(&json)?))
    }

    fn save(&self, state: &AgentState) -> Result<(), StoreError> {
        let json = serde_json::to_string(state)?;
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO agent_state (symbol, state_json, updated_at) \
             VALUES (?1, ?2, ?3)",
            rusqlite::params![self.symbol, json, Utc::now().to_rfc3339()],
        )?;
        tx.commit()?;
        debug!(symbol = %self.symbol, "Agent state saved");
        Ok(())
    }
}

/// In-process store. Counts saves so tests can assert on checkpoints.
#[derive(Default)]
pub struct MemoryStateStore {
    state: Mutex<Option<AgentState>>,
    saves: AtomicUsize,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: AgentState) -> Self {
        Self {
            state: Mutex::new(Some(state)),
            saves: AtomicUsize::new(0),
        }
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self) -> Result<Option<AgentState>, StoreError> {
        let guard = self
            .state
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("state mutex poisoned: {e}")))?;
        Ok(guard.clone())
    }

    fn save(&self, state: &AgentState) -> Result<(), StoreError> {
        let mut guard = self
            .state
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("state mutex poisoned: {e}")))?;
        *guard = Some(state.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
