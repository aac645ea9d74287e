pub mod error;
pub mod memory;
pub mod reader;
pub mod sqlite;
pub mod state;

pub use error::StoreError;
pub use reader::CacheReader;
pub use sqlite::SqliteReader;
pub use state::{MemoryStateStore, SqliteStateStore, StateStore};
