use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use rusqlite::Connection;
use serde_json::Value;
use thiserror::Error;

/// Storage key holding the whole hub cache snapshot.
const SNAPSHOT_KEY: &str = "hub_cache";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage quota exceeded: {0}")]
    Quota(String),

    #[error("storage error: {0}")]
    Other(String),
}

impl StoreError {
    pub fn is_quota(&self) -> bool {
        matches!(self, StoreError::Quota(_))
    }
}

/// Single-key snapshot persistence for the hub cache.
pub trait SnapshotStore: Send + Sync {
    fn load(&self) -> Result<Option<Value>, StoreError>;
    fn save(&self, snapshot: &Value) -> Result<(), StoreError>;
}

/// SQLite-backed store: one row in a kv table.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(map_sqlite)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(map_sqlite)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
            [],
        )
        .map_err(map_sqlite)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl SnapshotStore for SqliteStore {
    fn load(&self) -> Result<Option<Value>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let raw: Option<String> = match conn.query_row(
            "SELECT value FROM kv WHERE key = ?1",
            [SNAPSHOT_KEY],
            |row| row.get(0),
        ) {
            Ok(v) => Some(v),
            Err(rusqlite::Error::QueryReturnedNoRows) => None,
            Err(e) => return Err(map_sqlite(e)),
        };
        match raw {
            Some(text) => serde_json::from_str(&text)
                .map(Some)
                .map_err(|e| StoreError::Other(e.to_string())),
            None => Ok(None),
        }
    }

    fn save(&self, snapshot: &Value) -> Result<(), StoreError> {
        let text =
            serde_json::to_string(snapshot).map_err(|e| StoreError::Other(e.to_string()))?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            rusqlite::params![SNAPSHOT_KEY, text],
        )
        .map_err(map_sqlite)?;
        Ok(())
    }
}

fn map_sqlite(e: rusqlite::Error) -> StoreError {
    match &e {
        rusqlite::Error::SqliteFailure(inner, _)
            if inner.code == rusqlite::ErrorCode::DiskFull =>
        {
            StoreError::Quota(e.to_string())
        }
        _ => StoreError::Other(e.to_string()),
    }
}

/// In-memory store with configurable quota limits, for tests and headless
/// runs. Counts write attempts so shedding behavior is observable.
#[derive(Default)]
pub struct MemoryStore {
    value: Mutex<Option<Value>>,
    /// Reject snapshots whose serialized size exceeds this many bytes.
    pub max_bytes: Option<usize>,
    /// Reject snapshots carrying more than this many records.
    pub max_records: Option<usize>,
    write_attempts: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_records(max_records: usize) -> Self {
        Self {
            max_records: Some(max_records),
            ..Self::default()
        }
    }

    pub fn with_max_bytes(max_bytes: usize) -> Self {
        Self {
            max_bytes: Some(max_bytes),
            ..Self::default()
        }
    }

    pub fn write_attempts(&self) -> u64 {
        self.write_attempts.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> Option<Value> {
        self.value.lock().unwrap().clone()
    }
}

impl SnapshotStore for MemoryStore {
    fn load(&self) -> Result<Option<Value>, StoreError> {
        Ok(self.value.lock().unwrap().clone())
    }

    fn save(&self, snapshot: &Value) -> Result<(), StoreError> {
        self.write_attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(max) = self.max_records {
            let count = snapshot
                .get("records")
                .and_then(Value::as_array)
                .map(Vec::len)
                .unwrap_or(0);
            if count > max {
                return Err(StoreError::Quota(format!("{count} records > {max}")));
            }
        }
        if let Some(max) = self.max_bytes {
            let size = snapshot.to_string().len();
            if size > max {
                return Err(StoreError::Quota(format!("{size} bytes > {max}")));
            }
        }
        *self.value.lock().unwrap() = Some(snapshot.clone());
        Ok(())
    }
}
