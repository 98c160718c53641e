//! DuckDB-backed [`StateStorage`].
//!
//! All state lives in one `state` table keyed by storage key. Values are
//! JSON text. DuckDB calls are short and synchronous; the connection is
//! guarded by a std mutex the way the rest of the storage layer does it.

use crate::error::{StorageError, StorageResult};
use crate::StateStorage;
use async_trait::async_trait;
use chrono::Utc;
use duckdb::{params, Connection, OptionalExt};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::warn;

/// Persistent key/value state in a DuckDB database.
#[derive(Clone)]
pub struct DuckDbStorage {
    conn: Arc<Mutex<Connection>>,
}

impl DuckDbStorage {
    /// Opens or creates a state database at `path`.
    pub fn open(path: &Path, memory_limit: &str, threads: u32) -> StorageResult<Self> {
        let conn = connect(path, memory_limit, threads)?;
        initialize_state_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Opens an in-memory database (for testing).
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_state_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StorageError::Poisoned(e.to_string()))
    }

    /// Lists stored keys with the given prefix, oldest write first.
    pub fn keys_with_prefix(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT key FROM state WHERE starts_with(key, ?) ORDER BY updated_at")?;
        let keys = stmt
            .query_map(params![prefix], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(keys)
    }
}

/// `state.duckdb` -> `state.duckdb.wal`.
fn wal_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".wal");
    PathBuf::from(name)
}

/// Opens `path` with memory and thread caps. A WAL left behind by an
/// unclean shutdown can block the open; it is discarded once and the open
/// retried.
fn connect(path: &Path, memory_limit: &str, threads: u32) -> StorageResult<Connection> {
    let conn = match Connection::open(path) {
        Ok(conn) => conn,
        Err(err) => {
            let wal = wal_path(path);
            if !wal.exists() || std::fs::remove_file(&wal).is_err() {
                return Err(err.into());
            }
            warn!("[STORE] Discarded stale WAL {} after a failed open", wal.display());
            Connection::open(path)?
        }
    };
    conn.execute_batch(&format!(
        "PRAGMA memory_limit='{memory_limit}'; PRAGMA threads={threads};"
    ))?;
    Ok(conn)
}

fn initialize_state_schema(conn: &Connection) -> StorageResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS state (
            key VARCHAR PRIMARY KEY,
            value VARCHAR NOT NULL,
            updated_at BIGINT NOT NULL
        );",
    )?;
    Ok(())
}

#[async_trait]
impl StateStorage for DuckDbStorage {
    async fn get_json(&self, key: &str) -> StorageResult<Option<serde_json::Value>> {
        let raw: Option<String> = {
            let conn = self.conn()?;
            conn.query_row(
                "SELECT value FROM state WHERE key = ?",
                params![key],
                |row| row.get(0),
            )
            .optional()?
        };
        match raw {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    async fn save_json(&self, key: &str, value: serde_json::Value) -> StorageResult<()> {
        let text = serde_json::to_string(&value)?;
        let now = Utc::now().timestamp_millis();
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO state (key, value, updated_at) VALUES (?, ?, ?)",
            params![key, text, now],
        )?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM state WHERE key = ?", params![key])?;
        Ok(())
    }
}
