//! Key-value backends for the persisted tiers, ledger and drift history.

use crate::migration::run_migrations;
use chrono::Utc;
use phylactery_types::error::{PhylacteryError, PhylacteryResult};
use phylactery_types::storage::KeyValueStore;
use rusqlite::Connection;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Volatile store for tests and hosts that persist elsewhere.
#[derive(Debug, Default)]
pub struct InMemoryKvStore {
    data: Mutex<HashMap<String, String>>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for InMemoryKvStore {
    fn put(&self, key: &str, value: &str) -> PhylacteryResult<()> {
        self.data
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> PhylacteryResult<Option<String>> {
        Ok(self
            .data
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned())
    }

    fn delete(&self, key: &str) -> PhylacteryResult<()> {
        self.data
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
        Ok(())
    }
}

/// Durable store backed by a single SQLite table.
#[derive(Clone)]
pub struct SqliteKvStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteKvStore {
    /// Open (or create) the database at `path` and run migrations.
    pub fn open(path: &Path) -> PhylacteryResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path).map_err(|e| PhylacteryError::Storage(e.to_string()))?;
        Self::from_connection(conn)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> PhylacteryResult<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| PhylacteryError::Storage(e.to_string()))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> PhylacteryResult<Self> {
        run_migrations(&conn).map_err(|e| PhylacteryError::Storage(e.to_string()))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

impl KeyValueStore for SqliteKvStore {
    fn put(&self, key: &str, value: &str) -> PhylacteryResult<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| PhylacteryError::Internal(e.to_string()))?;
        conn.execute(
            "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = ?3",
            rusqlite::params![key, value, Utc::now().to_rfc3339()],
        )
        .map_err(|e| PhylacteryError::Storage(e.to_string()))?;
        Ok(())
    }

    fn get(&self, key: &str) -> PhylacteryResult<Option<String>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| PhylacteryError::Internal(e.to_string()))?;
        let result = conn.query_row(
            "SELECT value FROM kv_store WHERE key = ?1",
            rusqlite::params![key],
            |row| row.get::<_, String>(0),
        );
        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(PhylacteryError::Storage(e.to_string())),
        }
    }

    fn delete(&self, key: &str) -> PhylacteryResult<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| PhylacteryError::Internal(e.to_string()))?;
        conn.execute("DELETE FROM kv_store WHERE key = ?1", rusqlite::params![key])
            .map_err(|e| PhylacteryError::Storage(e.to_string()))?;
        Ok(())
    }
}
