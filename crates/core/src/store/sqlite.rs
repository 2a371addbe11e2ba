// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use super::{Store, StoreError, StoreFuture, StoreResult};

/// SQL schema for the key/value table.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

/// SQLite-backed store, the preferred high-capacity backend.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    quota: Option<u64>,
}

impl SqliteStore {
    /// Open a database at the given path, creating it if needed.
    pub fn open(path: &Path, quota: Option<u64>) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        conn.execute_batch(SCHEMA)?;

        Ok(SqliteStore {
            conn: Mutex::new(conn),
            quota,
        })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory(quota: Option<u64>) -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(SqliteStore {
            conn: Mutex::new(conn),
            quota,
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self, entries: Vec<(String, Value)>) -> StoreResult<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            )?;
            for (key, value) in &entries {
                stmt.execute(params![key, value.to_string(), now])?;
            }
        }

        if let Some(limit) = self.quota {
            let size: i64 = tx.query_row(
                "SELECT COALESCE(SUM(LENGTH(key) + LENGTH(value)), 0) FROM kv",
                [],
                |row| row.get(0),
            )?;
            if size as u64 > limit {
                // Dropping the transaction rolls the batch back.
                return Err(StoreError::CapacityExceeded(format!(
                    "{size} bytes exceeds quota of {limit}"
                )));
            }
        }

        tx.commit()?;
        Ok(())
    }
}

impl Store for SqliteStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<Value>> {
        Box::pin(async move {
            let raw: Option<String> = self
                .lock()
                .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| {
                    row.get(0)
                })
                .optional()?;
            match raw {
                Some(text) => Ok(Some(serde_json::from_str(&text)?)),
                None => Ok(None),
            }
        })
    }

    fn set_many(&self, entries: Vec<(String, Value)>) -> StoreFuture<'_, ()> {
        Box::pin(async move { self.write(entries) })
    }

    fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.lock().execute("DELETE FROM kv WHERE key = ?1", [key])?;
            Ok(())
        })
    }

    fn list_keys(&self) -> StoreFuture<'_, Vec<String>> {
        Box::pin(async move {
            let conn = self.lock();
            let mut stmt = conn.prepare("SELECT key FROM kv ORDER BY key")?;
            let keys = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(keys)
        })
    }

    fn clear(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.lock().execute("DELETE FROM kv", [])?;
            Ok(())
        })
    }
}
