// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Key/value persistence for the queue.
//!
//! Every backend implements [`Store`]. [`DurableStore`] picks the backend at
//! start-up (SQLite when it opens, the JSON file otherwise) and handles the
//! capacity-exceeded retry.
//!
//! Values are JSON documents. Writes that must land together (a category
//! counter and the ticket it numbered) go through [`Store::set_many`], which
//! every backend applies atomically.

mod durable;
mod file;
mod memory;
mod sqlite;

pub use durable::{CapacityPolicy, DurableStore};
pub use file::FileStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Error type for store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backend is full. Triggers the capacity policy before one retry.
    #[error("store capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// Any other backend failure.
    #[error("store failure: {0}")]
    Backend(String),

    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_capacity(&self) -> bool {
        matches!(self, StoreError::CapacityExceeded(_))
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        match e.sqlite_error_code() {
            Some(rusqlite::ErrorCode::DiskFull) => StoreError::CapacityExceeded(e.to_string()),
            _ => StoreError::Backend(e.to_string()),
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::StorageFull {
            StoreError::CapacityExceeded(e.to_string())
        } else {
            StoreError::Backend(e.to_string())
        }
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Boxed future returned by store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = StoreResult<T>> + Send + 'a>>;

/// Asynchronous key/value store.
pub trait Store: Send + Sync {
    /// Short backend name for logs.
    fn backend(&self) -> &'static str;

    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<Value>>;

    /// Writes all entries or none of them.
    fn set_many(&self, entries: Vec<(String, Value)>) -> StoreFuture<'_, ()>;

    fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()>;

    fn list_keys(&self) -> StoreFuture<'_, Vec<String>>;

    fn clear(&self) -> StoreFuture<'_, ()>;

    fn set<'a>(&'a self, key: &'a str, value: Value) -> StoreFuture<'a, ()> {
        self.set_many(vec![(key.to_string(), value)])
    }
}

/// Which backend [`DurableStore::open`] should use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// SQLite, falling back to the JSON file if SQLite cannot be opened.
    #[default]
    Auto,
    Sqlite,
    File,
    Memory,
}

/// Store configuration (the `[store]` table of the client config).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: BackendKind,
    /// Upper bound on stored bytes. 0 means unlimited.
    #[serde(default)]
    pub quota_bytes: u64,
}

impl StoreConfig {
    pub fn quota(&self) -> Option<u64> {
        (self.quota_bytes > 0).then_some(self.quota_bytes)
    }
}

/// Reads a key and decodes it, reporting undecodable values as corrupted.
pub async fn read_json<T: DeserializeOwned>(
    store: &dyn Store,
    key: &str,
) -> crate::Result<Option<T>> {
    match store.get(key).await? {
        None => Ok(None),
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| crate::Error::CorruptedData(format!("key '{key}': {e}"))),
    }
}

/// Encodes a value for [`Store::set`].
pub fn to_value<T: Serialize>(value: &T) -> StoreResult<Value> {
    Ok(serde_json::to_value(value)?)
}

/// Approximate stored size of a key/value document, used for quotas.
pub(crate) fn document_size(map: &BTreeMap<String, Value>) -> u64 {
    map.iter()
        .map(|(k, v)| (k.len() + v.to_string().len()) as u64)
        .sum()
}

/// Applies `entries` to a copy of `map`, enforcing `quota`.
pub(crate) fn apply_entries(
    map: &BTreeMap<String, Value>,
    entries: Vec<(String, Value)>,
    quota: Option<u64>,
) -> StoreResult<BTreeMap<String, Value>> {
    let mut next = map.clone();
    next.extend(entries);
    if let Some(limit) = quota {
        let size = document_size(&next);
        if size > limit {
            return Err(StoreError::CapacityExceeded(format!(
                "{size} bytes exceeds quota of {limit}"
            )));
        }
    }
    Ok(next)
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
