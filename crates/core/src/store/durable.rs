// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use super::{
    BackendKind, FileStore, MemoryStore, SqliteStore, Store, StoreConfig, StoreError,
    StoreFuture, StoreResult,
};

const SQLITE_FILE_NAME: &str = "queue.db";
const JSON_FILE_NAME: &str = "queue.json";

/// Frees space when a write hits [`StoreError::CapacityExceeded`].
pub trait CapacityPolicy: Send + Sync {
    /// Deletes non-essential data from `store`, returning how many entries
    /// were removed or trimmed.
    ///
    /// `pending` is the write that hit the limit and is retried as the
    /// policy leaves it. A policy that trims a key must trim that key in
    /// `pending` too, or the retry writes the untrimmed value back.
    fn reclaim<'a>(
        &'a self,
        store: &'a dyn Store,
        pending: &'a mut Vec<(String, Value)>,
    ) -> StoreFuture<'a, usize>;
}

/// The store handed to the ledger and backup subsystem.
///
/// Wraps whichever backend was selected at start-up. A write that fails with
/// `CapacityExceeded` runs the capacity policy and is retried exactly once;
/// if the retry fails too the error surfaces as a plain backend failure.
pub struct DurableStore {
    backend: Box<dyn Store>,
    policy: Option<Arc<dyn CapacityPolicy>>,
}

impl DurableStore {
    pub fn new(backend: Box<dyn Store>) -> Self {
        DurableStore {
            backend,
            policy: None,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryStore::new()))
    }

    /// Opens the configured backend under `dir`.
    ///
    /// With [`BackendKind::Auto`] SQLite is tried first; if it cannot be
    /// opened the JSON file backend is used instead.
    pub fn open(dir: &Path, config: &StoreConfig) -> StoreResult<Self> {
        let quota = config.quota();
        let backend: Box<dyn Store> = match config.backend {
            BackendKind::Sqlite => Box::new(SqliteStore::open(&dir.join(SQLITE_FILE_NAME), quota)?),
            BackendKind::File => Box::new(FileStore::open(&dir.join(JSON_FILE_NAME), quota)?),
            BackendKind::Memory => Box::new(MemoryStore::with_quota(quota)),
            BackendKind::Auto => match SqliteStore::open(&dir.join(SQLITE_FILE_NAME), quota) {
                Ok(store) => Box::new(store),
                Err(e) => {
                    warn!("sqlite store unavailable ({}), falling back to file store", e);
                    Box::new(FileStore::open(&dir.join(JSON_FILE_NAME), quota)?)
                }
            },
        };
        info!("store backend: {}", backend.backend());
        Ok(Self::new(backend))
    }

    pub fn with_capacity_policy(mut self, policy: Arc<dyn CapacityPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    async fn write(&self, mut entries: Vec<(String, Value)>) -> StoreResult<()> {
        let reason = match self.backend.set_many(entries.clone()).await {
            Err(StoreError::CapacityExceeded(reason)) => reason,
            other => return other,
        };
        let Some(policy) = &self.policy else {
            return Err(StoreError::CapacityExceeded(reason));
        };

        warn!("store full ({}), reclaiming space before retry", reason);
        let reclaimed = policy.reclaim(self.backend.as_ref(), &mut entries).await?;
        info!("reclaimed {} entries", reclaimed);

        self.backend.set_many(entries).await.map_err(|e| match e {
            StoreError::CapacityExceeded(reason) => StoreError::Backend(format!(
                "still out of space after reclaiming {reclaimed} entries: {reason}"
            )),
            other => other,
        })
    }
}

impl Store for DurableStore {
    fn backend(&self) -> &'static str {
        self.backend.backend()
    }

    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<Value>> {
        self.backend.get(key)
    }

    fn set_many(&self, entries: Vec<(String, Value)>) -> StoreFuture<'_, ()> {
        Box::pin(self.write(entries))
    }

    fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
        self.backend.delete(key)
    }

    fn list_keys(&self) -> StoreFuture<'_, Vec<String>> {
        self.backend.list_keys()
    }

    fn clear(&self) -> StoreFuture<'_, ()> {
        self.backend.clear()
    }
}
