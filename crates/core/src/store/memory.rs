// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::BTreeMap;
use std::sync::Mutex;

use serde_json::Value;

use super::{apply_entries, Store, StoreFuture};

/// Process-local store, used by tests and `--ephemeral` sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Value>>,
    quota: Option<u64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota: Option<u64>) -> Self {
        MemoryStore {
            entries: Mutex::default(),
            quota,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Value>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Store for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<Value>> {
        Box::pin(async move { Ok(self.lock().get(key).cloned()) })
    }

    fn set_many(&self, entries: Vec<(String, Value)>) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut map = self.lock();
            *map = apply_entries(&map, entries, self.quota)?;
            Ok(())
        })
    }

    fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.lock().remove(key);
            Ok(())
        })
    }

    fn list_keys(&self) -> StoreFuture<'_, Vec<String>> {
        Box::pin(async move { Ok(self.lock().keys().cloned().collect()) })
    }

    fn clear(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.lock().clear();
            Ok(())
        })
    }
}
