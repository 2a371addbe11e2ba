// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde_json::Value;

use super::{apply_entries, Store, StoreError, StoreFuture, StoreResult};

type Document = BTreeMap<String, Value>;

/// Single JSON document on disk.
///
/// Nothing is cached between calls. Every operation re-reads the document
/// under an advisory lock on a sibling `.lock` file, so a long-running
/// `watch` and one-shot commands on the same data directory see each other's
/// writes. Mutations hold the lock exclusively across read, modify and write,
/// and replace the document through a temporary file and a rename, so a
/// crash leaves either the old or the new document, never a torn one.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock_path: PathBuf,
    quota: Option<u64>,
}

impl FileStore {
    /// Opens the document at `path`, creating parent directories as needed.
    ///
    /// An existing document that does not parse is rejected here rather than
    /// on first use.
    pub fn open(path: &Path, quota: Option<u64>) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let store = FileStore {
            path: path.to_path_buf(),
            lock_path: path.with_extension("lock"),
            quota,
        };
        store.read_locked()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Takes the advisory lock; released when the returned file drops.
    fn lock(&self, exclusive: bool) -> StoreResult<File> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)?;
        if exclusive {
            file.lock_exclusive()?;
        } else {
            file.lock_shared()?;
        }
        Ok(file)
    }

    fn load(&self) -> StoreResult<Document> {
        match fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                StoreError::Backend(format!("unreadable store file {}: {e}", self.path.display()))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn read_locked(&self) -> StoreResult<Document> {
        let _lock = self.lock(false)?;
        self.load()
    }

    fn persist(&self, map: &Document) -> StoreResult<()> {
        let tmp = self.path.with_extension("tmp");
        let mut file = File::create(&tmp)?;
        serde_json::to_writer(&mut file, map)?;
        file.flush()?;
        file.sync_all()?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Reads the current document, lets `change` build the next one and
    /// writes it back, all under the exclusive lock. `change` returning
    /// `None` leaves the file untouched.
    fn update<F>(&self, change: F) -> StoreResult<()>
    where
        F: FnOnce(Document) -> StoreResult<Option<Document>>,
    {
        let _lock = self.lock(true)?;
        let current = self.load()?;
        match change(current)? {
            Some(next) => self.persist(&next),
            None => Ok(()),
        }
    }
}

impl Store for FileStore {
    fn backend(&self) -> &'static str {
        "file"
    }

    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<Value>> {
        Box::pin(async move { Ok(self.read_locked()?.remove(key)) })
    }

    fn set_many(&self, entries: Vec<(String, Value)>) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.update(|map| apply_entries(&map, entries, self.quota).map(Some))
        })
    }

    fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.update(|mut map| Ok(map.remove(key).map(|_| map)))
        })
    }

    fn list_keys(&self) -> StoreFuture<'_, Vec<String>> {
        Box::pin(async move { Ok(self.read_locked()?.into_keys().collect()) })
    }

    fn clear(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move { self.update(|_| Ok(Some(BTreeMap::new()))) })
    }
}
