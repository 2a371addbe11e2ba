// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Shared poll queue used when the relay is unreachable.
//!
//! Every client on the site appends its outbound events to one JSONL file and
//! reads the other clients' entries on a fixed interval. Entries carry a
//! sequence number so each reader keeps its own cursor, and they are pruned
//! by age once every reader has had several polls to see them. The newest
//! entry is never pruned, so sequence numbers keep increasing.
//!
//! Appends from several processes are serialized with an advisory lock on a
//! sibling `.lock` file.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::debug;

use tl_core::jsonl;
use tl_core::DomainEvent;

/// Error type for queue operations.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Reading or rewriting the queue file failed.
    #[error("{0}")]
    File(#[from] tl_core::Error),
}

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// One line of the queue file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub seq: u64,
    pub origin: String,
    pub written_at: DateTime<Utc>,
    pub event: DomainEvent,
}

#[derive(Debug, Clone)]
pub struct PollQueue {
    path: PathBuf,
    lock_path: PathBuf,
    retention: Duration,
}

impl PollQueue {
    /// Opens the queue at `path`, creating the file and its directory.
    pub fn open(path: &Path, retention: Duration) -> QueueResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        OpenOptions::new().create(true).append(true).open(path)?;
        Ok(PollQueue {
            path: path.to_path_buf(),
            lock_path: path.with_extension("lock"),
            retention,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends an event and returns its sequence number.
    pub fn push(&self, event: &DomainEvent) -> QueueResult<u64> {
        self.push_at(event, Utc::now())
    }

    pub(crate) fn push_at(&self, event: &DomainEvent, now: DateTime<Utc>) -> QueueResult<u64> {
        let _lock = self.lock(true)?;
        let entries: Vec<QueueEntry> = jsonl::read_lenient(&self.path)?;
        let seq = entries.iter().map(|e| e.seq).max().unwrap_or(0) + 1;
        let entry = QueueEntry {
            seq,
            origin: event.origin.clone(),
            written_at: now,
            event: event.clone(),
        };

        let kept = self.unexpired(&entries, now);
        if kept.len() == entries.len() {
            jsonl::append(&self.path, &entry)?;
        } else {
            debug!(
                "poll queue: pruning {} expired entries",
                entries.len() - kept.len()
            );
            let mut rewritten = kept;
            rewritten.push(entry);
            jsonl::write_all(&self.path, &rewritten)?;
        }
        Ok(seq)
    }

    /// Entries after `after` written by other clients, oldest first.
    pub fn poll(&self, after: u64, own_origin: &str) -> QueueResult<Vec<QueueEntry>> {
        let _lock = self.lock(false)?;
        let mut entries: Vec<QueueEntry> = jsonl::read_lenient(&self.path)?;
        entries.retain(|e| e.seq > after && e.origin != own_origin);
        entries.sort_by_key(|e| e.seq);
        Ok(entries)
    }

    /// Highest sequence number in the file, 0 when empty.
    pub fn latest_seq(&self) -> QueueResult<u64> {
        let _lock = self.lock(false)?;
        let entries: Vec<QueueEntry> = jsonl::read_lenient(&self.path)?;
        Ok(entries.iter().map(|e| e.seq).max().unwrap_or(0))
    }

    fn unexpired(&self, entries: &[QueueEntry], now: DateTime<Utc>) -> Vec<QueueEntry> {
        let newest = entries.iter().map(|e| e.seq).max();
        entries
            .iter()
            .filter(|e| {
                let age = now.signed_duration_since(e.written_at);
                Some(e.seq) == newest || age.to_std().map_or(true, |age| age <= self.retention)
            })
            .cloned()
            .collect()
    }

    /// Takes the advisory lock; released when the returned file drops.
    fn lock(&self, exclusive: bool) -> QueueResult<File> {
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
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
