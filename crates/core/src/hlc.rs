// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Hybrid logical clock used to stamp whole-state bundles.
//!
//! Peers exchange full state snapshots and keep whichever carries the greater
//! stamp (last-writer-wins at bundle granularity). A plain wall clock is not
//! enough for that: two terminals can produce bundles within the same
//! millisecond, and a terminal whose clock lags must still produce a stamp
//! greater than anything it has already applied.
//!
//! Stamps order by `wall_ms`, then `counter`, then `node_id`.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, TimeZone, Utc};

use crate::error::{Error, Result};

/// A hybrid logical clock stamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hlc {
    pub wall_ms: u64,
    pub counter: u32,
    pub node_id: u32,
}

impl Hlc {
    pub fn new(wall_ms: u64, counter: u32, node_id: u32) -> Self {
        Hlc {
            wall_ms,
            counter,
            node_id,
        }
    }

    /// The smallest possible stamp.
    pub fn zero() -> Self {
        Hlc::new(0, 0, 0)
    }
}

impl Ord for Hlc {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.wall_ms, self.counter, self.node_id).cmp(&(
            other.wall_ms,
            other.counter,
            other.node_id,
        ))
    }
}

impl PartialOrd for Hlc {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Hlc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}@{}", self.wall_ms, self.counter, self.node_id)
    }
}

impl FromStr for Hlc {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (time, node) = s
            .split_once('@')
            .ok_or_else(|| Error::InvalidHlc(format!("missing '@' in '{s}'")))?;
        let (wall, counter) = time
            .split_once('.')
            .ok_or_else(|| Error::InvalidHlc(format!("missing '.' in '{s}'")))?;

        let wall_ms = wall
            .parse()
            .map_err(|_| Error::InvalidHlc(format!("bad wall time '{wall}' in '{s}'")))?;
        let counter = counter
            .parse()
            .map_err(|_| Error::InvalidHlc(format!("bad counter '{counter}' in '{s}'")))?;
        let node_id = node
            .parse()
            .map_err(|_| Error::InvalidHlc(format!("bad node id '{node}' in '{s}'")))?;

        Ok(Hlc::new(wall_ms, counter, node_id))
    }
}

/// Source of wall-clock milliseconds.
///
/// Everything in the queue that reads the time goes through this trait so
/// tests can drive timestamps deterministically.
pub trait ClockSource: Send + Sync {
    fn now_ms(&self) -> u64;

    /// Current time as a UTC timestamp.
    fn now_utc(&self) -> DateTime<Utc> {
        let ms = i64::try_from(self.now_ms()).unwrap_or(i64::MAX);
        Utc.timestamp_millis_opt(ms).single().unwrap_or_else(Utc::now)
    }
}

/// Wall clock backed by `SystemTime`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl ClockSource for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    ms: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        ManualClock {
            ms: AtomicU64::new(start_ms),
        }
    }

    pub fn advance(&self, delta_ms: u64) {
        self.ms.fetch_add(delta_ms, AtomicOrdering::SeqCst);
    }

    pub fn set(&self, ms: u64) {
        self.ms.store(ms, AtomicOrdering::SeqCst);
    }
}

impl ClockSource for ManualClock {
    fn now_ms(&self) -> u64 {
        self.ms.load(AtomicOrdering::SeqCst)
    }
}

impl<C: ClockSource + ?Sized> ClockSource for &C {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }
}

impl<C: ClockSource + ?Sized> ClockSource for std::sync::Arc<C> {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }
}

/// Generator of strictly increasing stamps for one node.
pub struct HlcClock<C: ClockSource = SystemClock> {
    source: C,
    node_id: u32,
    /// Last issued `(wall_ms, counter)`.
    last: Mutex<(u64, u32)>,
}

impl HlcClock<SystemClock> {
    pub fn new(node_id: u32) -> Self {
        Self::with_source(SystemClock, node_id)
    }
}

impl<C: ClockSource> HlcClock<C> {
    pub fn with_source(source: C, node_id: u32) -> Self {
        HlcClock {
            source,
            node_id,
            last: Mutex::new((0, 0)),
        }
    }

    pub fn node_id(&self) -> u32 {
        self.node_id
    }

    /// Issues a stamp greater than every stamp issued or observed so far.
    pub fn now(&self) -> Hlc {
        let physical = self.source.now_ms();
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        *last = if physical > last.0 {
            (physical, 0)
        } else {
            (last.0, last.1 + 1)
        };
        Hlc::new(last.0, last.1, self.node_id)
    }

    /// Folds a remote stamp into the clock so later local stamps sort after it.
    pub fn observe(&self, remote: &Hlc) -> Hlc {
        let physical = self.source.now_ms();
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        let wall = physical.max(last.0).max(remote.wall_ms);
        let counter = if wall == last.0 && wall == remote.wall_ms {
            last.1.max(remote.counter) + 1
        } else if wall == last.0 {
            last.1 + 1
        } else if wall == remote.wall_ms {
            remote.counter + 1
        } else {
            0
        };
        *last = (wall, counter);
        Hlc::new(wall, counter, self.node_id)
    }
}

#[cfg(test)]
#[path = "hlc_tests.rs"]
mod tests;
