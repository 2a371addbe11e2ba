// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Snapshots of the queue state and the automatic backup schedule.
//!
//! A snapshot is stored under `backup:{kind}:{created_at_ms}` as a JSON
//! document with a `meta` section and a `data` section holding the full
//! [`StateBundle`]. Snapshots are never modified after they are written;
//! each kind keeps the newest `retention` snapshots.
//!
//! Three triggers create snapshots without a caller asking for one: a fixed
//! interval timer (`automatic`), a once-a-day wall-clock timer (`daily`) and
//! ticket mutations seen on the event bus (`automatic`, rate limited).
//! `sync` snapshots are taken by the sync coordinator before it applies
//! peer state.
//!
//! Snapshots are read and restored through the [`Ledger`], under its write
//! lock, so a snapshot never captures half of a ticket mutation and a
//! restore never interleaves with one.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Local, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bundle::{keys, StateBundle};
use crate::error::{Error, Result};
use crate::event::{EventBus, EventPayload};
use crate::hlc::ClockSource;
use crate::ledger::Ledger;
use crate::store::{to_value, CapacityPolicy, Store, StoreError, StoreFuture};
use crate::ticket::{ServiceRecord, Ticket};

const KEY_PREFIX: &str = "backup:";

/// Why a snapshot was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupKind {
    Manual,
    Automatic,
    Daily,
    Sync,
}

impl BackupKind {
    pub const ALL: [BackupKind; 4] = [
        BackupKind::Manual,
        BackupKind::Automatic,
        BackupKind::Daily,
        BackupKind::Sync,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackupKind::Manual => "manual",
            BackupKind::Automatic => "automatic",
            BackupKind::Daily => "daily",
            BackupKind::Sync => "sync",
        }
    }
}

impl fmt::Display for BackupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BackupKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "manual" => Ok(BackupKind::Manual),
            "automatic" | "auto" => Ok(BackupKind::Automatic),
            "daily" => Ok(BackupKind::Daily),
            "sync" => Ok(BackupKind::Sync),
            _ => Err(Error::InvalidBackupKind(s.to_string())),
        }
    }
}

/// Builds the store key for a snapshot.
pub fn backup_key(kind: BackupKind, created_at_ms: u64) -> String {
    format!("{}{}:{:013}", KEY_PREFIX, kind, created_at_ms)
}

/// Splits a snapshot key into its kind and creation time.
pub fn parse_backup_key(key: &str) -> Option<(BackupKind, u64)> {
    let rest = key.strip_prefix(KEY_PREFIX)?;
    let (kind, ms) = rest.split_once(':')?;
    Some((kind.parse().ok()?, ms.parse().ok()?))
}

/// Describes a snapshot without its data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub key: String,
    pub kind: BackupKind,
    pub created_at: DateTime<Utc>,
    /// Client that produced the snapshot.
    pub client_id: String,
    pub ticket_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub meta: SnapshotMeta,
    pub data: StateBundle,
}

impl Snapshot {
    /// Decodes a stored snapshot, rejecting documents without a data section.
    pub fn from_value(key: &str, value: Value) -> Result<Self> {
        match value.get("data") {
            Some(Value::Object(_)) => {}
            Some(_) => return Err(Error::SnapshotInvalid(format!("{key}: data is not an object"))),
            None => return Err(Error::SnapshotInvalid(format!("{key}: missing data section"))),
        }
        serde_json::from_value(value).map_err(|e| Error::SnapshotInvalid(format!("{key}: {e}")))
    }
}

/// The `[backup]` table of the client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Seconds between automatic snapshots. 0 disables the timer.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Local wall-clock time (`HH:MM`) of the daily snapshot. Empty disables it.
    #[serde(default = "default_daily_at")]
    pub daily_at: String,
    /// Snapshots kept per kind.
    #[serde(default = "default_retention")]
    pub retention: usize,
    /// Minimum seconds between mutation-triggered snapshots.
    #[serde(default = "default_min_trigger_gap_secs")]
    pub min_trigger_gap_secs: u64,
}

fn default_interval_secs() -> u64 {
    300
}

fn default_daily_at() -> String {
    "23:59".to_string()
}

fn default_retention() -> usize {
    10
}

fn default_min_trigger_gap_secs() -> u64 {
    30
}

impl Default for BackupConfig {
    fn default() -> Self {
        BackupConfig {
            interval_secs: default_interval_secs(),
            daily_at: default_daily_at(),
            retention: default_retention(),
            min_trigger_gap_secs: default_min_trigger_gap_secs(),
        }
    }
}

impl BackupConfig {
    /// The configured daily time, or `None` when the daily snapshot is off.
    pub fn daily_time(&self) -> Option<NaiveTime> {
        let at = self.daily_at.trim();
        if at.is_empty() {
            return None;
        }
        match NaiveTime::parse_from_str(at, "%H:%M") {
            Ok(time) => Some(time),
            Err(e) => {
                warn!("ignoring invalid backup.daily_at '{}': {}", at, e);
                None
            }
        }
    }
}

/// Next occurrence of `at` strictly after `now`, in `now`'s time zone.
///
/// Days where `at` does not exist (a DST gap) are skipped.
pub fn next_daily_run<Tz: TimeZone>(now: &DateTime<Tz>, at: NaiveTime) -> Option<DateTime<Tz>> {
    let tz = now.timezone();
    let today = now.date_naive();
    (0..3)
        .filter_map(|offset| today.checked_add_days(chrono::Days::new(offset)))
        .filter_map(|day| tz.from_local_datetime(&day.and_time(at)).earliest())
        .find(|candidate| candidate > now)
}

/// Result of [`BackupManager::heal_on_startup`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealOutcome {
    /// The ticket collection was readable and non-empty.
    Healthy,
    /// State was restored from this snapshot.
    Restored(String),
    /// Nothing usable to restore; the queue starts empty.
    Empty,
}

struct AutoTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct ManagerInner {
    ledger: Ledger,
    store: Arc<dyn Store>,
    bus: EventBus,
    config: BackupConfig,
    clock: Arc<dyn ClockSource>,
    last_auto_ms: Mutex<Option<u64>>,
    task: Mutex<Option<AutoTask>>,
}

/// Creates, restores, lists and prunes snapshots. Cheap to clone.
#[derive(Clone)]
pub struct BackupManager {
    inner: Arc<ManagerInner>,
}

impl BackupManager {
    /// Snapshots live in the ledger's store and are announced on its bus.
    pub fn new(ledger: Ledger, config: BackupConfig, clock: Arc<dyn ClockSource>) -> Self {
        BackupManager {
            inner: Arc::new(ManagerInner {
                store: ledger.shared_store(),
                bus: ledger.bus().clone(),
                ledger,
                config,
                clock,
                last_auto_ms: Mutex::new(None),
                task: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &BackupConfig {
        &self.inner.config
    }

    fn store(&self) -> &dyn Store {
        self.inner.store.as_ref()
    }

    /// Snapshots the current state, announces it (except for automatic
    /// snapshots) and prunes older snapshots of the same kind.
    pub async fn create_backup(&self, kind: BackupKind) -> Result<SnapshotMeta> {
        let data = self.inner.ledger.export_bundle().await?;

        let mut created_ms = self.inner.clock.now_ms();
        while self.store().get(&backup_key(kind, created_ms)).await?.is_some() {
            created_ms += 1;
        }
        let key = backup_key(kind, created_ms);

        let meta = SnapshotMeta {
            key: key.clone(),
            kind,
            created_at: ms_to_utc(created_ms),
            client_id: self.inner.bus.origin().to_string(),
            ticket_count: data.tickets.len(),
        };
        let snapshot = Snapshot { meta, data };
        self.store().set(&key, to_value(&snapshot)?).await?;
        info!(
            "created {} backup {} ({} tickets)",
            kind, key, snapshot.meta.ticket_count
        );

        if kind != BackupKind::Automatic {
            self.inner.bus.publish(EventPayload::SystemBackup {
                key: key.clone(),
                kind,
            });
        }

        self.prune(kind).await?;
        Ok(snapshot.meta)
    }

    /// Loads a snapshot without applying it.
    pub async fn load(&self, key: &str) -> Result<Snapshot> {
        if parse_backup_key(key).is_none() {
            return Err(Error::BackupNotFound(key.to_string()));
        }
        let value = self
            .store()
            .get(key)
            .await?
            .ok_or_else(|| Error::BackupNotFound(key.to_string()))?;
        Snapshot::from_value(key, value)
    }

    /// Overwrites the queue state with a snapshot's data as a new local
    /// change, so peers adopt it.
    ///
    /// An unreadable snapshot leaves every store key as it was.
    pub async fn restore_backup(&self, key: &str) -> Result<SnapshotMeta> {
        let snapshot = self.load(key).await?;
        self.inner.ledger.restore_state(&snapshot.data).await?;
        info!(
            "restored backup {} ({} tickets)",
            key, snapshot.meta.ticket_count
        );
        self.inner.bus.publish(EventPayload::SystemRestore {
            key: key.to_string(),
        });
        Ok(snapshot.meta)
    }

    /// All snapshots, newest first. Unreadable entries are skipped.
    pub async fn list_backups(&self) -> Result<Vec<SnapshotMeta>> {
        let mut metas = Vec::new();
        for key in backup_keys(self.store()).await? {
            let Some(value) = self.store().get(&key).await? else {
                continue;
            };
            match value
                .get("meta")
                .cloned()
                .map(serde_json::from_value::<SnapshotMeta>)
            {
                Some(Ok(meta)) => metas.push(meta),
                _ => warn!("skipping unreadable backup {}", key),
            }
        }
        metas.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.key.cmp(&a.key)));
        Ok(metas)
    }

    pub async fn delete_backup(&self, key: &str) -> Result<()> {
        if parse_backup_key(key).is_none() || self.store().get(key).await?.is_none() {
            return Err(Error::BackupNotFound(key.to_string()));
        }
        self.store().delete(key).await?;
        info!("deleted backup {}", key);
        Ok(())
    }

    /// The newest snapshot of `kind`.
    pub async fn latest(&self, kind: BackupKind) -> Result<Option<SnapshotMeta>> {
        Ok(self
            .list_backups()
            .await?
            .into_iter()
            .find(|meta| meta.kind == kind))
    }

    /// Deletes all but the newest `retention` snapshots of `kind`.
    pub async fn prune(&self, kind: BackupKind) -> Result<usize> {
        let mut stamps: Vec<(u64, String)> = backup_keys(self.store())
            .await?
            .into_iter()
            .filter_map(|key| match parse_backup_key(&key) {
                Some((k, ms)) if k == kind => Some((ms, key)),
                _ => None,
            })
            .collect();
        stamps.sort_unstable_by(|a, b| b.cmp(a));

        let mut removed = 0;
        for (_, key) in stamps.into_iter().skip(self.inner.config.retention) {
            self.store().delete(&key).await?;
            removed += 1;
        }
        if removed > 0 {
            debug!("pruned {} {} backups", removed, kind);
        }
        Ok(removed)
    }

    /// Takes an automatic snapshot unless one was taken within the
    /// configured minimum gap. Returns the snapshot if one was taken.
    pub async fn notify_mutation(&self) -> Result<Option<SnapshotMeta>> {
        let now = self.inner.clock.now_ms();
        let gap_ms = self.inner.config.min_trigger_gap_secs * 1000;
        {
            let mut last = self
                .inner
                .last_auto_ms
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            if last.is_some_and(|at| now.saturating_sub(at) < gap_ms) {
                return Ok(None);
            }
            *last = Some(now);
        }
        self.create_backup(BackupKind::Automatic).await.map(Some)
    }

    /// Repairs an empty or unreadable ticket collection from the newest
    /// automatic snapshot that holds tickets.
    pub async fn heal_on_startup(&self) -> Result<HealOutcome> {
        let malformed = match self.store().get(keys::TICKETS).await? {
            None => false,
            Some(value) => match serde_json::from_value::<Vec<Ticket>>(value) {
                Ok(tickets) if !tickets.is_empty() => return Ok(HealOutcome::Healthy),
                Ok(_) => false,
                Err(e) => {
                    warn!("ticket collection is unreadable: {}", e);
                    true
                }
            },
        };

        let candidates: Vec<SnapshotMeta> = self
            .list_backups()
            .await?
            .into_iter()
            .filter(|meta| meta.kind == BackupKind::Automatic && meta.ticket_count > 0)
            .collect();

        // The repaired state keeps its old stamp: it is older than anything
        // a peer may hold and must not win over it.
        for meta in candidates {
            match self.load(&meta.key).await {
                Ok(snapshot) => {
                    self.inner.ledger.replace_state(&snapshot.data).await?;
                    info!("healed ticket collection from {}", meta.key);
                    self.inner.bus.publish(EventPayload::SystemRestore {
                        key: meta.key.clone(),
                    });
                    return Ok(HealOutcome::Restored(meta.key));
                }
                Err(Error::SnapshotInvalid(reason)) => {
                    warn!("cannot heal from {}: {}", meta.key, reason);
                }
                Err(e) => return Err(e),
            }
        }

        if malformed {
            warn!("no usable backup, starting with an empty ticket collection");
            self.store()
                .set(keys::TICKETS, to_value(&Vec::<Ticket>::new())?)
                .await?;
        }
        Ok(HealOutcome::Empty)
    }

    /// Starts the interval, daily and after-mutation triggers.
    ///
    /// Must be called from within a tokio runtime. Calling it again while
    /// the triggers are running has no effect.
    pub fn start_auto_backup(&self) {
        let mut task = self.inner.task.lock().unwrap_or_else(|e| e.into_inner());
        if task.is_some() {
            return;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self.inner.bus.on_any(move |event| {
            if event.kind().is_ticket_mutation() {
                let _ = tx.send(());
            }
        });

        let cancel = CancellationToken::new();
        let manager = self.clone();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            manager.run_schedule(token, rx).await;
            manager.inner.bus.off_any(subscription);
        });

        info!(
            "automatic backups every {}s, daily at '{}'",
            self.inner.config.interval_secs, self.inner.config.daily_at
        );
        *task = Some(AutoTask { cancel, handle });
    }

    /// Stops the triggers started by [`start_auto_backup`](Self::start_auto_backup)
    /// and waits for a backup in progress to finish.
    pub async fn stop_auto_backup(&self) -> bool {
        let task = self
            .inner
            .task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        let Some(task) = task else {
            return false;
        };
        task.cancel.cancel();
        if let Err(e) = task.handle.await {
            warn!("backup scheduler ended abnormally: {}", e);
        }
        info!("automatic backups stopped");
        true
    }

    pub fn is_auto_backup_running(&self) -> bool {
        self.inner
            .task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    async fn run_schedule(
        &self,
        cancel: CancellationToken,
        mut mutations: mpsc::UnboundedReceiver<()>,
    ) {
        let interval_enabled = self.inner.config.interval_secs > 0;
        let period = Duration::from_secs(self.inner.config.interval_secs.max(1));
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        let daily_at = self.inner.config.daily_time();

        loop {
            let daily_in = daily_at
                .and_then(|at| next_daily_run(&Local::now(), at))
                .and_then(|next| (next - Local::now()).to_std().ok());

            tokio::select! {
                _ = cancel.cancelled() => break,

                _ = interval.tick(), if interval_enabled => {
                    self.run_trigger(BackupKind::Automatic).await;
                }

                _ = tokio::time::sleep(daily_in.unwrap_or(Duration::MAX)), if daily_in.is_some() => {
                    self.run_trigger(BackupKind::Daily).await;
                }

                Some(()) = mutations.recv() => {
                    if let Err(e) = self.notify_mutation().await {
                        error!("after-mutation backup failed: {}", e);
                    }
                }
            }
        }
    }

    async fn run_trigger(&self, kind: BackupKind) {
        if kind == BackupKind::Automatic {
            *self
                .inner
                .last_auto_ms
                .lock()
                .unwrap_or_else(|e| e.into_inner()) = Some(self.inner.clock.now_ms());
        }
        if let Err(e) = self.create_backup(kind).await {
            error!("{} backup failed: {}", kind, e);
        }
    }
}

impl fmt::Debug for BackupManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackupManager")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

async fn backup_keys(store: &dyn Store) -> Result<Vec<String>> {
    Ok(store
        .list_keys()
        .await?
        .into_iter()
        .filter(|key| key.starts_with(KEY_PREFIX))
        .collect())
}

fn ms_to_utc(ms: u64) -> DateTime<Utc> {
    let ms = i64::try_from(ms).unwrap_or(i64::MAX);
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

/// Capacity policy that frees space by dropping older snapshots and old
/// service history.
///
/// Keeps the newest snapshot of each kind and the newest `history_limit`
/// service records.
#[derive(Debug, Clone)]
pub struct SnapshotPruner {
    pub history_limit: usize,
}

impl Default for SnapshotPruner {
    fn default() -> Self {
        SnapshotPruner {
            history_limit: 1000,
        }
    }
}

impl SnapshotPruner {
    async fn reclaim_from(
        &self,
        store: &dyn Store,
        pending: &mut [(String, Value)],
    ) -> Result<usize> {
        let mut newest: BTreeMap<BackupKind, u64> = BTreeMap::new();
        let mut stamped = Vec::new();
        for key in backup_keys(store).await? {
            if let Some((kind, ms)) = parse_backup_key(&key) {
                let entry = newest.entry(kind).or_insert(ms);
                *entry = (*entry).max(ms);
                stamped.push((kind, ms, key));
            }
        }

        let mut removed = 0;
        for (kind, ms, key) in stamped {
            if newest.get(&kind) != Some(&ms) {
                store.delete(&key).await?;
                removed += 1;
            }
        }

        // A pending history write replaces the stored one, so only it needs
        // trimming.
        let mut history_pending = false;
        for (key, value) in pending.iter_mut() {
            if key.as_str() == keys::HISTORY {
                history_pending = true;
                removed += self.trim_history(value)?;
            }
        }
        if !history_pending {
            if let Some(mut value) = store.get(keys::HISTORY).await? {
                let excess = self.trim_history(&mut value)?;
                if excess > 0 {
                    store.set(keys::HISTORY, value).await?;
                    removed += excess;
                }
            }
        }
        Ok(removed)
    }

    /// Drops the oldest service records beyond the limit. Returns how many
    /// were dropped; an undecodable value is left alone.
    fn trim_history(&self, value: &mut Value) -> Result<usize> {
        let Ok(mut history) = serde_json::from_value::<Vec<ServiceRecord>>(value.clone()) else {
            return Ok(0);
        };
        if history.len() <= self.history_limit {
            return Ok(0);
        }
        let excess = history.len() - self.history_limit;
        history.drain(..excess);
        *value = to_value(&history)?;
        Ok(excess)
    }
}

impl CapacityPolicy for SnapshotPruner {
    fn reclaim<'a>(
        &'a self,
        store: &'a dyn Store,
        pending: &'a mut Vec<(String, Value)>,
    ) -> StoreFuture<'a, usize> {
        Box::pin(async move {
            self.reclaim_from(store, pending).await.map_err(|e| match e {
                Error::Store(inner) => inner,
                other => StoreError::Backend(other.to_string()),
            })
        })
    }
}

#[cfg(test)]
#[path = "backup_tests.rs"]
mod tests;
