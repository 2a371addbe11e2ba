// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Composition of one client.
//!
//! An [`Engine`] owns the store, bus, ledger and backup manager for a data
//! directory. [`Engine::connect`] adds the event channel and the sync
//! coordinator when a relay is configured.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use tl_core::backup::SnapshotPruner;
use tl_core::id::generate_client_id;
use tl_core::{
    BackupManager, ClockSource, DurableStore, EventBus, HealOutcome, Ledger, Store, SystemClock,
};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::sync::{
    ChannelConfig, ChannelHandle, EventChannel, PollQueue, SyncCoordinator, WebSocketTransport,
};

pub struct Engine {
    config: Config,
    data_dir: PathBuf,
    bus: EventBus,
    ledger: Ledger,
    backups: BackupManager,
}

impl Engine {
    /// Opens the store in `data_dir`, repairs it if needed and applies the
    /// configured queue settings.
    pub async fn open(data_dir: &Path, config: Config) -> Result<Self> {
        fs::create_dir_all(data_dir)?;
        let store = DurableStore::open(data_dir, &config.store)?;
        Self::with_store(data_dir, config, store).await
    }

    /// An engine whose state lives only as long as the process.
    pub async fn ephemeral(data_dir: &Path, config: Config) -> Result<Self> {
        Self::with_store(data_dir, config, DurableStore::in_memory()).await
    }

    async fn with_store(data_dir: &Path, config: Config, store: DurableStore) -> Result<Self> {
        let store: Arc<dyn Store> =
            Arc::new(store.with_capacity_policy(Arc::new(SnapshotPruner::default())));
        let clock: Arc<dyn ClockSource> = Arc::new(SystemClock);
        let bus = EventBus::new(generate_client_id());
        let ledger = Ledger::with_clock(store, bus.clone(), Arc::clone(&clock));
        let backups = BackupManager::new(ledger.clone(), config.backup.clone(), clock);

        match backups.heal_on_startup().await? {
            HealOutcome::Healthy | HealOutcome::Empty => {}
            HealOutcome::Restored(key) => warn!("ticket collection restored from {}", key),
        }

        if let Some(settings) = &config.queue {
            if ledger.settings().await? != *settings {
                info!("applying queue settings from {}", data_dir.display());
                ledger.save_settings(settings).await?;
            }
        }

        Ok(Engine {
            config,
            data_dir: data_dir.to_path_buf(),
            bus,
            ledger,
            backups,
        })
    }

    pub fn client_id(&self) -> &str {
        self.bus.origin()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn backups(&self) -> &BackupManager {
        &self.backups
    }

    /// Starts the event channel and sync coordinator against the configured relay.
    pub async fn connect(&self) -> Result<Session> {
        let remote = self.config.remote.as_ref().ok_or(Error::NoRemote)?;
        remote.validate()?;

        let queue = PollQueue::open(
            &remote.poll_queue_path(&self.data_dir),
            Duration::from_secs(remote.poll_retention_secs),
        )?;
        let coordinator = SyncCoordinator::new(
            self.ledger.clone(),
            self.backups.clone(),
            remote.stale_after(),
            Duration::from_millis(remote.poll_interval_ms),
        );
        // Subscribed before the channel reports its first connect.
        coordinator.start();

        let (channel, handle) = EventChannel::new(
            WebSocketTransport::new(),
            self.bus.clone(),
            ChannelConfig::from(remote),
            queue,
        );
        info!(
            "client {} ({}) joining {}",
            self.client_id(),
            self.config.client_name,
            remote.url
        );
        Ok(Session {
            channel: handle,
            task: channel.spawn(),
            coordinator,
        })
    }
}

/// A running connection to the relay.
pub struct Session {
    channel: ChannelHandle,
    task: JoinHandle<()>,
    coordinator: SyncCoordinator,
}

impl Session {
    pub fn channel(&self) -> &ChannelHandle {
        &self.channel
    }

    pub fn coordinator(&self) -> &SyncCoordinator {
        &self.coordinator
    }

    /// Stops the coordinator, then flushes and closes the channel.
    pub async fn close(self) {
        self.coordinator.stop().await;
        self.channel.shutdown();
        if let Err(e) = self.task.await {
            warn!("event channel ended abnormally: {}", e);
        }
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
