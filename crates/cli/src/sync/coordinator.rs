// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Whole-state reconciliation between peers.
//!
//! Peers exchange complete [`StateBundle`]s stamped with a hybrid logical
//! clock. The ledger stamps every mutation as it writes it, so the stored
//! state always carries its producer's time, even for changes made by a
//! one-shot command while no session was running. A bundle is applied only
//! when its stamp is strictly greater than the stored stamp, so the most
//! recent writer wins for the whole bundle. This is eventually consistent,
//! not linearizable: two peers mutating at once both broadcast, and the
//! later stamp overwrites the other peer's change.
//!
//! The coordinator reacts to bus events:
//! - connecting (or falling back to the poll queue) requests peers' state
//!   and announces the local state
//! - a peer's `DataRequested` is answered with a `DataResponse`
//! - `DataResponse` addressed to us and any `DataUpdate` are applied
//! - local ticket mutations and restores are broadcast as `DataUpdate`
//!
//! It also checks the stored stamp on a short interval and broadcasts when
//! it moved past the last stamp sent, which picks up changes written to the
//! same store by other processes.
//!
//! A sync snapshot of the local state is taken right before each inbound
//! bundle is applied, so a bad merge can be rolled back.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tl_core::{
    BackupKind, BackupManager, ConnectionStatus, EventBus, EventKind, EventPayload, Hlc, Ledger,
    Result, StateBundle, SubscriptionId,
};

#[derive(Debug)]
enum Command {
    RequestState,
    Respond {
        requester: String,
    },
    Apply {
        origin: String,
        timestamp: Hlc,
        bundle: StateBundle,
    },
    Broadcast,
    /// Broadcast only if the stored stamp moved past the last one sent.
    BroadcastIfChanged,
}

#[derive(Default)]
struct SyncState {
    /// When a peer bundle last arrived.
    last_sync: Option<Instant>,
    /// Newest stamp sent to or received from peers.
    last_shared: Option<Hlc>,
}

struct CoordinatorTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct Inner {
    ledger: Ledger,
    backups: BackupManager,
    bus: EventBus,
    stale_after: Duration,
    check_every: Duration,
    state: Mutex<SyncState>,
    task: Mutex<Option<CoordinatorTask>>,
}

/// Keeps this client's state in step with its peers. Cheap to clone.
#[derive(Clone)]
pub struct SyncCoordinator {
    inner: Arc<Inner>,
}

impl SyncCoordinator {
    /// `stale_after` of zero disables the staleness check. `check_every` is
    /// how often the stored stamp is compared with the last one shared; zero
    /// disables the check.
    pub fn new(
        ledger: Ledger,
        backups: BackupManager,
        stale_after: Duration,
        check_every: Duration,
    ) -> Self {
        let bus = ledger.bus().clone();
        SyncCoordinator {
            inner: Arc::new(Inner {
                ledger,
                backups,
                bus,
                stale_after,
                check_every,
                state: Mutex::new(SyncState::default()),
                task: Mutex::new(None),
            }),
        }
    }

    /// Stamp of the local state.
    pub async fn stamp(&self) -> Result<Option<Hlc>> {
        self.inner.ledger.stamp().await
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, SyncState> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn mark_shared(&self, stamp: Hlc) {
        let mut state = self.lock_state();
        state.last_shared = state.last_shared.max(Some(stamp));
    }

    /// Asks every peer for its full state.
    pub fn request_state(&self) {
        debug!("requesting peer state");
        self.inner.bus.publish(EventPayload::DataRequested {
            requester: self.inner.bus.origin().to_string(),
        });
    }

    /// Sends the local state to `requester`.
    pub async fn respond(&self, requester: &str) -> Result<()> {
        let (bundle, stamp) = self.inner.ledger.export_stamped().await?;
        let timestamp = stamp.unwrap_or_else(Hlc::zero);
        debug!("answering {} with state {}", requester, timestamp);
        self.inner.bus.publish(EventPayload::DataResponse {
            target: requester.to_string(),
            timestamp,
            bundle,
        });
        Ok(())
    }

    /// Applies a peer's bundle if it is newer than the local state.
    ///
    /// Returns false when the bundle was older and left the state alone.
    pub async fn apply(&self, origin: &str, timestamp: Hlc, bundle: &StateBundle) -> Result<bool> {
        self.lock_state().last_sync = Some(Instant::now());
        let current = self.stamp().await?.unwrap_or_else(Hlc::zero);
        if timestamp <= current {
            debug!(
                "ignoring state {} from {}, local state {} is newer",
                timestamp, origin, current
            );
            return Ok(false);
        }

        self.inner.backups.create_backup(BackupKind::Sync).await?;
        // A local change may have landed since the check above.
        if !self.inner.ledger.apply_if_newer(bundle, timestamp).await? {
            debug!("state {} from {} lost to a local change", timestamp, origin);
            return Ok(false);
        }
        self.mark_shared(timestamp);
        info!(
            "applied state {} from {} ({} tickets)",
            timestamp,
            origin,
            bundle.tickets.len()
        );
        Ok(true)
    }

    /// Pushes the local state to every peer under the stamp of its last
    /// change. Returns `None` when the state was never changed.
    pub async fn broadcast_data_update(&self) -> Result<Option<Hlc>> {
        let (bundle, stamp) = self.inner.ledger.export_stamped().await?;
        let Some(timestamp) = stamp else {
            debug!("nothing to broadcast, local state never changed");
            return Ok(None);
        };
        self.mark_shared(timestamp);
        debug!("broadcasting state {}", timestamp);
        self.inner
            .bus
            .publish(EventPayload::DataUpdate { timestamp, bundle });
        Ok(Some(timestamp))
    }

    /// Broadcasts the local state if it changed since it was last shared.
    pub async fn broadcast_if_changed(&self) -> Result<Option<Hlc>> {
        let stored = self.stamp().await?;
        if stored <= self.lock_state().last_shared {
            return Ok(None);
        }
        self.broadcast_data_update().await
    }

    fn is_stale(&self) -> bool {
        self.lock_state()
            .last_sync
            .map_or(true, |at| at.elapsed() >= self.inner.stale_after)
    }

    /// Subscribes to the bus and starts the staleness timer.
    ///
    /// Must be called from within a tokio runtime. Calling it again while
    /// running has no effect.
    pub fn start(&self) {
        let mut task = self.inner.task.lock().unwrap_or_else(|e| e.into_inner());
        if task.is_some() {
            return;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let subscriptions = self.subscribe(tx);

        let cancel = CancellationToken::new();
        let coordinator = self.clone();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            coordinator.run(token, rx).await;
            for (kind, id) in subscriptions {
                match kind {
                    Some(kind) => coordinator.inner.bus.off(kind, id),
                    None => coordinator.inner.bus.off_any(id),
                };
            }
        });

        info!("sync coordinator started");
        *task = Some(CoordinatorTask { cancel, handle });
    }

    /// Stops the coordinator after it handles the events already received.
    pub async fn stop(&self) -> bool {
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
            warn!("sync coordinator ended abnormally: {}", e);
        }
        info!("sync coordinator stopped");
        true
    }

    fn subscribe(
        &self,
        tx: mpsc::UnboundedSender<Command>,
    ) -> Vec<(Option<EventKind>, SubscriptionId)> {
        let bus = &self.inner.bus;
        let own = bus.origin().to_string();
        let mut subscriptions = Vec::new();

        let sender = tx.clone();
        let id = bus.on(EventKind::ConnectionStatus, move |event| {
            if let EventPayload::ConnectionStatus { status } = &event.payload {
                if matches!(
                    status,
                    ConnectionStatus::Connected | ConnectionStatus::Fallback { .. }
                ) {
                    let _ = sender.send(Command::RequestState);
                    let _ = sender.send(Command::Broadcast);
                }
            }
        });
        subscriptions.push((Some(EventKind::ConnectionStatus), id));

        let sender = tx.clone();
        let me = own.clone();
        let id = bus.on(EventKind::DataRequested, move |event| {
            if let EventPayload::DataRequested { requester } = &event.payload {
                if event.origin != me && *requester != me {
                    let _ = sender.send(Command::Respond {
                        requester: requester.clone(),
                    });
                }
            }
        });
        subscriptions.push((Some(EventKind::DataRequested), id));

        let sender = tx.clone();
        let me = own.clone();
        let id = bus.on(EventKind::DataResponse, move |event| {
            if let EventPayload::DataResponse {
                target,
                timestamp,
                bundle,
            } = &event.payload
            {
                if event.origin != me && *target == me {
                    let _ = sender.send(Command::Apply {
                        origin: event.origin.clone(),
                        timestamp: *timestamp,
                        bundle: bundle.clone(),
                    });
                }
            }
        });
        subscriptions.push((Some(EventKind::DataResponse), id));

        let sender = tx.clone();
        let me = own.clone();
        let id = bus.on(EventKind::DataUpdate, move |event| {
            if let EventPayload::DataUpdate { timestamp, bundle } = &event.payload {
                if event.origin != me {
                    let _ = sender.send(Command::Apply {
                        origin: event.origin.clone(),
                        timestamp: *timestamp,
                        bundle: bundle.clone(),
                    });
                }
            }
        });
        subscriptions.push((Some(EventKind::DataUpdate), id));

        let me = own;
        let id = bus.on_any(move |event| {
            let kind = event.kind();
            if event.origin == me
                && (kind.is_ticket_mutation() || kind == EventKind::SystemRestore)
            {
                let _ = tx.send(Command::Broadcast);
            }
        });
        subscriptions.push((None, id));

        subscriptions
    }

    async fn run(&self, cancel: CancellationToken, mut commands: mpsc::UnboundedReceiver<Command>) {
        let period = self.inner.stale_after;
        let mut stale_check = (!period.is_zero())
            .then(|| tokio::time::interval_at(Instant::now() + period, period));
        let every = self.inner.check_every;
        let mut change_check = (!every.is_zero())
            .then(|| tokio::time::interval_at(Instant::now() + every, every));

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                Some(command) = commands.recv() => self.handle(command).await,
                _ = tick(&mut stale_check) => {
                    if self.is_stale() {
                        info!("no peer state for {}s, requesting", period.as_secs());
                        self.request_state();
                    }
                }
                _ = tick(&mut change_check) => {
                    self.handle(Command::BroadcastIfChanged).await;
                }
            }
        }

        while let Ok(command) = commands.try_recv() {
            self.handle(command).await;
        }
    }

    async fn handle(&self, command: Command) {
        let result = match command {
            Command::RequestState => {
                self.request_state();
                Ok(())
            }
            Command::Respond { requester } => self.respond(&requester).await,
            Command::Apply {
                origin,
                timestamp,
                bundle,
            } => self.apply(&origin, timestamp, &bundle).await.map(|_| ()),
            Command::Broadcast => self.broadcast_data_update().await.map(|_| ()),
            Command::BroadcastIfChanged => self.broadcast_if_changed().await.map(|_| ()),
        };
        if let Err(e) = result {
            warn!("sync failed: {}", e);
        }
    }
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[path = "coordinator_tests.rs"]
mod tests;
