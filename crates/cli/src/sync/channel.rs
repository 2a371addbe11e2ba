// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! The event channel: carries shareable bus events between clients.
//!
//! One background task owns the transport. It forwards everything the local
//! bus publishes to the relay, dispatches relayed events from other clients
//! back into the bus, keeps the connection alive with heartbeats and
//! reconnects on a fixed interval when it drops.
//!
//! After `fallback_after_failures` consecutive failed attempts the channel
//! switches to the shared [`PollQueue`]: outbound events are appended to the
//! queue and other clients' entries are read on a fixed interval. Reconnect
//! attempts continue in the background until `max_reconnect_attempts` is
//! reached; after that only [`ChannelHandle::reconnect`] tries again.
//!
//! # Ordering
//!
//! Events sent over one transport arrive in the order they were published.
//! Across the two paths there is no ordering guarantee: events queued while
//! in fallback may be read by a peer after events that peer received later
//! through the relay. Consumers apply events as upserts, so they converge.
//!
//! Transport failures never reach the caller. They surface as
//! [`ConnectionStatus`] events on the bus.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tl_core::protocol::{ClientMessage, ServerMessage};
use tl_core::{ConnectionStatus, DomainEvent, EventBus, EventPayload};

use super::queue::PollQueue;
use super::transport::{Transport, TransportResult};
use crate::config::RemoteConfig;

/// Events held while reconnecting, before the poll queue takes over.
const MAX_PENDING: usize = 1000;

/// Timing and thresholds for an [`EventChannel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    pub url: String,
    pub reconnect_interval: Duration,
    pub max_reconnect_attempts: u32,
    pub fallback_after_failures: u32,
    /// `None` disables heartbeats.
    pub heartbeat_interval: Option<Duration>,
    pub heartbeat_timeout: Duration,
    pub poll_interval: Duration,
}

impl From<&RemoteConfig> for ChannelConfig {
    fn from(remote: &RemoteConfig) -> Self {
        ChannelConfig {
            url: remote.url.clone(),
            reconnect_interval: Duration::from_millis(remote.reconnect_interval_ms),
            max_reconnect_attempts: remote.max_reconnect_attempts,
            fallback_after_failures: remote.fallback_after_failures,
            heartbeat_interval: (remote.heartbeat_interval_ms > 0)
                .then(|| Duration::from_millis(remote.heartbeat_interval_ms)),
            heartbeat_timeout: Duration::from_millis(remote.heartbeat_timeout_ms),
            poll_interval: Duration::from_millis(remote.poll_interval_ms),
        }
    }
}

/// Which path outbound events take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Primary,
    Fallback,
}

/// Control surface for a running [`EventChannel`]. Cheap to clone.
#[derive(Clone)]
pub struct ChannelHandle {
    reconnect: Arc<Notify>,
    status: watch::Receiver<ConnectionStatus>,
    cancel: CancellationToken,
}

impl ChannelHandle {
    /// Asks the channel to reconnect now, resetting its attempt counters.
    ///
    /// This is the only way out of a fallback that stopped retrying.
    pub fn reconnect(&self) {
        self.reconnect.notify_one();
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// Waits until the status satisfies `pred` and returns it.
    ///
    /// Returns the last status if the channel stops first.
    pub async fn wait_for<F>(&self, pred: F) -> ConnectionStatus
    where
        F: Fn(&ConnectionStatus) -> bool,
    {
        let mut status = self.status.clone();
        loop {
            let current = *status.borrow_and_update();
            if pred(&current) {
                return current;
            }
            if status.changed().await.is_err() {
                return *status.borrow();
            }
        }
    }

    /// Stops the channel after it flushes queued events.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

/// Background task carrying events between the local bus and other clients.
pub struct EventChannel<T: Transport> {
    transport: T,
    bus: EventBus,
    config: ChannelConfig,
    queue: PollQueue,
    outbound: mpsc::UnboundedReceiver<DomainEvent>,
    reconnect: Arc<Notify>,
    cancel: CancellationToken,
    status: watch::Sender<ConnectionStatus>,

    mode: Mode,
    /// Consecutive failed attempts, reset by a successful connect.
    failures: u32,
    /// False once `max_reconnect_attempts` is exhausted.
    retrying: bool,
    /// Set by the first welcome. Later welcomes catch up from `last_event_id`.
    welcomed: bool,
    /// Highest relay event id seen.
    last_event_id: u64,
    /// Live events held back while a catch-up request is outstanding.
    held: Option<Vec<DomainEvent>>,
    /// Highest poll queue sequence read.
    poll_cursor: u64,
    pending: VecDeque<DomainEvent>,
    ping_id: u64,

    reconnect_at: Option<Instant>,
    heartbeat_at: Option<Instant>,
    pong_deadline: Option<Instant>,
    poll_at: Option<Instant>,
}

impl<T: Transport + 'static> EventChannel<T> {
    /// Creates a channel bound to `bus`. Attaches the bus's outbound queue.
    ///
    /// Nothing happens until [`run`](Self::run) or [`spawn`](Self::spawn).
    pub fn new(
        transport: T,
        bus: EventBus,
        config: ChannelConfig,
        queue: PollQueue,
    ) -> (Self, ChannelHandle) {
        let outbound = bus.attach_outbound();
        let reconnect = Arc::new(Notify::new());
        let cancel = CancellationToken::new();
        let (status, status_rx) = watch::channel(ConnectionStatus::Disconnected);

        // Entries already in the queue predate this client.
        let poll_cursor = queue.latest_seq().unwrap_or_else(|e| {
            warn!("poll queue unreadable, reading from the start: {}", e);
            0
        });

        let handle = ChannelHandle {
            reconnect: Arc::clone(&reconnect),
            status: status_rx,
            cancel: cancel.clone(),
        };
        let channel = EventChannel {
            transport,
            bus,
            config,
            queue,
            outbound,
            reconnect,
            cancel,
            status,
            mode: Mode::Primary,
            failures: 0,
            retrying: true,
            welcomed: false,
            last_event_id: 0,
            held: None,
            poll_cursor,
            pending: VecDeque::new(),
            ping_id: 0,
            reconnect_at: None,
            heartbeat_at: None,
            pong_deadline: None,
            poll_at: None,
        };
        (channel, handle)
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Runs until [`ChannelHandle::shutdown`].
    pub async fn run(mut self) {
        self.set_status(ConnectionStatus::Connecting);
        self.try_connect().await;

        loop {
            let connected = self.transport.is_connected();
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => break,

                _ = self.reconnect.notified() => self.manual_reconnect().await,

                result = self.transport.recv(), if connected => {
                    self.handle_incoming(result).await;
                }

                Some(event) = self.outbound.recv() => self.forward(event).await,

                _ = sleep_until(self.pong_deadline) => {
                    self.connection_lost("heartbeat timeout").await;
                }

                _ = sleep_until(self.heartbeat_at) => self.heartbeat().await,

                _ = sleep_until(self.reconnect_at) => self.try_connect().await,

                _ = sleep_until(self.poll_at) => self.poll_fallback(),
            }
        }

        self.finish().await;
    }

    async fn try_connect(&mut self) {
        self.reconnect_at = None;
        match self.open_session().await {
            Ok(()) => self.connected().await,
            Err(e) => self.connect_failed(&e.to_string()),
        }
    }

    async fn open_session(&mut self) -> TransportResult<()> {
        self.transport.connect(&self.config.url).await?;
        if let Err(e) = self
            .transport
            .send(ClientMessage::hello(self.bus.origin()))
            .await
        {
            let _ = self.transport.disconnect().await;
            return Err(e);
        }
        Ok(())
    }

    async fn connected(&mut self) {
        info!("connected to relay at {}", self.config.url);
        if self.mode == Mode::Fallback {
            info!("leaving poll queue fallback");
        }
        self.mode = Mode::Primary;
        self.failures = 0;
        self.retrying = true;
        self.poll_at = None;
        self.pong_deadline = None;
        self.heartbeat_at = self.config.heartbeat_interval.map(|i| Instant::now() + i);
        self.set_status(ConnectionStatus::Connected);

        while let Some(event) = self.pending.pop_front() {
            if let Err(e) = self.transport.send(ClientMessage::publish(event.clone())).await {
                self.pending.push_front(event);
                self.connection_lost(&e.to_string()).await;
                return;
            }
        }
    }

    fn connect_failed(&mut self, reason: &str) {
        self.failures += 1;
        warn!(
            "relay connection attempt {} failed: {}",
            self.failures, reason
        );

        if self.mode == Mode::Primary && self.failures >= self.config.fallback_after_failures {
            self.enter_fallback();
        }

        if self.failures >= self.config.max_reconnect_attempts {
            warn!(
                "giving up on relay after {} attempts, staying on the poll queue",
                self.failures
            );
            if self.mode == Mode::Primary {
                self.enter_fallback();
            }
            self.retrying = false;
            self.reconnect_at = None;
        } else {
            self.reconnect_at = Some(Instant::now() + self.config.reconnect_interval);
        }

        let status = match self.mode {
            Mode::Fallback => ConnectionStatus::Fallback {
                retrying: self.retrying,
            },
            Mode::Primary => ConnectionStatus::Reconnecting {
                attempt: self.failures,
            },
        };
        self.set_status(status);
    }

    fn enter_fallback(&mut self) {
        info!("switching to poll queue at {}", self.queue.path().display());
        self.mode = Mode::Fallback;
        self.poll_at = Some(Instant::now());
        while let Some(event) = self.pending.pop_front() {
            self.enqueue(&event);
        }
    }

    async fn connection_lost(&mut self, reason: &str) {
        warn!("relay connection lost: {}", reason);
        let _ = self.transport.disconnect().await;
        self.held = None;
        self.heartbeat_at = None;
        self.pong_deadline = None;
        self.failures = 0;
        self.retrying = true;
        self.reconnect_at = Some(Instant::now() + self.config.reconnect_interval);
        self.set_status(ConnectionStatus::Reconnecting { attempt: 1 });
    }

    async fn manual_reconnect(&mut self) {
        info!("manual reconnect requested");
        if self.transport.is_connected() {
            let _ = self.transport.disconnect().await;
            self.held = None;
            self.heartbeat_at = None;
            self.pong_deadline = None;
        }
        self.failures = 0;
        self.retrying = true;
        self.set_status(ConnectionStatus::Connecting);
        self.try_connect().await;
    }

    async fn forward(&mut self, event: DomainEvent) {
        match self.mode {
            Mode::Fallback => self.enqueue(&event),
            Mode::Primary if self.transport.is_connected() => {
                let msg = ClientMessage::publish(event.clone());
                if let Err(e) = self.transport.send(msg).await {
                    self.hold(event);
                    self.connection_lost(&e.to_string()).await;
                }
            }
            Mode::Primary => self.hold(event),
        }
    }

    fn hold(&mut self, event: DomainEvent) {
        if self.pending.len() >= MAX_PENDING {
            if let Some(dropped) = self.pending.pop_front() {
                warn!("outbound buffer full, dropping event #{}", dropped.id);
            }
        }
        self.pending.push_back(event);
    }

    fn enqueue(&self, event: &DomainEvent) {
        match self.queue.push(event) {
            Ok(seq) => debug!("queued {} #{} as entry {}", event.kind(), event.id, seq),
            Err(e) => warn!("failed to queue {} #{}: {}", event.kind(), event.id, e),
        }
    }

    async fn handle_incoming(&mut self, result: TransportResult<Option<ServerMessage>>) {
        match result {
            Ok(Some(msg)) => self.handle_message(msg).await,
            Ok(None) => self.connection_lost("closed by relay").await,
            Err(e) => self.connection_lost(&e.to_string()).await,
        }
    }

    async fn handle_message(&mut self, msg: ServerMessage) {
        match msg {
            ServerMessage::Welcome {
                latest_event_id, ..
            } => self.welcome(latest_event_id).await,
            ServerMessage::Event(event) => match self.held.as_mut() {
                Some(held) => held.push(event),
                None => self.deliver(event),
            },
            ServerMessage::CatchUpResponse { events } => {
                debug!("catch-up returned {} events", events.len());
                let held = self.held.take().unwrap_or_default();
                for event in events.into_iter().chain(held) {
                    self.deliver(event);
                }
            }
            ServerMessage::Pong { id } => {
                if id == self.ping_id {
                    self.pong_deadline = None;
                }
            }
            ServerMessage::Error { message } => warn!("relay error: {}", message),
        }
    }

    async fn welcome(&mut self, latest_event_id: u64) {
        if !self.welcomed {
            // First session: peers' full state arrives through the coordinator.
            self.welcomed = true;
            self.last_event_id = latest_event_id;
        } else if latest_event_id < self.last_event_id {
            warn!("relay buffer restarted, event ids reset");
            self.last_event_id = latest_event_id;
        } else if latest_event_id > self.last_event_id {
            debug!("catching up after event #{}", self.last_event_id);
            let msg = ClientMessage::catch_up(self.last_event_id);
            self.held = Some(Vec::new());
            if let Err(e) = self.transport.send(msg).await {
                self.connection_lost(&e.to_string()).await;
            }
        }
    }

    fn deliver(&mut self, event: DomainEvent) {
        if event.id <= self.last_event_id {
            return;
        }
        self.last_event_id = event.id;
        if event.origin != self.bus.origin() {
            self.bus.dispatch_remote(&event);
        }
    }

    async fn heartbeat(&mut self) {
        self.heartbeat_at = self.config.heartbeat_interval.map(|i| Instant::now() + i);
        self.ping_id += 1;
        if let Err(e) = self.transport.send(ClientMessage::ping(self.ping_id)).await {
            self.connection_lost(&e.to_string()).await;
            return;
        }
        if self.pong_deadline.is_none() {
            self.pong_deadline = Some(Instant::now() + self.config.heartbeat_timeout);
        }
    }

    fn poll_fallback(&mut self) {
        self.poll_at = Some(Instant::now() + self.config.poll_interval);
        match self.queue.poll(self.poll_cursor, self.bus.origin()) {
            Ok(entries) => {
                for entry in entries {
                    self.poll_cursor = self.poll_cursor.max(entry.seq);
                    self.bus.dispatch_remote(&entry.event);
                }
            }
            Err(e) => warn!("failed to read poll queue: {}", e),
        }
    }

    /// Sends or queues whatever was published before shutdown, then closes.
    async fn finish(&mut self) {
        while let Ok(event) = self.outbound.try_recv() {
            self.forward(event).await;
        }
        while let Some(event) = self.pending.pop_front() {
            self.enqueue(&event);
        }
        if self.transport.is_connected() {
            let _ = self.transport.disconnect().await;
        }
        self.bus.detach_outbound();
        self.set_status(ConnectionStatus::Disconnected);
        info!("event channel stopped");
    }

    fn set_status(&mut self, status: ConnectionStatus) {
        if *self.status.borrow() == status {
            return;
        }
        debug!("connection status: {:?}", status);
        self.status.send_replace(status);
        self.bus.publish(EventPayload::ConnectionStatus { status });
    }
}

/// Sleeps until `deadline`, or forever when there is none.
async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[path = "channel_tests.rs"]
mod tests;
