// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Domain events and the in-process event bus.
//!
//! The bus is the one publish/subscribe path in a client process. Local
//! producers (ledger, backups, the event channel's status reporting) call
//! [`EventBus::publish`]; events arriving from other clients are injected
//! with [`EventBus::dispatch_remote`]. Both reach the same handlers.
//!
//! Locally published events that other clients care about are also pushed to
//! the outbound queue returned by [`EventBus::attach_outbound`], which the
//! event channel drains onto the network.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use crate::backup::BackupKind;
use crate::bundle::StateBundle;
use crate::hlc::Hlc;
use crate::ticket::{ServiceRecord, Ticket};

/// Discriminant of [`EventPayload`], used for subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    TicketCreated,
    TicketCalled,
    TicketDirected,
    TicketCompleted,
    TicketCancelled,
    SystemBackup,
    SystemRestore,
    ConnectionStatus,
    PeerJoined,
    PeerLeft,
    DataRequested,
    DataResponse,
    DataUpdate,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::TicketCreated => "ticket_created",
            EventKind::TicketCalled => "ticket_called",
            EventKind::TicketDirected => "ticket_directed",
            EventKind::TicketCompleted => "ticket_completed",
            EventKind::TicketCancelled => "ticket_cancelled",
            EventKind::SystemBackup => "system_backup",
            EventKind::SystemRestore => "system_restore",
            EventKind::ConnectionStatus => "connection_status",
            EventKind::PeerJoined => "peer_joined",
            EventKind::PeerLeft => "peer_left",
            EventKind::DataRequested => "data_requested",
            EventKind::DataResponse => "data_response",
            EventKind::DataUpdate => "data_update",
        }
    }

    /// Events that describe a ticket mutation.
    pub fn is_ticket_mutation(&self) -> bool {
        matches!(
            self,
            EventKind::TicketCreated
                | EventKind::TicketCalled
                | EventKind::TicketDirected
                | EventKind::TicketCompleted
                | EventKind::TicketCancelled
        )
    }

    /// Events that never leave the process that produced them.
    pub fn is_local_only(&self) -> bool {
        matches!(self, EventKind::ConnectionStatus)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Health of the event channel as seen by one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    /// Primary transport down, retrying.
    Reconnecting { attempt: u32 },
    /// Delivering through the poll queue. `retrying` is false once reconnect
    /// attempts are exhausted and only a manual reconnect will leave this mode.
    Fallback { retrying: bool },
    Disconnected,
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }
}

/// What happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    TicketCreated {
        ticket: Ticket,
    },
    TicketCalled {
        ticket: Ticket,
    },
    TicketDirected {
        ticket: Ticket,
    },
    TicketCompleted {
        ticket: Ticket,
        record: ServiceRecord,
    },
    TicketCancelled {
        ticket: Ticket,
    },
    SystemBackup {
        key: String,
        kind: BackupKind,
    },
    SystemRestore {
        key: String,
    },
    ConnectionStatus {
        status: ConnectionStatus,
    },
    PeerJoined {
        client_id: String,
    },
    PeerLeft {
        client_id: String,
    },
    /// A client asks its peers for their full state.
    DataRequested {
        requester: String,
    },
    /// Full state sent to one requester.
    DataResponse {
        target: String,
        timestamp: Hlc,
        bundle: StateBundle,
    },
    /// Full state pushed to every peer after a local mutation.
    DataUpdate {
        timestamp: Hlc,
        bundle: StateBundle,
    },
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::TicketCreated { .. } => EventKind::TicketCreated,
            EventPayload::TicketCalled { .. } => EventKind::TicketCalled,
            EventPayload::TicketDirected { .. } => EventKind::TicketDirected,
            EventPayload::TicketCompleted { .. } => EventKind::TicketCompleted,
            EventPayload::TicketCancelled { .. } => EventKind::TicketCancelled,
            EventPayload::SystemBackup { .. } => EventKind::SystemBackup,
            EventPayload::SystemRestore { .. } => EventKind::SystemRestore,
            EventPayload::ConnectionStatus { .. } => EventKind::ConnectionStatus,
            EventPayload::PeerJoined { .. } => EventKind::PeerJoined,
            EventPayload::PeerLeft { .. } => EventKind::PeerLeft,
            EventPayload::DataRequested { .. } => EventKind::DataRequested,
            EventPayload::DataResponse { .. } => EventKind::DataResponse,
            EventPayload::DataUpdate { .. } => EventKind::DataUpdate,
        }
    }

    /// The ticket carried by ticket events.
    pub fn ticket(&self) -> Option<&Ticket> {
        match self {
            EventPayload::TicketCreated { ticket }
            | EventPayload::TicketCalled { ticket }
            | EventPayload::TicketDirected { ticket }
            | EventPayload::TicketCompleted { ticket, .. }
            | EventPayload::TicketCancelled { ticket } => Some(ticket),
            _ => None,
        }
    }
}

/// An event with its envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    /// Monotonic id. Assigned by the local bus, then replaced by the relay's
    /// ring-buffer id once the event has been relayed.
    pub id: u64,
    /// Client id of the producer.
    pub origin: String,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

impl DomainEvent {
    /// An event produced outside any bus, such as relay presence notices.
    /// The id is left at 0 for the receiver to assign.
    pub fn new(origin: impl Into<String>, payload: EventPayload) -> Self {
        DomainEvent {
            id: 0,
            origin: origin.into(),
            timestamp: Utc::now(),
            payload,
        }
    }

    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}

/// Handle returned by [`EventBus::on`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Arc<dyn Fn(&DomainEvent) + Send + Sync>;

struct Subscription {
    id: SubscriptionId,
    /// `None` subscribes to every kind.
    kind: Option<EventKind>,
    handler: Handler,
}

struct BusInner {
    origin: String,
    next_event_id: AtomicU64,
    next_subscription: AtomicU64,
    subscriptions: RwLock<Vec<Subscription>>,
    outbound: Mutex<Option<mpsc::UnboundedSender<DomainEvent>>>,
}

/// In-process publish/subscribe hub. Cheap to clone.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    /// Creates a bus whose events are stamped with `origin` (the client id).
    pub fn new(origin: impl Into<String>) -> Self {
        EventBus {
            inner: Arc::new(BusInner {
                origin: origin.into(),
                next_event_id: AtomicU64::new(1),
                next_subscription: AtomicU64::new(1),
                subscriptions: RwLock::new(Vec::new()),
                outbound: Mutex::new(None),
            }),
        }
    }

    pub fn origin(&self) -> &str {
        &self.inner.origin
    }

    /// Registers `handler` for events of `kind`.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&DomainEvent) + Send + Sync + 'static,
    {
        self.subscribe(Some(kind), Arc::new(handler))
    }

    /// Registers `handler` for every event.
    pub fn on_any<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&DomainEvent) + Send + Sync + 'static,
    {
        self.subscribe(None, Arc::new(handler))
    }

    fn subscribe(&self, kind: Option<EventKind>, handler: Handler) -> SubscriptionId {
        let id = SubscriptionId(self.inner.next_subscription.fetch_add(1, Ordering::SeqCst));
        self.inner
            .subscriptions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(Subscription { id, kind, handler });
        id
    }

    /// Removes a handler registered with [`on`](Self::on) for `kind`.
    ///
    /// Returns false if no such subscription exists.
    pub fn off(&self, kind: EventKind, id: SubscriptionId) -> bool {
        self.remove(|sub| sub.id == id && sub.kind == Some(kind))
    }

    /// Removes a handler registered with [`on_any`](Self::on_any).
    pub fn off_any(&self, id: SubscriptionId) -> bool {
        self.remove(|sub| sub.id == id && sub.kind.is_none())
    }

    fn remove(&self, matches: impl Fn(&Subscription) -> bool) -> bool {
        let mut subs = self
            .inner
            .subscriptions
            .write()
            .unwrap_or_else(|e| e.into_inner());
        let before = subs.len();
        subs.retain(|sub| !matches(sub));
        subs.len() != before
    }

    /// Starts copying locally published, shareable events to a queue.
    ///
    /// Replaces any previously attached queue.
    pub fn attach_outbound(&self) -> mpsc::UnboundedReceiver<DomainEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.inner.outbound.lock().unwrap_or_else(|e| e.into_inner()) = Some(tx);
        rx
    }

    pub fn detach_outbound(&self) {
        *self.inner.outbound.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// Publishes a locally produced event.
    pub fn publish(&self, payload: EventPayload) -> DomainEvent {
        let event = DomainEvent {
            id: self.inner.next_event_id.fetch_add(1, Ordering::SeqCst),
            origin: self.inner.origin.clone(),
            timestamp: Utc::now(),
            payload,
        };
        debug!("publish {} #{}", event.kind(), event.id);

        self.dispatch(&event);

        if !event.kind().is_local_only() {
            let outbound = self.inner.outbound.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(tx) = outbound.as_ref() {
                if tx.send(event.clone()).is_err() {
                    debug!("outbound queue closed, event #{} stays local", event.id);
                }
            }
        }

        event
    }

    /// Delivers an event received from another client to local handlers.
    pub fn dispatch_remote(&self, event: &DomainEvent) {
        debug!("remote {} #{} from {}", event.kind(), event.id, event.origin);
        self.dispatch(event);
    }

    fn dispatch(&self, event: &DomainEvent) {
        let kind = event.kind();
        // Collect first so handlers may subscribe or unsubscribe.
        let handlers: Vec<Handler> = self
            .inner
            .subscriptions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|sub| sub.kind.map_or(true, |k| k == kind))
            .map(|sub| Arc::clone(&sub.handler))
            .collect();

        for handler in handlers {
            handler(event);
        }
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("origin", &self.inner.origin)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
