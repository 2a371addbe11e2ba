// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Relay state.
//!
//! Holds the event ring and the broadcast channel every connection listens
//! on. Events are stamped and broadcast under one lock, so every client sees
//! ids in increasing order.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::broadcast;

use tl_core::protocol::ServerMessage;
use tl_core::{DomainEvent, EventRing};

/// Shared relay state. Cheap to clone.
#[derive(Clone)]
pub struct RelayState {
    inner: Arc<RelayStateInner>,
}

struct RelayStateInner {
    ring: Mutex<EventRing>,
    broadcast_tx: broadcast::Sender<ServerMessage>,
    /// Connected client ids with their connection count.
    peers: Mutex<HashMap<String, usize>>,
}

impl RelayState {
    pub fn new(ring_capacity: usize) -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        RelayState {
            inner: Arc::new(RelayStateInner {
                ring: Mutex::new(EventRing::new(ring_capacity)),
                broadcast_tx,
                peers: Mutex::new(HashMap::new()),
            }),
        }
    }

    fn ring(&self) -> MutexGuard<'_, EventRing> {
        self.inner.ring.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn peers(&self) -> MutexGuard<'_, HashMap<String, usize>> {
        self.inner.peers.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Stamps `event` with the next ring id and broadcasts it to every
    /// connection, the publisher included.
    pub fn publish(&self, event: DomainEvent) -> DomainEvent {
        let mut ring = self.ring();
        let stamped = ring.push(event);
        // No receivers is fine: nobody is connected.
        let _ = self
            .inner
            .broadcast_tx
            .send(ServerMessage::event(stamped.clone()));
        stamped
    }

    /// Buffered events after `after`, oldest first.
    pub fn since(&self, after: u64) -> Vec<DomainEvent> {
        self.ring().since(after)
    }

    pub fn latest_id(&self) -> u64 {
        self.ring().latest_id()
    }

    /// Subscribes to broadcasts and reads the latest id in one step, so the
    /// subscriber sees every event after that id.
    pub fn subscribe(&self) -> (broadcast::Receiver<ServerMessage>, u64) {
        let ring = self.ring();
        (self.inner.broadcast_tx.subscribe(), ring.latest_id())
    }

    /// Records a connection for `client_id`. True for its first connection.
    pub fn join(&self, client_id: &str) -> bool {
        let mut peers = self.peers();
        let count = peers.entry(client_id.to_string()).or_insert(0);
        *count += 1;
        *count == 1
    }

    /// Forgets a connection for `client_id`. True once its last one is gone.
    pub fn leave(&self, client_id: &str) -> bool {
        let mut peers = self.peers();
        match peers.get_mut(client_id) {
            Some(count) if *count > 1 => {
                *count -= 1;
                false
            }
            Some(_) => {
                peers.remove(client_id);
                true
            }
            None => false,
        }
    }

    pub fn peer_count(&self) -> usize {
        self.peers().len()
    }
}
