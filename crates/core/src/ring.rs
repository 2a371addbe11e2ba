// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded buffer of recent events for late-joiner catch-up.

use std::collections::VecDeque;

use crate::event::DomainEvent;

/// Events kept by default.
pub const DEFAULT_RING_CAPACITY: usize = 1000;

/// Keeps the last `capacity` events and assigns each one a monotonically
/// increasing id as it is pushed. Ids start at 1; 0 means "nothing seen".
#[derive(Debug)]
pub struct EventRing {
    capacity: usize,
    events: VecDeque<DomainEvent>,
    next_id: u64,
}

impl EventRing {
    pub fn new(capacity: usize) -> Self {
        EventRing {
            capacity: capacity.max(1),
            events: VecDeque::with_capacity(capacity.clamp(1, DEFAULT_RING_CAPACITY)),
            next_id: 1,
        }
    }

    /// Stamps `event` with the next id, stores it and returns the stamped copy.
    /// The oldest event is dropped once the buffer is full.
    pub fn push(&mut self, mut event: DomainEvent) -> DomainEvent {
        event.id = self.next_id;
        self.next_id += 1;
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event.clone());
        event
    }

    /// Buffered events with an id greater than `after`, oldest first.
    pub fn since(&self, after: u64) -> Vec<DomainEvent> {
        let start = self.events.partition_point(|e| e.id <= after);
        self.events.range(start..).cloned().collect()
    }

    /// Id of the newest event, 0 when nothing has been pushed.
    pub fn latest_id(&self) -> u64 {
        self.next_id - 1
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl Default for EventRing {
    fn default() -> Self {
        Self::new(DEFAULT_RING_CAPACITY)
    }
}

#[cfg(test)]
#[path = "ring_tests.rs"]
mod tests;
