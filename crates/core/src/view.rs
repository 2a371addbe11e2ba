// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Read-only projection of the queue built from events.
//!
//! Observers that do not own a ledger (a display board, a remote status
//! panel) keep a [`QueueView`] and feed it every event they receive. Applying
//! an event is an upsert keyed by ticket id, so replaying events that were
//! already applied leaves the view unchanged.

use std::collections::BTreeMap;

use crate::bundle::StateBundle;
use crate::event::{DomainEvent, EventPayload};
use crate::ticket::{Category, Ticket, TicketState};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueView {
    tickets: BTreeMap<String, Ticket>,
    completed: usize,
    last_event_id: u64,
}

impl QueueView {
    pub fn new() -> Self {
        Self::default()
    }

    /// A view of a full state bundle.
    pub fn from_bundle(bundle: &StateBundle) -> Self {
        let mut view = Self::new();
        view.load(bundle);
        view
    }

    fn load(&mut self, bundle: &StateBundle) {
        self.tickets = bundle
            .tickets
            .iter()
            .map(|t| (t.id.clone(), t.clone()))
            .collect();
        self.completed = bundle.history.len();
    }

    /// Folds one event into the view. Returns true if the view changed.
    pub fn apply(&mut self, event: &DomainEvent) -> bool {
        self.last_event_id = self.last_event_id.max(event.id);
        match &event.payload {
            EventPayload::TicketCreated { ticket }
            | EventPayload::TicketCalled { ticket }
            | EventPayload::TicketDirected { ticket } => self.upsert(ticket),
            EventPayload::TicketCompleted { ticket, .. } => {
                let changed = self.upsert(ticket);
                if changed {
                    self.completed += 1;
                }
                changed
            }
            EventPayload::TicketCancelled { ticket } => self.tickets.remove(&ticket.id).is_some(),
            EventPayload::DataResponse { bundle, .. } | EventPayload::DataUpdate { bundle, .. } => {
                let before = self.clone();
                self.load(bundle);
                self.tickets != before.tickets || self.completed != before.completed
            }
            _ => false,
        }
    }

    fn upsert(&mut self, ticket: &Ticket) -> bool {
        if let Some(existing) = self.tickets.get(&ticket.id) {
            // A replayed older event must not move a ticket backwards.
            if existing == ticket || progress(ticket) < progress(existing) {
                return false;
            }
        }
        self.tickets.insert(ticket.id.clone(), ticket.clone());
        true
    }

    /// Highest event id applied so far.
    pub fn last_event_id(&self) -> u64 {
        self.last_event_id
    }

    pub fn ticket(&self, id: &str) -> Option<&Ticket> {
        self.tickets.get(id)
    }

    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }

    pub fn completed_count(&self) -> usize {
        self.completed
    }

    /// Waiting tickets, oldest first.
    pub fn waiting(&self, category: Option<Category>) -> Vec<&Ticket> {
        let mut waiting: Vec<&Ticket> = self
            .tickets
            .values()
            .filter(|t| t.state == TicketState::Waiting)
            .filter(|t| category.map_or(true, |c| t.category == c))
            .collect();
        waiting.sort_by_key(|t| t.issued_at);
        waiting
    }

    /// The most recently called ticket.
    pub fn displayed(&self) -> Option<&Ticket> {
        self.tickets
            .values()
            .filter(|t| t.called_at.is_some())
            .max_by_key(|t| t.called_at)
    }
}

/// Orders ticket snapshots by how far along the lifecycle they are.
fn progress(ticket: &Ticket) -> (u8, Option<chrono::DateTime<chrono::Utc>>) {
    let rank = match ticket.state {
        TicketState::Waiting => 0,
        TicketState::Called => 1,
        TicketState::Completed => 2,
    };
    (rank, ticket.called_at)
}

#[cfg(test)]
#[path = "view_tests.rs"]
mod tests;
