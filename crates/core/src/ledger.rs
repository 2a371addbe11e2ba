// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! The ticket ledger: ticket collection, category counters and the state
//! machine that moves tickets from `Waiting` to `Called` to `Completed`.
//!
//! Every mutating operation is one read-modify-write against the store and
//! publishes exactly one event after the write lands. A failed write leaves
//! the store as it was and publishes nothing.
//!
//! Every mutation also writes a fresh hybrid logical clock stamp under
//! [`keys::STAMP`] in the same atomic batch, so the stored state always
//! carries the time of the producer that last changed it, whether or not a
//! sync session is running. Peers compare these stamps for last-writer-wins.
//!
//! Within one process the ledger serializes its writes with an async mutex.
//! Nothing serializes writes across clients: two service points calling the
//! next ticket of the same category at the same moment can both pick the
//! same ticket before either sees the other's write. Replicas converge
//! through whole-state last-writer-wins, not through locking.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::bundle::{keys, Counters, StateBundle};
use crate::error::{Error, Result};
use crate::event::{EventBus, EventPayload};
use crate::hlc::{ClockSource, Hlc, HlcClock, SystemClock};
use crate::id::{generate_unique_ticket_id, node_id_for};
use crate::settings::QueueSettings;
use crate::store::{read_json, to_value, Store};
use crate::ticket::{
    elapsed_ms, Category, ServiceRecord, Subcategory, Ticket, TicketState, WaitingTicket,
};

/// Event-payload key used when an imported bundle replaces the state.
pub const IMPORT_SOURCE: &str = "import";

struct LedgerInner {
    store: Arc<dyn Store>,
    bus: EventBus,
    clock: Arc<dyn ClockSource>,
    hlc: HlcClock<Arc<dyn ClockSource>>,
    write_lock: Mutex<()>,
}

/// Owner of ticket and counter state. Cheap to clone.
#[derive(Clone)]
pub struct Ledger {
    inner: Arc<LedgerInner>,
}

impl Ledger {
    pub fn new(store: Arc<dyn Store>, bus: EventBus) -> Self {
        Self::with_clock(store, bus, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<dyn Store>,
        bus: EventBus,
        clock: Arc<dyn ClockSource>,
    ) -> Self {
        let hlc = HlcClock::with_source(Arc::clone(&clock), node_id_for(bus.origin()));
        Ledger {
            inner: Arc::new(LedgerInner {
                store,
                bus,
                clock,
                hlc,
                write_lock: Mutex::new(()),
            }),
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    fn store(&self) -> &dyn Store {
        self.inner.store.as_ref()
    }

    pub(crate) fn shared_store(&self) -> Arc<dyn Store> {
        Arc::clone(&self.inner.store)
    }

    fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now_utc()
    }

    async fn stored_stamp(&self) -> Result<Option<Hlc>> {
        read_json(self.store(), keys::STAMP).await
    }

    /// Issues a stamp after the stored one. Another process sharing the
    /// store may have written it, so it is read each time. Call with the
    /// write lock held.
    async fn next_stamp(&self) -> Result<Hlc> {
        if let Some(stored) = self.stored_stamp().await? {
            self.inner.hlc.observe(&stored);
        }
        Ok(self.inner.hlc.now())
    }

    /// Writes `entries` together with a fresh stamp. Call with the write
    /// lock held.
    async fn write_stamped(&self, mut entries: Vec<(String, Value)>) -> Result<Hlc> {
        let stamp = self.next_stamp().await?;
        entries.push((keys::STAMP.to_string(), to_value(&stamp)?));
        self.store().set_many(entries).await?;
        Ok(stamp)
    }

    async fn tickets(&self) -> Result<Vec<Ticket>> {
        Ok(read_json(self.store(), keys::TICKETS)
            .await?
            .unwrap_or_default())
    }

    /// Issues a new waiting ticket.
    ///
    /// The counter increment and the new ticket are written together, so a
    /// failed write leaves the counter at its previous value.
    pub async fn issue(&self, category: Category, subcategory: Subcategory) -> Result<Ticket> {
        let ticket = {
            let _guard = self.inner.write_lock.lock().await;

            let settings = self.settings().await?;
            if !settings.is_enabled(category) {
                return Err(Error::CategoryDisabled(category));
            }

            let mut counters = self.counters().await?;
            let mut tickets = self.tickets().await?;

            let sequence = counters.get(&category).copied().unwrap_or(0) + 1;
            let code = category.code_for(sequence);
            let now = self.now();
            let id = generate_unique_ticket_id(self.inner.bus.origin(), &code, &now, |candidate| {
                tickets.iter().any(|t| t.id == candidate)
            });
            let ticket = Ticket::new(id, code, category, subcategory, now);

            counters.insert(category, sequence);
            tickets.push(ticket.clone());
            self.write_stamped(vec![
                (keys::COUNTERS.to_string(), to_value(&counters)?),
                (keys::TICKETS.to_string(), to_value(&tickets)?),
            ])
            .await?;
            ticket
        };

        info!("issued {} ({} / {})", ticket.code, category, subcategory);
        self.inner.bus.publish(EventPayload::TicketCreated {
            ticket: ticket.clone(),
        });
        Ok(ticket)
    }

    /// Calls the next waiting ticket of a category/subcategory to
    /// `service_point`.
    ///
    /// Tickets routed to this service point go first, earliest issued first.
    /// Otherwise the earliest issued matching ticket is taken, whatever its
    /// routing. Returns `None` when nothing matches.
    pub async fn call_next(
        &self,
        category: Category,
        subcategory: Subcategory,
        service_point: &str,
    ) -> Result<Option<Ticket>> {
        let ticket = {
            let _guard = self.inner.write_lock.lock().await;
            let mut tickets = self.tickets().await?;
            let Some(index) = select_next(&tickets, category, subcategory, service_point) else {
                debug!(
                    "no waiting {} / {} ticket for service point {}",
                    category, subcategory, service_point
                );
                return Ok(None);
            };

            let ticket = &mut tickets[index];
            ticket.state = TicketState::Called;
            ticket.called_at = Some(self.now());
            ticket.service_point = Some(service_point.to_string());
            let called = ticket.clone();

            self.write_tickets(&tickets).await?;
            called
        };

        info!("called {} to {}", ticket.code, service_point);
        self.inner.bus.publish(EventPayload::TicketCalled {
            ticket: ticket.clone(),
        });
        Ok(Some(ticket))
    }

    /// Directs a waiting ticket to a service point.
    pub async fn route(&self, ticket_id: &str, service_point: &str) -> Result<Ticket> {
        let ticket = self
            .transition(ticket_id, "route", TicketState::Waiting, |ticket, _| {
                ticket.routed_to = Some(service_point.to_string());
            })
            .await?;

        info!("routed {} to {}", ticket.code, service_point);
        self.inner.bus.publish(EventPayload::TicketDirected {
            ticket: ticket.clone(),
        });
        Ok(ticket)
    }

    /// Re-announces a called ticket, refreshing its call time.
    pub async fn reissue_call(&self, ticket_id: &str) -> Result<Ticket> {
        let ticket = self
            .transition(ticket_id, "recall", TicketState::Called, |ticket, now| {
                ticket.called_at = Some(now);
            })
            .await?;

        info!("recalled {}", ticket.code);
        self.inner.bus.publish(EventPayload::TicketCalled {
            ticket: ticket.clone(),
        });
        Ok(ticket)
    }

    /// Completes a called ticket and appends its service record.
    pub async fn complete(
        &self,
        ticket_id: &str,
        actor_id: &str,
    ) -> Result<(Ticket, ServiceRecord)> {
        let (ticket, record) = {
            let _guard = self.inner.write_lock.lock().await;
            let mut tickets = self.tickets().await?;
            let ticket = find_mut(&mut tickets, ticket_id)?;
            check_state(ticket, "complete", TicketState::Called)?;

            let now = self.now();
            ticket.state = TicketState::Completed;
            let ticket = ticket.clone();

            let record = ServiceRecord {
                ticket_id: ticket.id.clone(),
                code: ticket.code.clone(),
                category: ticket.category,
                actor_id: actor_id.to_string(),
                service_point: ticket.service_point.clone(),
                completed_at: now,
                service_duration_ms: ticket
                    .called_at
                    .map(|called| elapsed_ms(called, now))
                    .unwrap_or(0),
            };
            let mut history = self.history().await?;
            history.push(record.clone());

            self.write_stamped(vec![
                (keys::TICKETS.to_string(), to_value(&tickets)?),
                (keys::HISTORY.to_string(), to_value(&history)?),
            ])
            .await?;
            (ticket, record)
        };

        info!(
            "completed {} by {} after {}ms",
            ticket.code, record.actor_id, record.service_duration_ms
        );
        self.inner.bus.publish(EventPayload::TicketCompleted {
            ticket: ticket.clone(),
            record: record.clone(),
        });
        Ok((ticket, record))
    }

    /// Removes a waiting ticket from the queue.
    pub async fn cancel(&self, ticket_id: &str) -> Result<Ticket> {
        let ticket = {
            let _guard = self.inner.write_lock.lock().await;
            let mut tickets = self.tickets().await?;
            let index = tickets
                .iter()
                .position(|t| t.id == ticket_id)
                .ok_or_else(|| Error::TicketNotFound(ticket_id.to_string()))?;
            check_state(&tickets[index], "cancel", TicketState::Waiting)?;

            let ticket = tickets.remove(index);
            self.write_tickets(&tickets).await?;
            ticket
        };

        info!("cancelled {}", ticket.code);
        self.inner.bus.publish(EventPayload::TicketCancelled {
            ticket: ticket.clone(),
        });
        Ok(ticket)
    }

    pub async fn get(&self, ticket_id: &str) -> Result<Ticket> {
        self.tickets()
            .await?
            .into_iter()
            .find(|t| t.id == ticket_id)
            .ok_or_else(|| Error::TicketNotFound(ticket_id.to_string()))
    }

    /// Looks a ticket up by id or display code. Codes are matched
    /// case-insensitively and the newest ticket with that code wins.
    pub async fn find(&self, id_or_code: &str) -> Result<Ticket> {
        let tickets = self.tickets().await?;
        if let Some(ticket) = tickets.iter().find(|t| t.id == id_or_code) {
            return Ok(ticket.clone());
        }
        tickets
            .into_iter()
            .filter(|t| t.code.eq_ignore_ascii_case(id_or_code))
            .max_by_key(|t| t.issued_at)
            .ok_or_else(|| Error::TicketNotFound(id_or_code.to_string()))
    }

    /// Waiting tickets, oldest first, with their current wait time.
    pub async fn list_waiting(&self, category: Option<Category>) -> Result<Vec<WaitingTicket>> {
        let now = self.now();
        let mut waiting: Vec<Ticket> = self
            .tickets()
            .await?
            .into_iter()
            .filter(|t| t.state == TicketState::Waiting)
            .filter(|t| category.map_or(true, |c| t.category == c))
            .collect();
        waiting.sort_by_key(|t| t.issued_at);

        Ok(waiting
            .into_iter()
            .map(|ticket| WaitingTicket {
                waited_ms: elapsed_ms(ticket.issued_at, now),
                ticket,
            })
            .collect())
    }

    /// Tickets that have been called, most recently called first.
    ///
    /// Completed tickets keep their last call time and stay in this list.
    pub async fn list_called(&self, limit: usize) -> Result<Vec<Ticket>> {
        let mut called: Vec<Ticket> = self
            .tickets()
            .await?
            .into_iter()
            .filter(|t| t.called_at.is_some())
            .collect();
        called.sort_by(|a, b| b.called_at.cmp(&a.called_at));
        called.truncate(limit);
        Ok(called)
    }

    /// The most recently called ticket, shown on the public display.
    pub async fn currently_displayed(&self) -> Result<Option<Ticket>> {
        Ok(self.list_called(1).await?.into_iter().next())
    }

    /// Called tickets whose service has run past the configured maximum.
    pub async fn overdue(&self) -> Result<Vec<Ticket>> {
        let limit_ms = self.settings().await?.max_service_ms();
        let now = self.now();
        Ok(self
            .tickets()
            .await?
            .into_iter()
            .filter(|t| t.state == TicketState::Called)
            .filter(|t| {
                t.called_at
                    .is_some_and(|called| elapsed_ms(called, now) > limit_ms)
            })
            .collect())
    }

    pub async fn history(&self) -> Result<Vec<ServiceRecord>> {
        Ok(read_json(self.store(), keys::HISTORY)
            .await?
            .unwrap_or_default())
    }

    pub async fn counters(&self) -> Result<Counters> {
        Ok(read_json(self.store(), keys::COUNTERS)
            .await?
            .unwrap_or_default())
    }

    pub async fn settings(&self) -> Result<QueueSettings> {
        Ok(read_json(self.store(), keys::SETTINGS)
            .await?
            .unwrap_or_default())
    }

    pub async fn save_settings(&self, settings: &QueueSettings) -> Result<()> {
        let _guard = self.inner.write_lock.lock().await;
        self.store().set(keys::SETTINGS, to_value(settings)?).await?;
        Ok(())
    }

    /// Stamp of the last state change, `None` if the state never changed.
    pub async fn stamp(&self) -> Result<Option<Hlc>> {
        self.stored_stamp().await
    }

    /// The full state as one document.
    pub async fn export_bundle(&self) -> Result<StateBundle> {
        let _guard = self.inner.write_lock.lock().await;
        StateBundle::read(self.store()).await
    }

    /// The full state together with its stamp, read as one unit.
    pub async fn export_stamped(&self) -> Result<(StateBundle, Option<Hlc>)> {
        let _guard = self.inner.write_lock.lock().await;
        let bundle = StateBundle::read(self.store()).await?;
        Ok((bundle, self.stored_stamp().await?))
    }

    /// Overwrites the full state, leaving its stamp alone and announcing
    /// nothing. Used to repair a damaged store at start-up.
    pub async fn replace_state(&self, bundle: &StateBundle) -> Result<()> {
        let _guard = self.inner.write_lock.lock().await;
        bundle.write(self.store()).await
    }

    /// Overwrites the full state as a local change under a fresh stamp.
    ///
    /// The caller announces the change.
    pub async fn restore_state(&self, bundle: &StateBundle) -> Result<Hlc> {
        let _guard = self.inner.write_lock.lock().await;
        self.write_stamped(bundle.to_entries()?).await
    }

    /// Overwrites the full state with a peer's bundle if `stamp` is newer
    /// than the stored stamp. Returns false and leaves the state alone
    /// otherwise.
    pub async fn apply_if_newer(&self, bundle: &StateBundle, stamp: Hlc) -> Result<bool> {
        let _guard = self.inner.write_lock.lock().await;
        let current = self.stored_stamp().await?.unwrap_or_else(Hlc::zero);
        if stamp <= current {
            return Ok(false);
        }
        let mut entries = bundle.to_entries()?;
        entries.push((keys::STAMP.to_string(), to_value(&stamp)?));
        self.store().set_many(entries).await?;
        self.inner.hlc.observe(&stamp);
        Ok(true)
    }

    /// Overwrites the full state with an imported document.
    pub async fn import_bundle(&self, bundle: &StateBundle) -> Result<()> {
        self.restore_state(bundle).await?;
        info!("imported {} tickets", bundle.tickets.len());
        self.inner.bus.publish(EventPayload::SystemRestore {
            key: IMPORT_SOURCE.to_string(),
        });
        Ok(())
    }

    async fn write_tickets(&self, tickets: &[Ticket]) -> Result<()> {
        self.write_stamped(vec![(keys::TICKETS.to_string(), to_value(&tickets)?)])
            .await?;
        Ok(())
    }

    /// Applies `apply` to one ticket if it is in state `allowed`, then
    /// persists the collection.
    async fn transition<F>(
        &self,
        ticket_id: &str,
        op: &'static str,
        allowed: TicketState,
        apply: F,
    ) -> Result<Ticket>
    where
        F: FnOnce(&mut Ticket, DateTime<Utc>),
    {
        let _guard = self.inner.write_lock.lock().await;
        let mut tickets = self.tickets().await?;
        let ticket = find_mut(&mut tickets, ticket_id)?;
        check_state(ticket, op, allowed)?;
        apply(ticket, self.now());
        let updated = ticket.clone();
        self.write_tickets(&tickets).await?;
        Ok(updated)
    }
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("store", &self.inner.store.backend())
            .field("bus", &self.inner.bus)
            .finish_non_exhaustive()
    }
}

/// Index of the ticket `call_next` should take.
pub(crate) fn select_next(
    tickets: &[Ticket],
    category: Category,
    subcategory: Subcategory,
    service_point: &str,
) -> Option<usize> {
    let candidates = tickets
        .iter()
        .enumerate()
        .filter(|(_, t)| t.state == TicketState::Waiting && t.matches(category, subcategory));

    let routed = candidates
        .clone()
        .filter(|(_, t)| t.routed_to.as_deref() == Some(service_point))
        .min_by_key(|(_, t)| t.issued_at);

    routed
        .or_else(|| candidates.min_by_key(|(_, t)| t.issued_at))
        .map(|(index, _)| index)
}

fn find_mut<'a>(tickets: &'a mut [Ticket], ticket_id: &str) -> Result<&'a mut Ticket> {
    tickets
        .iter_mut()
        .find(|t| t.id == ticket_id)
        .ok_or_else(|| Error::TicketNotFound(ticket_id.to_string()))
}

fn check_state(ticket: &Ticket, op: &'static str, allowed: TicketState) -> Result<()> {
    if ticket.state == allowed {
        Ok(())
    } else {
        Err(Error::InvalidTransition {
            ticket: ticket.code.clone(),
            from: ticket.state,
            op,
            allowed,
        })
    }
}

#[cfg(test)]
#[path = "ledger_tests.rs"]
mod tests;
