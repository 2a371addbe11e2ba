// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use std::sync::atomic::AtomicUsize;

use super::*;
use crate::ticket::{Category, Subcategory};

fn ticket() -> Ticket {
    Ticket::new(
        "t-1".into(),
        "G001".into(),
        Category::General,
        Subcategory::Normal,
        Utc::now(),
    )
}

fn counter() -> (Arc<AtomicUsize>, impl Fn(&DomainEvent) + Send + Sync + 'static) {
    let count = Arc::new(AtomicUsize::new(0));
    let handle = Arc::clone(&count);
    (count, move |_: &DomainEvent| {
        handle.fetch_add(1, Ordering::SeqCst);
    })
}

#[test]
fn handlers_receive_only_their_kind() {
    let bus = EventBus::new("c-1");
    let (created, on_created) = counter();
    let (called, on_called) = counter();
    bus.on(EventKind::TicketCreated, on_created);
    bus.on(EventKind::TicketCalled, on_called);

    bus.publish(EventPayload::TicketCreated { ticket: ticket() });

    assert_eq!(created.load(Ordering::SeqCst), 1);
    assert_eq!(called.load(Ordering::SeqCst), 0);
}

#[test]
fn on_any_sees_everything() {
    let bus = EventBus::new("c-1");
    let (seen, handler) = counter();
    bus.on_any(handler);

    bus.publish(EventPayload::TicketCreated { ticket: ticket() });
    bus.publish(EventPayload::SystemRestore { key: "k".into() });

    assert_eq!(seen.load(Ordering::SeqCst), 2);
}

#[test]
fn off_stops_delivery() {
    let bus = EventBus::new("c-1");
    let (seen, handler) = counter();
    let id = bus.on(EventKind::TicketCreated, handler);

    assert!(!bus.off(EventKind::TicketCalled, id));
    assert!(bus.off(EventKind::TicketCreated, id));
    assert!(!bus.off(EventKind::TicketCreated, id));

    bus.publish(EventPayload::TicketCreated { ticket: ticket() });
    assert_eq!(seen.load(Ordering::SeqCst), 0);
}

#[test]
fn publish_assigns_increasing_ids_and_origin() {
    let bus = EventBus::new("c-9");
    let a = bus.publish(EventPayload::TicketCreated { ticket: ticket() });
    let b = bus.publish(EventPayload::TicketCalled { ticket: ticket() });
    assert!(b.id > a.id);
    assert_eq!(a.origin, "c-9");
}

#[test]
fn outbound_skips_local_only_events() {
    let bus = EventBus::new("c-1");
    let mut rx = bus.attach_outbound();

    bus.publish(EventPayload::ConnectionStatus {
        status: ConnectionStatus::Connected,
    });
    bus.publish(EventPayload::TicketCreated { ticket: ticket() });

    let forwarded = rx.try_recv().unwrap();
    assert_eq!(forwarded.kind(), EventKind::TicketCreated);
    assert!(rx.try_recv().is_err());
}

#[test]
fn remote_events_are_not_forwarded_back_out() {
    let bus = EventBus::new("c-1");
    let mut rx = bus.attach_outbound();
    let (seen, handler) = counter();
    bus.on(EventKind::TicketCreated, handler);

    let other = EventBus::new("c-2");
    let event = other.publish(EventPayload::TicketCreated { ticket: ticket() });
    bus.dispatch_remote(&event);

    assert_eq!(seen.load(Ordering::SeqCst), 1);
    assert!(rx.try_recv().is_err());
}

#[test]
fn handler_may_subscribe_during_dispatch() {
    let bus = EventBus::new("c-1");
    let inner = bus.clone();
    bus.on(EventKind::TicketCreated, move |_| {
        inner.on(EventKind::TicketCalled, |_| {});
    });
    bus.publish(EventPayload::TicketCreated { ticket: ticket() });
}

#[test]
fn payload_serializes_with_type_tag() {
    let payload = EventPayload::DataRequested {
        requester: "c-1".into(),
    };
    let json = serde_json::to_value(&payload).unwrap();
    assert_eq!(json["type"], "data_requested");
    assert_eq!(json["requester"], "c-1");
}

#[test]
fn ticket_mutations_are_classified() {
    assert!(EventKind::TicketCompleted.is_ticket_mutation());
    assert!(!EventKind::SystemBackup.is_ticket_mutation());
    assert!(EventKind::ConnectionStatus.is_local_only());
}
