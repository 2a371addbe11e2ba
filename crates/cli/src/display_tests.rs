// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use tl_core::{Category, EventBus, Hlc, StateBundle, Subcategory};
use yare::parameterized;

use super::*;

fn ticket() -> Ticket {
    Ticket::new(
        "t-1".into(),
        "M004".into(),
        Category::Marriage,
        Subcategory::Priority,
        Utc::now(),
    )
}

#[parameterized(
    zero = { 0, "0s" },
    seconds = { 42_999, "42s" },
    minutes = { 192_000, "3m 12s" },
    hours = { 3_900_000, "1h 05m" },
)]
fn durations(ms: u64, expected: &str) {
    assert_eq!(format_duration_ms(ms), expected);
}

#[test]
fn waiting_line_shows_route() {
    let mut ticket = ticket();
    ticket.routed_to = Some("desk-3".into());
    let line = format_waiting(&WaitingTicket {
        ticket,
        waited_ms: 61_000,
    });
    assert!(line.starts_with("M004"));
    assert!(line.contains("marriage"));
    assert!(line.contains("waiting 1m 01s"));
    assert!(line.ends_with("-> desk-3"));
}

#[test]
fn called_line_without_service_point() {
    let line = format_called(&ticket());
    assert!(line.contains(" - "));
    assert!(line.ends_with("(waiting)"));
}

#[test]
fn ticket_events_are_described() {
    let bus = EventBus::new("c-a");
    let mut called = ticket();
    called.service_point = Some("desk-1".into());
    let event = bus.publish(EventPayload::TicketCalled { ticket: called });
    assert!(format_event(&event).unwrap().ends_with("calling M004 at desk-1"));
}

#[test]
fn sync_traffic_is_hidden() {
    let bus = EventBus::new("c-a");
    let event = bus.publish(EventPayload::DataUpdate {
        timestamp: Hlc::zero(),
        bundle: StateBundle::default(),
    });
    assert!(format_event(&event).is_none());
}

#[test]
fn exhausted_fallback_mentions_retry() {
    let bus = EventBus::new("c-a");
    let event = bus.publish(EventPayload::ConnectionStatus {
        status: ConnectionStatus::Fallback { retrying: false },
    });
    assert!(format_event(&event).unwrap().contains("press r to retry"));
}

#[test]
fn board_follows_events() {
    let bus = EventBus::new("c-a");
    let mut view = QueueView::new();
    assert_eq!(format_board(&view), "  0 waiting, 0 served, nobody called yet");

    view.apply(&bus.publish(EventPayload::TicketCreated { ticket: ticket() }));
    assert!(format_board(&view).starts_with("  1 waiting"));

    let mut called = ticket();
    called.state = tl_core::TicketState::Called;
    called.called_at = Some(Utc::now());
    view.apply(&bus.publish(EventPayload::TicketCalled { ticket: called }));
    assert_eq!(format_board(&view), "  0 waiting, 0 served, now serving M004");
}
