// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use crate::event::{EventBus, EventPayload};
use crate::ticket::{Category, Subcategory, Ticket};
use chrono::Utc;
use yare::parameterized;

fn test_event() -> DomainEvent {
    let bus = EventBus::new("c-proto");
    bus.publish(EventPayload::TicketCreated {
        ticket: Ticket::new(
            "t-1".into(),
            "G001".into(),
            Category::General,
            Subcategory::Normal,
            Utc::now(),
        ),
    })
}

#[parameterized(
    hello = { ClientMessage::hello("c-1"), "hello" },
    catch_up = { ClientMessage::catch_up(17), "catch_up" },
    ping = { ClientMessage::ping(12345), "ping" },
)]
fn client_message_has_type_tag(msg: ClientMessage, tag: &str) {
    let json: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
    assert_eq!(json["type"], tag);
    assert_eq!(ClientMessage::from_json(&msg.to_json().unwrap()).unwrap(), msg);
}

#[test]
fn publish_carries_the_whole_event() {
    let event = test_event();
    let msg = ClientMessage::publish(event.clone());
    let parsed = ClientMessage::from_json(&msg.to_json().unwrap()).unwrap();
    assert_eq!(parsed, ClientMessage::Publish { event });
}

#[test]
fn event_message_flattens_envelope() {
    let event = test_event();
    let json: serde_json::Value =
        serde_json::from_str(&ServerMessage::event(event.clone()).to_json().unwrap()).unwrap();

    assert_eq!(json["type"], "event");
    assert_eq!(json["origin"], "c-proto");
    assert_eq!(json["payload"]["type"], "ticket_created");

    let parsed = ServerMessage::from_json(&json.to_string()).unwrap();
    assert_eq!(parsed, ServerMessage::Event(event));
}

#[test]
fn catch_up_response_keeps_order() {
    let first = test_event();
    let mut second = test_event();
    second.id = first.id + 1;
    let msg = ServerMessage::catch_up_response(vec![first.clone(), second.clone()]);

    let parsed = ServerMessage::from_json(&msg.to_json().unwrap()).unwrap();
    assert_eq!(
        parsed,
        ServerMessage::CatchUpResponse {
            events: vec![first, second]
        }
    );
}

#[test]
fn welcome_and_error_parse() {
    let welcome = ServerMessage::from_json(
        r#"{"type":"welcome","client_id":"c-1","latest_event_id":5}"#,
    )
    .unwrap();
    assert_eq!(welcome, ServerMessage::welcome("c-1", 5));

    let error = ServerMessage::from_json(r#"{"type":"error","message":"bad"}"#).unwrap();
    assert_eq!(error, ServerMessage::error("bad"));
}

#[test]
fn unknown_message_type_is_rejected() {
    assert!(ClientMessage::from_json(r#"{"type":"subscribe"}"#).is_err());
    assert!(ServerMessage::from_json("not json").is_err());
}
