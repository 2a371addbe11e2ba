// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use chrono::Duration;
use yare::parameterized;

#[parameterized(
    general = { "general", Category::General },
    hyphenated = { "name-change", Category::NameChange },
    underscored = { "name_change", Category::NameChange },
    upper = { "TRANSFER", Category::Transfer },
    late_death = { "late-death-registration", Category::LateDeathRegistration },
)]
fn category_from_str(input: &str, expected: Category) {
    assert_eq!(input.parse::<Category>().unwrap(), expected);
}

#[test]
fn category_from_str_rejects_unknown() {
    assert!(matches!(
        "lunch".parse::<Category>(),
        Err(Error::InvalidCategory(_))
    ));
}

#[test]
fn subcategory_from_str() {
    assert_eq!("Priority".parse::<Subcategory>().unwrap(), Subcategory::Priority);
    assert!("vip".parse::<Subcategory>().is_err());
}

#[parameterized(
    first = { Category::General, 1, "G001" },
    seventh = { Category::General, 7, "G007" },
    marriage = { Category::Marriage, 42, "M042" },
    wide = { Category::Transfer, 1234, "T1234" },
)]
fn code_format(category: Category, sequence: u32, expected: &str) {
    assert_eq!(category.code_for(sequence), expected);
}

#[test]
fn category_prefixes_are_distinct() {
    let mut prefixes: Vec<char> = Category::ALL.iter().map(Category::prefix).collect();
    prefixes.sort_unstable();
    prefixes.dedup();
    assert_eq!(prefixes.len(), Category::ALL.len());
}

#[test]
fn new_ticket_is_consistent_waiting() {
    let ticket = Ticket::new(
        "t-1".into(),
        "G001".into(),
        Category::General,
        Subcategory::Normal,
        Utc::now(),
    );
    assert_eq!(ticket.state, TicketState::Waiting);
    assert!(ticket.is_consistent());
}

#[test]
fn called_ticket_without_service_point_is_inconsistent() {
    let mut ticket = Ticket::new(
        "t-1".into(),
        "G001".into(),
        Category::General,
        Subcategory::Normal,
        Utc::now(),
    );
    ticket.state = TicketState::Called;
    ticket.called_at = Some(Utc::now());
    assert!(!ticket.is_consistent());

    ticket.service_point = Some("1".into());
    assert!(ticket.is_consistent());
}

#[test]
fn ticket_serializes_category_as_snake_case() {
    let ticket = Ticket::new(
        "t-1".into(),
        "D001".into(),
        Category::LateDeathRegistration,
        Subcategory::Special,
        Utc::now(),
    );
    let json = serde_json::to_value(&ticket).unwrap();
    assert_eq!(json["category"], "late_death_registration");
    assert_eq!(json["state"], "waiting");
    assert!(json.get("called_at").is_none());
}

#[test]
fn elapsed_clamps_negative_durations() {
    let now = Utc::now();
    assert_eq!(elapsed_ms(now, now + Duration::milliseconds(250)), 250);
    assert_eq!(elapsed_ms(now, now - Duration::seconds(1)), 0);
}
