// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::TimeZone;

fn at(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

#[test]
fn ticket_id_is_deterministic() {
    let a = generate_ticket_id("c-1", "G001", &at(1000));
    let b = generate_ticket_id("c-1", "G001", &at(1000));
    assert_eq!(a, b);
    assert!(a.starts_with("t-"));
    assert_eq!(a.len(), 2 + 16);
}

#[test]
fn ticket_id_differs_by_origin() {
    let a = generate_ticket_id("c-1", "G001", &at(1000));
    let b = generate_ticket_id("c-2", "G001", &at(1000));
    assert_ne!(a, b);
}

#[test]
fn unique_id_appends_suffix_on_collision() {
    let base = generate_ticket_id("c-1", "G001", &at(1000));
    let taken = [base.clone(), format!("{}-2", base)];
    let id = generate_unique_ticket_id("c-1", "G001", &at(1000), |candidate| {
        taken.iter().any(|t| t == candidate)
    });
    assert_eq!(id, format!("{}-3", base));
}

#[test]
fn client_ids_have_expected_shape() {
    let id = generate_client_id();
    assert!(id.starts_with("c-"));
    assert_eq!(id.len(), 2 + 8);
}

#[test]
fn node_id_is_stable() {
    assert_eq!(node_id_for("c-abc"), node_id_for("c-abc"));
    assert_ne!(node_id_for("c-abc"), node_id_for("c-abd"));
}
