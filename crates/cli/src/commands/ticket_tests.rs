// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use tl_core::{Category, TicketState};

use super::*;
use crate::commands::testing::{kind, TestContext};

#[tokio::test]
async fn issue_numbers_per_category() {
    let ctx = TestContext::new().await;
    let first = issue(&ctx.engine, &kind("general"), OutputFormat::Text)
        .await
        .unwrap();
    let other = issue(&ctx.engine, &kind("transfer"), OutputFormat::Json)
        .await
        .unwrap();
    let second = issue(&ctx.engine, &kind("general"), OutputFormat::Text)
        .await
        .unwrap();

    assert_eq!(first.code, "G001");
    assert_eq!(other.code, "T001");
    assert_eq!(second.code, "G002");
}

#[tokio::test]
async fn issue_rejects_unknown_category() {
    let ctx = TestContext::new().await;
    let err = issue(&ctx.engine, &kind("parking"), OutputFormat::Text)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Core(tl_core::Error::InvalidCategory(ref c)) if c == "parking"
    ));
}

#[tokio::test]
async fn call_takes_the_oldest_ticket() {
    let ctx = TestContext::new().await;
    ctx.issue(Category::General).await;
    ctx.issue(Category::General).await;

    let called = call(&ctx.engine, &kind("general"), " desk-1 ")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(called.code, "G001");
    assert_eq!(called.state, TicketState::Called);
    assert_eq!(called.service_point.as_deref(), Some("desk-1"));
}

#[tokio::test]
async fn call_with_nothing_waiting_is_not_an_error() {
    let ctx = TestContext::new().await;
    let called = call(&ctx.engine, &kind("marriage"), "desk-1").await.unwrap();
    assert!(called.is_none());
}

#[tokio::test]
async fn blank_service_point_is_rejected() {
    let ctx = TestContext::new().await;
    ctx.issue(Category::General).await;
    let err = call(&ctx.engine, &kind("general"), "  ").await.unwrap_err();
    assert!(matches!(err, Error::EmptyServicePoint));
    assert_eq!(
        ctx.ticket("G001").await.state,
        TicketState::Waiting,
        "nothing was called"
    );
}

#[tokio::test]
async fn routed_ticket_goes_to_its_service_point_first() {
    let ctx = TestContext::new().await;
    ctx.issue(Category::General).await;
    ctx.issue(Category::General).await;
    route(&ctx.engine, "G002", "desk-5").await.unwrap();

    let at_five = call(&ctx.engine, &kind("general"), "desk-5")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(at_five.code, "G002");
}

#[tokio::test]
async fn recall_keeps_the_service_point() {
    let ctx = TestContext::new().await;
    let ticket = ctx.called(Category::Transfer, "desk-2").await;
    let recalled = recall(&ctx.engine, &ticket.code).await.unwrap();
    assert_eq!(recalled.service_point.as_deref(), Some("desk-2"));
    assert!(recalled.called_at >= ticket.called_at);
}

#[tokio::test]
async fn complete_records_the_actor() {
    let ctx = TestContext::new().await;
    let ticket = ctx.called(Category::General, "desk-1").await;
    let done = complete(&ctx.engine, &ticket.id, "clerk-7").await.unwrap();

    assert_eq!(done.state, TicketState::Completed);
    let history = ctx.engine.ledger().history().await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].actor_id, "clerk-7");
}

#[tokio::test]
async fn complete_a_waiting_ticket_fails() {
    let ctx = TestContext::new().await;
    ctx.issue(Category::General).await;
    let err = complete(&ctx.engine, "G001", "clerk-7").await.unwrap_err();
    assert!(matches!(
        err,
        Error::Core(tl_core::Error::InvalidTransition { .. })
    ));
}

#[tokio::test]
async fn cancel_removes_the_ticket() {
    let ctx = TestContext::new().await;
    ctx.issue(Category::General).await;
    cancel(&ctx.engine, "g001").await.unwrap();
    assert!(ctx.engine.ledger().list_waiting(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn unknown_ticket_is_reported() {
    let ctx = TestContext::new().await;
    let err = recall(&ctx.engine, "G404").await.unwrap_err();
    assert!(matches!(
        err,
        Error::Core(tl_core::Error::TicketNotFound(_))
    ));
}
