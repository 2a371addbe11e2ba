// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use tl_core::{Category, QueueSettings};

use super::*;
use crate::commands::testing::TestContext;
use crate::error::Error;

#[tokio::test]
async fn waiting_filters_by_category() {
    let ctx = TestContext::new().await;
    ctx.issue(Category::General).await;
    ctx.issue(Category::Marriage).await;
    ctx.issue(Category::General).await;

    let all = waiting(&ctx.engine, None, OutputFormat::Text).await.unwrap();
    assert_eq!(all.len(), 3);

    let general = waiting(&ctx.engine, Some("general"), OutputFormat::Json)
        .await
        .unwrap();
    let codes: Vec<&str> = general.iter().map(|w| w.ticket.code.as_str()).collect();
    assert_eq!(codes, vec!["G001", "G002"]);
}

#[tokio::test]
async fn waiting_rejects_unknown_category() {
    let ctx = TestContext::new().await;
    let err = waiting(&ctx.engine, Some("visa"), OutputFormat::Text)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Core(tl_core::Error::InvalidCategory(_))
    ));
}

#[tokio::test]
async fn called_is_most_recent_first_and_limited() {
    let ctx = TestContext::new().await;
    ctx.called(Category::General, "desk-1").await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    ctx.called(Category::General, "desk-2").await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    ctx.called(Category::General, "desk-3").await;

    let recent = called(&ctx.engine, 2, OutputFormat::Text).await.unwrap();
    let points: Vec<_> = recent
        .iter()
        .map(|t| t.service_point.as_deref().unwrap())
        .collect();
    assert_eq!(points, vec!["desk-3", "desk-2"]);
}

#[tokio::test]
async fn display_shows_the_last_call() {
    let ctx = TestContext::new().await;
    assert!(display(&ctx.engine).await.unwrap().is_none());

    let ticket = ctx.called(Category::Transfer, "window-b").await;
    assert_eq!(display(&ctx.engine).await.unwrap(), Some(ticket));
}

#[tokio::test]
async fn overdue_lists_long_services() {
    let ctx = TestContext::new().await;
    ctx.engine
        .ledger()
        .save_settings(&QueueSettings {
            max_service_minutes: 0,
            ..QueueSettings::default()
        })
        .await
        .unwrap();
    assert!(overdue(&ctx.engine).await.unwrap().is_empty());

    let ticket = ctx.called(Category::General, "desk-1").await;
    tokio::time::sleep(Duration::from_millis(5)).await;

    let late = overdue(&ctx.engine).await.unwrap();
    assert_eq!(late.len(), 1);
    assert_eq!(late[0].id, ticket.id);
}
