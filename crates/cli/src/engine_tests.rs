// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use tempfile::TempDir;
use tl_core::{BackupKind, Category, QueueSettings, Subcategory};

use super::*;

#[tokio::test]
async fn open_persists_across_restarts() {
    let dir = TempDir::new().unwrap();
    let engine = Engine::open(dir.path(), Config::default()).await.unwrap();
    let ticket = engine
        .ledger()
        .issue(Category::General, Subcategory::Normal)
        .await
        .unwrap();
    drop(engine);

    let reopened = Engine::open(dir.path(), Config::default()).await.unwrap();
    assert_eq!(reopened.ledger().get(&ticket.id).await.unwrap(), ticket);
}

#[tokio::test]
async fn each_engine_gets_its_own_client_id() {
    let dir = TempDir::new().unwrap();
    let a = Engine::ephemeral(dir.path(), Config::default()).await.unwrap();
    let b = Engine::ephemeral(dir.path(), Config::default()).await.unwrap();
    assert_ne!(a.client_id(), b.client_id());
    assert_eq!(a.bus().origin(), a.client_id());
}

#[tokio::test]
async fn ephemeral_leaves_no_files() {
    let dir = TempDir::new().unwrap();
    let engine = Engine::ephemeral(dir.path(), Config::default()).await.unwrap();
    engine
        .ledger()
        .issue(Category::Transfer, Subcategory::Normal)
        .await
        .unwrap();
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn configured_queue_settings_reach_the_ledger() {
    let dir = TempDir::new().unwrap();
    let settings = QueueSettings {
        enabled_categories: vec![Category::General],
        max_service_minutes: 5,
    };
    let config = Config {
        queue: Some(settings.clone()),
        ..Config::default()
    };
    let engine = Engine::ephemeral(dir.path(), config).await.unwrap();

    assert_eq!(engine.ledger().settings().await.unwrap(), settings);
    let err = engine
        .ledger()
        .issue(Category::Marriage, Subcategory::Normal)
        .await
        .unwrap_err();
    assert!(matches!(err, tl_core::Error::CategoryDisabled(Category::Marriage)));
}

#[tokio::test]
async fn startup_heals_a_lost_ticket_collection() {
    let dir = TempDir::new().unwrap();
    let engine = Engine::open(dir.path(), Config::default()).await.unwrap();
    engine
        .ledger()
        .issue(Category::General, Subcategory::Priority)
        .await
        .unwrap();
    engine
        .backups()
        .create_backup(BackupKind::Automatic)
        .await
        .unwrap();
    drop(engine);

    let store = DurableStore::open(dir.path(), &Config::default().store).unwrap();
    store.delete(tl_core::bundle::keys::TICKETS).await.unwrap();
    drop(store);

    let healed = Engine::open(dir.path(), Config::default()).await.unwrap();
    let waiting = healed.ledger().list_waiting(None).await.unwrap();
    assert_eq!(waiting.len(), 1);
    assert_eq!(waiting[0].ticket.code, "G001");
}

#[tokio::test]
async fn connect_requires_a_relay() {
    let dir = TempDir::new().unwrap();
    let engine = Engine::ephemeral(dir.path(), Config::default()).await.unwrap();
    assert!(matches!(engine.connect().await, Err(Error::NoRemote)));
}

#[tokio::test]
async fn connect_rejects_a_bad_url() {
    let dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.remote = Some(crate::config::RemoteConfig {
        url: "http://relay".into(),
        ..Default::default()
    });
    let engine = Engine::ephemeral(dir.path(), config).await.unwrap();
    assert!(matches!(
        engine.connect().await,
        Err(Error::InvalidRemoteUrl(_))
    ));
}

#[tokio::test]
async fn session_falls_back_when_the_relay_is_down() {
    let dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.remote = Some(crate::config::RemoteConfig {
        url: "ws://127.0.0.1:1".into(),
        reconnect_interval_ms: 10,
        fallback_after_failures: 1,
        ..Default::default()
    });
    let engine = Engine::ephemeral(dir.path(), config).await.unwrap();

    let session = engine.connect().await.unwrap();
    let status = tokio::time::timeout(
        Duration::from_secs(10),
        session
            .channel()
            .wait_for(|s| matches!(s, tl_core::ConnectionStatus::Fallback { .. })),
    )
    .await
    .unwrap();
    assert!(!status.is_connected());
    assert!(dir.path().join("events.jsonl").exists());

    session.close().await;
}
