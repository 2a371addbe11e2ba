// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex as StdMutex;

use super::*;
use crate::backup::{BackupConfig, BackupKind, BackupManager};
use crate::event::EventKind;
use crate::hlc::ManualClock;
use crate::store::{MemoryStore, StoreError, StoreFuture};
use serde_json::Value;
use yare::parameterized;

const START_MS: u64 = 1_767_254_400_000;

/// Memory store whose writes can be made to fail.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    fail_writes: AtomicBool,
}

impl Store for FlakyStore {
    fn backend(&self) -> &'static str {
        "flaky"
    }

    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<Value>> {
        self.inner.get(key)
    }

    fn set_many(&self, entries: Vec<(String, Value)>) -> StoreFuture<'_, ()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Box::pin(async { Err::<(), _>(StoreError::Backend("disk unplugged".into())) });
        }
        self.inner.set_many(entries)
    }

    fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
        self.inner.delete(key)
    }

    fn list_keys(&self) -> StoreFuture<'_, Vec<String>> {
        self.inner.list_keys()
    }

    fn clear(&self) -> StoreFuture<'_, ()> {
        self.inner.clear()
    }
}

struct Fixture {
    store: Arc<FlakyStore>,
    clock: Arc<ManualClock>,
    ledger: Ledger,
    events: Arc<StdMutex<Vec<EventKind>>>,
}

fn fixture() -> Fixture {
    let store = Arc::new(FlakyStore::default());
    let clock = Arc::new(ManualClock::new(START_MS));
    let bus = EventBus::new("c-ledger");
    let events = Arc::new(StdMutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    bus.on_any(move |event| sink.lock().unwrap().push(event.kind()));
    let ledger = Ledger::with_clock(store.clone(), bus, clock.clone());
    Fixture {
        store,
        clock,
        ledger,
        events,
    }
}

impl Fixture {
    fn events(&self) -> Vec<EventKind> {
        self.events.lock().unwrap().clone()
    }

    async fn issue_general(&self) -> Ticket {
        let ticket = self
            .ledger
            .issue(Category::General, Subcategory::Normal)
            .await
            .unwrap();
        self.clock.advance(1000);
        ticket
    }
}

#[tokio::test]
async fn issue_call_complete_scenario() {
    let fx = fixture();
    let issued = fx.issue_general().await;
    assert_eq!(issued.code, "G001");
    assert_eq!(issued.state, TicketState::Waiting);

    fx.clock.advance(4000);
    let called = fx
        .ledger
        .call_next(Category::General, Subcategory::Normal, "1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(called.code, "G001");
    assert_eq!(called.state, TicketState::Called);
    assert_eq!(called.service_point.as_deref(), Some("1"));
    assert!(called.is_consistent());

    fx.clock.advance(90_000);
    let (completed, record) = fx.ledger.complete(&called.id, "staffA").await.unwrap();
    assert_eq!(completed.state, TicketState::Completed);
    assert_eq!(record.actor_id, "staffA");
    assert_eq!(record.service_duration_ms, 90_000);

    let history = fx.ledger.history().await.unwrap();
    assert_eq!(history, vec![record]);
    assert_eq!(
        fx.events(),
        vec![
            EventKind::TicketCreated,
            EventKind::TicketCalled,
            EventKind::TicketCompleted
        ]
    );
}

#[tokio::test]
async fn codes_increase_per_category_and_never_repeat() {
    let fx = fixture();
    let mut codes = Vec::new();
    for _ in 0..3 {
        codes.push(fx.issue_general().await.code);
    }
    let first = fx.ledger.list_waiting(None).await.unwrap()[0].ticket.id.clone();
    fx.ledger.cancel(&first).await.unwrap();
    codes.push(fx.issue_general().await.code);

    assert_eq!(codes, vec!["G001", "G002", "G003", "G004"]);
}

#[tokio::test]
async fn categories_have_independent_counters() {
    let fx = fixture();
    let general = fx.issue_general().await;
    let marriage = fx
        .ledger
        .issue(Category::Marriage, Subcategory::Normal)
        .await
        .unwrap();

    assert_eq!(general.code, "G001");
    assert_eq!(marriage.code, "M001");
    let counters = fx.ledger.counters().await.unwrap();
    assert_eq!(counters.get(&Category::General), Some(&1));
    assert_eq!(counters.get(&Category::Marriage), Some(&1));
}

#[tokio::test]
async fn failed_write_keeps_counter_and_emits_nothing() {
    let fx = fixture();
    fx.issue_general().await;

    fx.store.fail_writes.store(true, Ordering::SeqCst);
    let err = fx
        .ledger
        .issue(Category::General, Subcategory::Normal)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Store(_)));
    assert_eq!(fx.events(), vec![EventKind::TicketCreated]);

    fx.store.fail_writes.store(false, Ordering::SeqCst);
    assert_eq!(fx.issue_general().await.code, "G002");
}

#[tokio::test]
async fn failed_call_leaves_ticket_waiting() {
    let fx = fixture();
    let ticket = fx.issue_general().await;

    fx.store.fail_writes.store(true, Ordering::SeqCst);
    assert!(fx
        .ledger
        .call_next(Category::General, Subcategory::Normal, "1")
        .await
        .is_err());

    assert_eq!(
        fx.ledger.get(&ticket.id).await.unwrap().state,
        TicketState::Waiting
    );
    assert_eq!(fx.events(), vec![EventKind::TicketCreated]);
}

#[tokio::test]
async fn disabled_category_cannot_be_issued() {
    let fx = fixture();
    fx.ledger
        .save_settings(&QueueSettings {
            enabled_categories: vec![Category::General],
            ..QueueSettings::default()
        })
        .await
        .unwrap();

    let err = fx
        .ledger
        .issue(Category::Transfer, Subcategory::Normal)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::CategoryDisabled(Category::Transfer)));
    assert!(fx.ledger.counters().await.unwrap().is_empty());
}

#[tokio::test]
async fn call_next_changes_only_the_selected_ticket() {
    let fx = fixture();
    let first = fx.issue_general().await;
    let second = fx.issue_general().await;
    let other = fx
        .ledger
        .issue(Category::General, Subcategory::Priority)
        .await
        .unwrap();

    let called = fx
        .ledger
        .call_next(Category::General, Subcategory::Normal, "4")
        .await
        .unwrap()
        .unwrap();

    assert_eq!(called.id, first.id);
    assert_eq!(fx.ledger.get(&second.id).await.unwrap(), second);
    assert_eq!(fx.ledger.get(&other.id).await.unwrap(), other);
}

#[tokio::test]
async fn call_next_prefers_tickets_routed_to_the_service_point() {
    let fx = fixture();
    let a = fx.issue_general().await;
    let b = fx.issue_general().await;
    fx.ledger.route(&b.id, "2").await.unwrap();

    let at_two = fx
        .ledger
        .call_next(Category::General, Subcategory::Normal, "2")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(at_two.id, b.id);

    let at_three = fx
        .ledger
        .call_next(Category::General, Subcategory::Normal, "3")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(at_three.id, a.id);
}

#[tokio::test]
async fn call_next_falls_back_to_tickets_routed_elsewhere() {
    let fx = fixture();
    let a = fx.issue_general().await;
    fx.ledger.route(&a.id, "2").await.unwrap();

    let called = fx
        .ledger
        .call_next(Category::General, Subcategory::Normal, "3")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(called.id, a.id);
    assert_eq!(called.routed_to.as_deref(), Some("2"));
    assert_eq!(called.service_point.as_deref(), Some("3"));
}

#[tokio::test]
async fn call_next_with_nothing_waiting_is_none() {
    let fx = fixture();
    let ticket = fx.issue_general().await;
    fx.ledger
        .call_next(Category::General, Subcategory::Normal, "1")
        .await
        .unwrap();

    let next = fx
        .ledger
        .call_next(Category::General, Subcategory::Normal, "1")
        .await
        .unwrap();
    assert!(next.is_none());

    let other = fx
        .ledger
        .call_next(Category::Marriage, Subcategory::Normal, "1")
        .await
        .unwrap();
    assert!(other.is_none());
    assert_eq!(
        fx.ledger.get(&ticket.id).await.unwrap().state,
        TicketState::Called
    );
}

#[parameterized(
    waiting = { 0 },
    completed = { 2 },
)]
#[test_macro(tokio::test)]
async fn complete_requires_called(steps: usize) {
    let fx = fixture();
    let ticket = fx.issue_general().await;
    if steps >= 1 {
        fx.ledger
            .call_next(Category::General, Subcategory::Normal, "1")
            .await
            .unwrap();
    }
    if steps >= 2 {
        fx.ledger.complete(&ticket.id, "staff").await.unwrap();
    }
    let before = fx.ledger.export_bundle().await.unwrap();
    let events_before = fx.events().len();

    let err = fx.ledger.complete(&ticket.id, "staff").await.unwrap_err();

    assert!(matches!(err, Error::InvalidTransition { .. }));
    assert!(err.is_not_found());
    assert_eq!(fx.ledger.export_bundle().await.unwrap(), before);
    assert_eq!(fx.events().len(), events_before);
}

#[tokio::test]
async fn unknown_ticket_is_not_found() {
    let fx = fixture();
    for err in [
        fx.ledger.complete("t-missing", "s").await.unwrap_err(),
        fx.ledger.route("t-missing", "1").await.unwrap_err(),
        fx.ledger.reissue_call("t-missing").await.unwrap_err(),
        fx.ledger.cancel("t-missing").await.unwrap_err(),
        fx.ledger.get("t-missing").await.unwrap_err(),
    ] {
        assert!(matches!(err, Error::TicketNotFound(_)));
    }
}

#[tokio::test]
async fn route_only_while_waiting() {
    let fx = fixture();
    let ticket = fx.issue_general().await;
    let routed = fx.ledger.route(&ticket.id, "5").await.unwrap();
    assert_eq!(routed.routed_to.as_deref(), Some("5"));
    assert_eq!(routed.state, TicketState::Waiting);
    assert!(routed.service_point.is_none());

    fx.ledger
        .call_next(Category::General, Subcategory::Normal, "5")
        .await
        .unwrap();
    let err = fx.ledger.route(&ticket.id, "6").await.unwrap_err();
    assert!(matches!(
        err,
        Error::InvalidTransition {
            from: TicketState::Called,
            ..
        }
    ));
}

#[tokio::test]
async fn reissue_refreshes_call_time_and_announces_again() {
    let fx = fixture();
    let ticket = fx.issue_general().await;
    assert!(fx.ledger.reissue_call(&ticket.id).await.is_err());

    let called = fx
        .ledger
        .call_next(Category::General, Subcategory::Normal, "1")
        .await
        .unwrap()
        .unwrap();
    fx.clock.advance(30_000);
    let recalled = fx.ledger.reissue_call(&ticket.id).await.unwrap();

    assert_eq!(recalled.state, TicketState::Called);
    assert!(recalled.called_at > called.called_at);
    assert_eq!(fx.events().last(), Some(&EventKind::TicketCalled));
}

#[tokio::test]
async fn cancel_removes_waiting_ticket() {
    let fx = fixture();
    let ticket = fx.issue_general().await;
    let cancelled = fx.ledger.cancel(&ticket.id).await.unwrap();
    assert_eq!(cancelled.id, ticket.id);
    assert!(fx.ledger.list_waiting(None).await.unwrap().is_empty());
    assert_eq!(fx.events().last(), Some(&EventKind::TicketCancelled));

    let called = fx.issue_general().await;
    fx.ledger
        .call_next(Category::General, Subcategory::Normal, "1")
        .await
        .unwrap();
    assert!(fx.ledger.cancel(&called.id).await.is_err());
}

#[tokio::test]
async fn list_waiting_is_oldest_first_with_wait_time() {
    let fx = fixture();
    fx.issue_general().await;
    fx.ledger
        .issue(Category::Marriage, Subcategory::Normal)
        .await
        .unwrap();
    fx.clock.advance(1000);
    fx.issue_general().await;

    let all = fx.ledger.list_waiting(None).await.unwrap();
    let codes: Vec<&str> = all.iter().map(|w| w.ticket.code.as_str()).collect();
    assert_eq!(codes, vec!["G001", "M001", "G002"]);
    assert_eq!(all[0].waited_ms, 3000);
    assert_eq!(all[2].waited_ms, 1000);

    let marriage = fx
        .ledger
        .list_waiting(Some(Category::Marriage))
        .await
        .unwrap();
    assert_eq!(marriage.len(), 1);
}

#[tokio::test]
async fn called_list_and_display_follow_latest_call() {
    let fx = fixture();
    assert!(fx.ledger.currently_displayed().await.unwrap().is_none());

    for _ in 0..3 {
        fx.issue_general().await;
    }
    for point in ["1", "2", "3"] {
        fx.ledger
            .call_next(Category::General, Subcategory::Normal, point)
            .await
            .unwrap();
        fx.clock.advance(1000);
    }

    let called = fx.ledger.list_called(2).await.unwrap();
    let codes: Vec<&str> = called.iter().map(|t| t.code.as_str()).collect();
    assert_eq!(codes, vec!["G003", "G002"]);

    let first = fx.ledger.find("g001").await.unwrap();
    fx.ledger.reissue_call(&first.id).await.unwrap();
    let shown = fx.ledger.currently_displayed().await.unwrap().unwrap();
    assert_eq!(shown.code, "G001");
}

#[tokio::test]
async fn overdue_reports_long_running_calls() {
    let fx = fixture();
    fx.ledger
        .save_settings(&QueueSettings {
            max_service_minutes: 1,
            ..QueueSettings::default()
        })
        .await
        .unwrap();
    let ticket = fx.issue_general().await;
    fx.ledger
        .call_next(Category::General, Subcategory::Normal, "1")
        .await
        .unwrap();

    fx.clock.advance(59_000);
    assert!(fx.ledger.overdue().await.unwrap().is_empty());
    fx.clock.advance(2_000);
    let overdue = fx.ledger.overdue().await.unwrap();
    assert_eq!(overdue.len(), 1);
    assert_eq!(overdue[0].id, ticket.id);
}

#[tokio::test]
async fn import_overwrites_and_announces() {
    let fx = fixture();
    fx.issue_general().await;
    let exported = fx.ledger.export_bundle().await.unwrap();

    fx.issue_general().await;
    fx.issue_general().await;
    fx.ledger.import_bundle(&exported).await.unwrap();

    assert_eq!(fx.ledger.export_bundle().await.unwrap(), exported);
    assert_eq!(fx.events().last(), Some(&EventKind::SystemRestore));
    assert_eq!(fx.issue_general().await.code, "G002");
}

#[tokio::test]
async fn backup_round_trip_reproduces_state() {
    let fx = fixture();
    let backups = BackupManager::new(fx.ledger.clone(), BackupConfig::default(), fx.clock.clone());

    let ticket = fx.issue_general().await;
    fx.ledger
        .call_next(Category::General, Subcategory::Normal, "1")
        .await
        .unwrap();
    fx.ledger.complete(&ticket.id, "staff").await.unwrap();
    fx.issue_general().await;
    let at_backup = fx.ledger.export_bundle().await.unwrap();
    let meta = backups.create_backup(BackupKind::Manual).await.unwrap();

    fx.issue_general().await;
    fx.ledger
        .call_next(Category::General, Subcategory::Normal, "2")
        .await
        .unwrap();

    backups.restore_backup(&meta.key).await.unwrap();
    assert_eq!(fx.ledger.export_bundle().await.unwrap(), at_backup);
}

#[tokio::test]
async fn concurrent_issues_in_one_process_get_distinct_codes() {
    let fx = fixture();
    let mut handles = Vec::new();
    for _ in 0..8 {
        let ledger = fx.ledger.clone();
        handles.push(tokio::spawn(async move {
            ledger
                .issue(Category::General, Subcategory::Normal)
                .await
                .unwrap()
                .code
        }));
    }
    let mut codes = Vec::new();
    for handle in handles {
        codes.push(handle.await.unwrap());
    }
    codes.sort();
    codes.dedup();
    assert_eq!(codes.len(), 8);
}

#[tokio::test]
async fn every_mutation_advances_the_stamp() {
    let fx = fixture();
    assert_eq!(fx.ledger.stamp().await.unwrap(), None);

    let ticket = fx.issue_general().await;
    let issued = fx.ledger.stamp().await.unwrap().unwrap();
    assert_eq!(issued.wall_ms, START_MS);

    fx.ledger.route(&ticket.id, "2").await.unwrap();
    let routed = fx.ledger.stamp().await.unwrap().unwrap();
    assert!(routed > issued);

    fx.ledger
        .call_next(Category::General, Subcategory::Normal, "2")
        .await
        .unwrap();
    let called = fx.ledger.stamp().await.unwrap().unwrap();
    assert!(called > routed);

    fx.ledger.reissue_call(&ticket.id).await.unwrap();
    let recalled = fx.ledger.stamp().await.unwrap().unwrap();
    assert!(recalled > called);

    fx.ledger.complete(&ticket.id, "staff").await.unwrap();
    let completed = fx.ledger.stamp().await.unwrap().unwrap();
    assert!(completed > recalled);

    let waiting = fx.issue_general().await;
    fx.ledger.cancel(&waiting.id).await.unwrap();
    let (bundle, stamp) = fx.ledger.export_stamped().await.unwrap();
    assert!(stamp.unwrap() > completed);
    assert!(bundle.tickets.iter().all(|t| t.id != waiting.id));
}

#[tokio::test]
async fn failed_write_keeps_the_stamp() {
    let fx = fixture();
    fx.issue_general().await;
    let before = fx.ledger.stamp().await.unwrap();

    fx.store.fail_writes.store(true, Ordering::SeqCst);
    assert!(fx
        .ledger
        .issue(Category::General, Subcategory::Normal)
        .await
        .is_err());
    fx.store.fail_writes.store(false, Ordering::SeqCst);

    assert_eq!(fx.ledger.stamp().await.unwrap(), before);
}

#[tokio::test]
async fn stamps_follow_a_newer_stamp_from_another_writer() {
    let fx = fixture();
    // Another process on the same store stamped the state ahead of our clock.
    let ahead = Hlc::new(START_MS + 60_000, 3, 1);
    fx.store
        .set(keys::STAMP, to_value(&ahead).unwrap())
        .await
        .unwrap();

    fx.issue_general().await;
    assert!(fx.ledger.stamp().await.unwrap().unwrap() > ahead);
}

#[tokio::test]
async fn peer_bundles_apply_only_when_newer() {
    let fx = fixture();
    fx.issue_general().await;
    let local = fx.ledger.stamp().await.unwrap().unwrap();
    let peer = StateBundle::default();

    let older = Hlc::new(local.wall_ms - 1, 0, 7);
    assert!(!fx.ledger.apply_if_newer(&peer, older).await.unwrap());
    assert!(!fx.ledger.apply_if_newer(&peer, local).await.unwrap());
    assert_eq!(fx.ledger.export_bundle().await.unwrap().tickets.len(), 1);

    let newer = Hlc::new(local.wall_ms + 1, 0, 7);
    assert!(fx.ledger.apply_if_newer(&peer, newer).await.unwrap());
    assert!(fx.ledger.export_bundle().await.unwrap().tickets.is_empty());
    assert_eq!(fx.ledger.stamp().await.unwrap(), Some(newer));

    // The next local change sorts after the applied stamp.
    fx.issue_general().await;
    assert!(fx.ledger.stamp().await.unwrap().unwrap() > newer);
}

#[tokio::test]
async fn replace_state_leaves_the_stamp() {
    let fx = fixture();
    fx.issue_general().await;
    let before = fx.ledger.stamp().await.unwrap();
    fx.ledger
        .replace_state(&StateBundle::default())
        .await
        .unwrap();
    assert_eq!(fx.ledger.stamp().await.unwrap(), before);
}

#[test]
fn selection_ties_go_to_the_earliest_entry() {
    let now = Utc::now();
    let make = |id: &str| {
        Ticket::new(
            id.into(),
            id.into(),
            Category::General,
            Subcategory::Normal,
            now,
        )
    };
    let tickets = vec![make("a"), make("b")];
    assert_eq!(
        select_next(&tickets, Category::General, Subcategory::Normal, "1"),
        Some(0)
    );
}
