// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! tl-core: shared library for the tally service queue
//!
//! This crate provides the ticket data model, the ledger state machine, the
//! durable store, the in-process event bus, snapshots and the wire protocol
//! used by both the `tally` client and the `tl-relay` server.

pub mod backup;
pub mod bundle;
pub mod error;
pub mod event;
pub mod hlc;
pub mod id;
pub mod jsonl;
pub mod ledger;
pub mod protocol;
pub mod ring;
pub mod settings;
pub mod store;
pub mod ticket;
pub mod view;

pub use backup::{BackupConfig, BackupKind, BackupManager, HealOutcome, Snapshot, SnapshotMeta};
pub use bundle::StateBundle;
pub use error::{Error, Result};
pub use event::{
    ConnectionStatus, DomainEvent, EventBus, EventKind, EventPayload, SubscriptionId,
};
pub use hlc::{ClockSource, Hlc, HlcClock, SystemClock};
pub use ledger::Ledger;
pub use ring::EventRing;
pub use settings::QueueSettings;
pub use store::{DurableStore, Store, StoreConfig, StoreError};
pub use ticket::{
    Actor, Category, Role, ServiceRecord, Subcategory, Ticket, TicketState, WaitingTicket,
};
pub use view::QueueView;
