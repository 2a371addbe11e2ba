// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Multi-client sync for the queue.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌─────────────┐
//! │  EventBus   │────►│ EventChannel │────►│   tl-relay  │
//! │  (tl-core)  │◄────│  (Transport) │◄────│             │
//! └─────────────┘     └──────────────┘     └─────────────┘
//!        │                   │
//!        ▼                   ▼ (fallback)
//! ┌─────────────┐     ┌──────────────┐
//! │    Sync     │     │  PollQueue   │  shared JSONL file
//! │ Coordinator │     │              │
//! └─────────────┘     └──────────────┘
//! ```
//!
//! # Features
//!
//! - WebSocket connection to the relay with heartbeats
//! - Fixed-interval reconnect and catch-up from the relay's ring buffer
//! - Poll queue fallback shared by every client on the site
//! - Last-writer-wins exchange of full state bundles
//! - Injectable transport trait for testing

mod channel;
mod coordinator;
pub(crate) mod queue;
mod transport;

pub use channel::{ChannelConfig, ChannelHandle, EventChannel, Mode};
pub use coordinator::SyncCoordinator;
pub use queue::{PollQueue, QueueEntry, QueueError};
pub use transport::{Transport, TransportError, TransportResult, WebSocketTransport};
