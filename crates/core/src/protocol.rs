// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket protocol messages between queue clients and the relay.
//!
//! The protocol is simple:
//! - Clients announce themselves, publish events and ask for missed events
//! - The relay stamps published events with a ring-buffer id and broadcasts
//!   them to every connected client, the publisher included

use serde::{Deserialize, Serialize};

use crate::event::DomainEvent;

/// Messages sent from client to relay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// First message on a new connection.
    ///
    /// The relay answers with `Welcome` and tells the other clients a peer
    /// joined.
    Hello {
        /// Client id generated at connect time.
        client_id: String,
    },

    /// Broadcast an event to every connected client.
    Publish {
        event: DomainEvent,
    },

    /// Request buffered events with an id greater than `after`.
    ///
    /// Used after a reconnect to fetch what was missed.
    CatchUp {
        after: u64,
    },

    /// Ping message for keepalive.
    Ping {
        /// Client-chosen ID echoed in Pong.
        id: u64,
    },
}

/// Messages sent from relay to client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Response to `Hello`.
    Welcome {
        client_id: String,
        /// Highest event id in the relay's buffer, 0 when empty.
        latest_event_id: u64,
    },

    /// A relayed event, carrying its ring-buffer id.
    Event(DomainEvent),

    /// Response to a CatchUp request, oldest first.
    CatchUpResponse {
        events: Vec<DomainEvent>,
    },

    /// Pong response to client Ping.
    Pong {
        /// Echoed from the Ping message.
        id: u64,
    },

    /// Error message.
    Error {
        /// Human-readable error description.
        message: String,
    },
}

impl ClientMessage {
    pub fn hello(client_id: impl Into<String>) -> Self {
        ClientMessage::Hello {
            client_id: client_id.into(),
        }
    }

    pub fn publish(event: DomainEvent) -> Self {
        ClientMessage::Publish { event }
    }

    pub fn catch_up(after: u64) -> Self {
        ClientMessage::CatchUp { after }
    }

    pub fn ping(id: u64) -> Self {
        ClientMessage::Ping { id }
    }

    /// Serializes the message to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserializes the message from JSON.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    pub fn welcome(client_id: impl Into<String>, latest_event_id: u64) -> Self {
        ServerMessage::Welcome {
            client_id: client_id.into(),
            latest_event_id,
        }
    }

    pub fn event(event: DomainEvent) -> Self {
        ServerMessage::Event(event)
    }

    pub fn catch_up_response(events: Vec<DomainEvent>) -> Self {
        ServerMessage::CatchUpResponse { events }
    }

    pub fn pong(id: u64) -> Self {
        ServerMessage::Pong { id }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }

    /// Serializes the message to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserializes the message from JSON.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
