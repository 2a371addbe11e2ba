// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Full-state bundle: tickets, counters, history and settings.
//!
//! The same document is used for snapshots, peer state exchange, and file
//! export/import. Applying a bundle is always a full overwrite.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::settings::QueueSettings;
use crate::store::{read_json, to_value, Store};
use crate::ticket::{Category, ServiceRecord, Ticket};

/// Store keys owned by the ledger.
pub mod keys {
    pub const TICKETS: &str = "tickets";
    pub const COUNTERS: &str = "counters";
    pub const HISTORY: &str = "service_history";
    pub const SETTINGS: &str = "settings";
    /// Hybrid logical clock stamp of the last state change. Not part of a
    /// bundle's data; it travels beside it.
    pub const STAMP: &str = "sync_stamp";
}

/// Per-category issue counters.
pub type Counters = BTreeMap<Category, u32>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateBundle {
    #[serde(default)]
    pub tickets: Vec<Ticket>,
    #[serde(default)]
    pub counters: Counters,
    #[serde(default)]
    pub history: Vec<ServiceRecord>,
    #[serde(default)]
    pub settings: QueueSettings,
}

impl StateBundle {
    /// Reads the current state from `store`. Missing keys read as empty.
    pub async fn read(store: &dyn Store) -> Result<Self> {
        Ok(StateBundle {
            tickets: read_json(store, keys::TICKETS).await?.unwrap_or_default(),
            counters: read_json(store, keys::COUNTERS).await?.unwrap_or_default(),
            history: read_json(store, keys::HISTORY).await?.unwrap_or_default(),
            settings: read_json(store, keys::SETTINGS).await?.unwrap_or_default(),
        })
    }

    /// Store entries that overwrite every ledger key.
    pub fn to_entries(&self) -> Result<Vec<(String, Value)>> {
        Ok(vec![
            (keys::TICKETS.to_string(), to_value(&self.tickets)?),
            (keys::COUNTERS.to_string(), to_value(&self.counters)?),
            (keys::HISTORY.to_string(), to_value(&self.history)?),
            (keys::SETTINGS.to_string(), to_value(&self.settings)?),
        ])
    }

    /// Writes the bundle over the current state in one atomic batch.
    pub async fn write(&self, store: &dyn Store) -> Result<()> {
        store.set_many(self.to_entries()?).await?;
        Ok(())
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }
}

#[cfg(test)]
#[path = "bundle_tests.rs"]
mod tests;
