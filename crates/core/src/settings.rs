// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Queue settings consumed by the ledger.
//!
//! Settings are edited outside the core (configuration file or an admin
//! screen) and persisted under the `settings` key so peers exchange them
//! along with tickets.

use serde::{Deserialize, Serialize};

use crate::ticket::Category;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSettings {
    /// Categories reception may issue tickets for.
    #[serde(default = "default_enabled_categories")]
    pub enabled_categories: Vec<Category>,
    /// A called ticket older than this is reported as overdue.
    #[serde(default = "default_max_service_minutes")]
    pub max_service_minutes: u32,
}

fn default_enabled_categories() -> Vec<Category> {
    Category::ALL.to_vec()
}

fn default_max_service_minutes() -> u32 {
    15
}

impl Default for QueueSettings {
    fn default() -> Self {
        QueueSettings {
            enabled_categories: default_enabled_categories(),
            max_service_minutes: default_max_service_minutes(),
        }
    }
}

impl QueueSettings {
    pub fn is_enabled(&self, category: Category) -> bool {
        self.enabled_categories.contains(&category)
    }

    pub fn max_service_ms(&self) -> u64 {
        u64::from(self.max_service_minutes) * 60_000
    }
}
