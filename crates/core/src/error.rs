// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for tl-core operations.

use thiserror::Error;

use crate::store::StoreError;
use crate::ticket::{Category, TicketState};

/// All possible errors that can occur in tl-core operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("ticket not found: {0}")]
    TicketNotFound(String),

    #[error("cannot {op} ticket {ticket}: it is {from}\n  hint: {op} is only allowed while a ticket is {allowed}")]
    InvalidTransition {
        ticket: String,
        from: TicketState,
        op: &'static str,
        allowed: TicketState,
    },

    #[error("invalid category: '{0}'\n  hint: valid categories are: general, marriage, name_change, transfer, late_death_registration")]
    InvalidCategory(String),

    #[error("invalid subcategory: '{0}'\n  hint: valid subcategories are: normal, priority, special")]
    InvalidSubcategory(String),

    #[error("invalid backup kind: '{0}'\n  hint: valid kinds are: manual, automatic, daily, sync")]
    InvalidBackupKind(String),

    #[error("category {0} is not enabled in the queue settings")]
    CategoryDisabled(Category),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("snapshot invalid: {0}")]
    SnapshotInvalid(String),

    #[error("backup not found: {0}")]
    BackupNotFound(String),

    #[error("corrupted data: {0}")]
    CorruptedData(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid HLC: {0}")]
    InvalidHlc(String),
}

impl Error {
    /// Returns true for errors that reference a missing ticket or a
    /// transition the ticket's current state does not allow.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::TicketNotFound(_) | Error::InvalidTransition { .. })
    }
}

/// A specialized Result type for tl-core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
