// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

use crate::sync::queue::QueueError;

/// Errors surfaced by the `tally` client.
///
/// Ledger and store failures come through [`Error::Core`] unchanged, so a
/// rejected transition prints the same message here as in the library.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] tl_core::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("no data directory\n  hint: pass --data-dir or set TALLY_DATA_DIR")]
    NoDataDir,

    #[error("no remote configured\n  hint: add a [remote] section with a url to tally.toml")]
    NoRemote,

    #[error("invalid remote url '{0}'\n  hint: use ws://host:port or wss://host:port")]
    InvalidRemoteUrl(String),

    #[error("poll queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("service point must not be empty\n  hint: name the desk or window, e.g. --at desk-1")]
    EmptyServicePoint,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<tl_core::StoreError> for Error {
    fn from(e: tl_core::StoreError) -> Self {
        Error::Core(e.into())
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
