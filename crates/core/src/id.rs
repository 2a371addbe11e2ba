// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Identifier generation for tickets and clients.

use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

/// Generate a ticket ID from the issuing client, the code and the issue time.
/// Format: `t-{hash}` where hash is the first 16 hex chars of SHA256.
pub fn generate_ticket_id(origin: &str, code: &str, issued_at: &DateTime<Utc>) -> String {
    let input = format!("{}|{}|{}", origin, code, issued_at.to_rfc3339());
    let hash = Sha256::digest(input.as_bytes());
    format!("t-{}", hex::encode(&hash[..8]))
}

/// Generate a ticket ID that does not collide with an existing one,
/// appending an incrementing suffix when needed.
pub fn generate_unique_ticket_id<F>(
    origin: &str,
    code: &str,
    issued_at: &DateTime<Utc>,
    exists: F,
) -> String
where
    F: Fn(&str) -> bool,
{
    let base = generate_ticket_id(origin, code, issued_at);
    if !exists(&base) {
        return base;
    }

    let mut suffix = 2;
    loop {
        let id = format!("{}-{}", base, suffix);
        if !exists(&id) {
            return id;
        }
        suffix += 1;
    }
}

/// Generate a client id for this process: `c-{8 hex chars}`.
pub fn generate_client_id() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let host = std::env::var("HOSTNAME").unwrap_or_default();
    let input = format!("{}|{}|{}", std::process::id(), nanos, host);
    let hash = Sha256::digest(input.as_bytes());
    format!("c-{}", hex::encode(&hash[..4]))
}

/// Derive a stable HLC node id from a client id.
pub fn node_id_for(client_id: &str) -> u32 {
    let hash = Sha256::digest(client_id.as_bytes());
    u32::from_be_bytes([hash[0], hash[1], hash[2], hash[3]])
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
