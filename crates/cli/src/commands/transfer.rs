// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Export and import of the full queue state as one JSON document.

use std::fs;
use std::path::Path;

use tl_core::StateBundle;

use crate::engine::Engine;
use crate::error::Result;

pub async fn export(engine: &Engine, path: &Path) -> Result<StateBundle> {
    let bundle = engine.ledger().export_bundle().await?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, bundle.to_json_pretty()?)?;
    println!(
        "Exported {} tickets and {} service records to {}",
        bundle.tickets.len(),
        bundle.history.len(),
        path.display()
    );
    Ok(bundle)
}

/// Replaces the local state. The file is parsed fully before anything is written.
pub async fn import(engine: &Engine, path: &Path) -> Result<StateBundle> {
    let content = fs::read_to_string(path)?;
    let bundle = StateBundle::from_json(&content)?;
    engine.ledger().import_bundle(&bundle).await?;
    println!(
        "Imported {} tickets from {}",
        bundle.tickets.len(),
        path.display()
    );
    Ok(bundle)
}

#[cfg(test)]
#[path = "transfer_tests.rs"]
mod tests;
