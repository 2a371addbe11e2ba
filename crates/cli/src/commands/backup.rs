// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use tl_core::{BackupKind, SnapshotMeta};

use crate::cli::{BackupCommand, OutputFormat};
use crate::display::format_snapshot;
use crate::engine::Engine;
use crate::error::Result;

use super::print_json;

pub async fn run(engine: &Engine, command: BackupCommand) -> Result<()> {
    match command {
        BackupCommand::Create => create(engine).await.map(|_| ()),
        BackupCommand::List { output } => list(engine, output).await.map(|_| ()),
        BackupCommand::Restore { key } => restore(engine, &key).await.map(|_| ()),
        BackupCommand::Delete { key } => delete(engine, &key).await,
    }
}

pub async fn create(engine: &Engine) -> Result<SnapshotMeta> {
    let meta = engine.backups().create_backup(BackupKind::Manual).await?;
    println!("Created {} ({} tickets)", meta.key, meta.ticket_count);
    Ok(meta)
}

pub async fn list(engine: &Engine, output: OutputFormat) -> Result<Vec<SnapshotMeta>> {
    let backups = engine.backups().list_backups().await?;
    match output {
        OutputFormat::Json => print_json(&backups)?,
        OutputFormat::Text if backups.is_empty() => println!("No backups"),
        OutputFormat::Text => {
            for meta in &backups {
                println!("{}", format_snapshot(meta));
            }
        }
    }
    Ok(backups)
}

pub async fn restore(engine: &Engine, key: &str) -> Result<SnapshotMeta> {
    let meta = engine.backups().restore_backup(key).await?;
    println!("Restored {} tickets from {}", meta.ticket_count, meta.key);
    Ok(meta)
}

pub async fn delete(engine: &Engine, key: &str) -> Result<()> {
    engine.backups().delete_backup(key).await?;
    println!("Deleted {}", key);
    Ok(())
}

#[cfg(test)]
#[path = "backup_tests.rs"]
mod tests;
