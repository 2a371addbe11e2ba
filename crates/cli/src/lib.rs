// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! tally - a walk-in service queue station.
//!
//! This crate provides the `tally` CLI on top of [`tl_core`]: configuration,
//! engine composition, the event channel to the relay and the sync
//! coordinator that keeps stations in step.
//!
//! # Main Components
//!
//! - [`Engine`] - store, ledger and backups for one data directory
//! - [`Config`] - `tally.toml` settings
//! - [`sync`] - event channel, poll queue fallback and state reconciliation
//! - [`Error`] - error type for all client operations
//!
//! ```rust,ignore
//! use tally::{Config, Engine};
//!
//! let config = Config::load(&data_dir)?;
//! let engine = Engine::open(&data_dir, config).await?;
//! let ticket = engine.ledger().issue(Category::General, Subcategory::Normal).await?;
//!
//! // Join the relay configured in [remote]
//! let session = engine.connect().await?;
//! ```

mod cli;
mod commands;
mod display;

pub mod config;
pub mod engine;
pub mod error;
pub mod sync;

pub use cli::{BackupCommand, Cli, Command, LimitArgs, OutputFormat, TicketKindArgs};
pub use config::Config;
pub use engine::{Engine, Session};
pub use error::{Error, Result};

/// Execute a parsed command line.
pub async fn run(cli: Cli) -> Result<()> {
    let engine = commands::open_engine(cli.data_dir.as_deref(), cli.ephemeral).await?;
    let engine = &engine;
    match cli.command {
        Command::Issue { kind, output } => commands::ticket::issue(engine, &kind, output)
            .await
            .map(|_| ()),
        Command::Call {
            kind,
            service_point,
        } => commands::ticket::call(engine, &kind, &service_point)
            .await
            .map(|_| ()),
        Command::Route {
            ticket,
            service_point,
        } => commands::ticket::route(engine, &ticket, &service_point)
            .await
            .map(|_| ()),
        Command::Recall { ticket } => commands::ticket::recall(engine, &ticket).await.map(|_| ()),
        Command::Complete { ticket, actor } => commands::ticket::complete(engine, &ticket, &actor)
            .await
            .map(|_| ()),
        Command::Cancel { ticket } => commands::ticket::cancel(engine, &ticket).await.map(|_| ()),
        Command::Waiting { category, output } => {
            commands::list::waiting(engine, category.as_deref(), output)
                .await
                .map(|_| ())
        }
        Command::Called { limit, output } => commands::list::called(engine, limit.limit, output)
            .await
            .map(|_| ()),
        Command::Display => commands::list::display(engine).await.map(|_| ()),
        Command::Overdue => commands::list::overdue(engine).await.map(|_| ()),
        Command::Backup(command) => commands::backup::run(engine, command).await,
        Command::Export { file } => commands::transfer::export(engine, &file).await.map(|_| ()),
        Command::Import { file } => commands::transfer::import(engine, &file).await.map(|_| ()),
        Command::Watch => commands::watch::run(engine).await,
    }
}
