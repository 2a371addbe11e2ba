// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

pub mod backup;
pub mod list;
#[cfg(test)]
#[path = "mod_tests.rs"]
pub mod testing;
pub mod ticket;
pub mod transfer;
pub mod watch;

use std::path::Path;

use serde::Serialize;

use crate::config::{resolve_data_dir, Config};
use crate::engine::Engine;
use crate::error::Result;

/// Opens the engine for the data directory chosen on the command line.
pub async fn open_engine(data_dir: Option<&Path>, ephemeral: bool) -> Result<Engine> {
    let data_dir = resolve_data_dir(data_dir)?;
    let config = Config::load(&data_dir)?;
    if ephemeral {
        Engine::ephemeral(&data_dir, config).await
    } else {
        Engine::open(&data_dir, config).await
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
