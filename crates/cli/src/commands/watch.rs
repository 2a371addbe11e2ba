// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Long-running station mode.
//!
//! Joins the relay, keeps the local state in step with peers, runs the
//! automatic backups and prints queue events until interrupted.

use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use tl_core::QueueView;

use crate::display::{format_board, format_event};
use crate::engine::Engine;
use crate::error::Result;

pub async fn run(engine: &Engine) -> Result<()> {
    let session = engine.connect().await?;
    let view = QueueView::from_bundle(&engine.ledger().export_bundle().await?);
    println!("{}", format_board(&view));
    let view = Arc::new(Mutex::new(view));

    let printer = engine.bus().on_any(move |event| {
        if let Some(line) = format_event(event) {
            println!("{}", line);
        }
        let mut view = view.lock().unwrap_or_else(|e| e.into_inner());
        if view.apply(event) {
            println!("{}", format_board(&view));
        }
    });
    engine.backups().start_auto_backup();

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!("cannot listen for ctrl-c: {}", e);
                }
                break;
            }
            line = stdin.next_line(), if stdin_open => match line {
                Ok(Some(line)) => match line.trim() {
                    "r" => {
                        info!("reconnect requested");
                        session.channel().reconnect();
                    }
                    "q" => break,
                    "" => {}
                    other => println!("unknown input '{}': r to reconnect, q to quit", other),
                },
                // Detached stdin; keep running until a signal.
                Ok(None) => stdin_open = false,
                Err(e) => {
                    warn!("stdin closed: {}", e);
                    stdin_open = false;
                }
            },
        }
    }

    engine.backups().stop_auto_backup().await;
    session.close().await;
    engine.bus().off_any(printer);
    Ok(())
}
