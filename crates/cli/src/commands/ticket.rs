// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Ticket lifecycle commands.
//!
//! Tickets are addressed by id or by display code; a code resolves to the
//! most recently issued ticket carrying it.

use tl_core::Ticket;

use crate::cli::{OutputFormat, TicketKindArgs};
use crate::engine::Engine;
use crate::error::{Error, Result};

use super::print_json;

fn service_point(name: &str) -> Result<&str> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(Error::EmptyServicePoint);
    }
    Ok(trimmed)
}

pub async fn issue(engine: &Engine, kind: &TicketKindArgs, output: OutputFormat) -> Result<Ticket> {
    let (category, subcategory) = kind.parse()?;
    let ticket = engine.ledger().issue(category, subcategory).await?;
    match output {
        OutputFormat::Text => println!("Issued {} ({} / {})", ticket.code, category, subcategory),
        OutputFormat::Json => print_json(&ticket)?,
    }
    Ok(ticket)
}

/// Calls the next matching ticket. Finding nothing waiting is not an error.
pub async fn call(
    engine: &Engine,
    kind: &TicketKindArgs,
    service_point_name: &str,
) -> Result<Option<Ticket>> {
    let (category, subcategory) = kind.parse()?;
    let point = service_point(service_point_name)?;
    let called = engine
        .ledger()
        .call_next(category, subcategory, point)
        .await?;
    match &called {
        Some(ticket) => println!("Calling {} at {}", ticket.code, point),
        None => println!("No {} / {} tickets waiting", category, subcategory),
    }
    Ok(called)
}

pub async fn route(engine: &Engine, id_or_code: &str, service_point_name: &str) -> Result<Ticket> {
    let point = service_point(service_point_name)?;
    let ticket = engine.ledger().find(id_or_code).await?;
    let routed = engine.ledger().route(&ticket.id, point).await?;
    println!("Routed {} to {}", routed.code, point);
    Ok(routed)
}

pub async fn recall(engine: &Engine, id_or_code: &str) -> Result<Ticket> {
    let ticket = engine.ledger().find(id_or_code).await?;
    let recalled = engine.ledger().reissue_call(&ticket.id).await?;
    println!(
        "Calling {} at {} again",
        recalled.code,
        recalled.service_point.as_deref().unwrap_or("-")
    );
    Ok(recalled)
}

pub async fn complete(engine: &Engine, id_or_code: &str, actor: &str) -> Result<Ticket> {
    let ticket = engine.ledger().find(id_or_code).await?;
    let (completed, record) = engine.ledger().complete(&ticket.id, actor).await?;
    println!(
        "Completed {} ({})",
        completed.code,
        crate::display::format_duration_ms(record.service_duration_ms)
    );
    Ok(completed)
}

pub async fn cancel(engine: &Engine, id_or_code: &str) -> Result<Ticket> {
    let ticket = engine.ledger().find(id_or_code).await?;
    let cancelled = engine.ledger().cancel(&ticket.id).await?;
    println!("Cancelled {}", cancelled.code);
    Ok(cancelled)
}

#[cfg(test)]
#[path = "ticket_tests.rs"]
mod tests;
