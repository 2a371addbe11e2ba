// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use tl_core::{Category, Ticket, WaitingTicket};

use crate::cli::OutputFormat;
use crate::display::{format_called, format_duration_ms, format_waiting};
use crate::engine::Engine;
use crate::error::Result;

use super::print_json;

pub async fn waiting(
    engine: &Engine,
    category: Option<&str>,
    output: OutputFormat,
) -> Result<Vec<WaitingTicket>> {
    let category: Option<Category> = category.map(str::parse).transpose()?;
    let waiting = engine.ledger().list_waiting(category).await?;
    match output {
        OutputFormat::Json => print_json(&waiting)?,
        OutputFormat::Text if waiting.is_empty() => println!("Nobody is waiting"),
        OutputFormat::Text => {
            for entry in &waiting {
                println!("{}", format_waiting(entry));
            }
        }
    }
    Ok(waiting)
}

pub async fn called(engine: &Engine, limit: usize, output: OutputFormat) -> Result<Vec<Ticket>> {
    let called = engine.ledger().list_called(limit).await?;
    match output {
        OutputFormat::Json => print_json(&called)?,
        OutputFormat::Text => {
            for ticket in &called {
                println!("{}", format_called(ticket));
            }
        }
    }
    Ok(called)
}

/// What the public screen shows: the last called ticket.
pub async fn display(engine: &Engine) -> Result<Option<Ticket>> {
    let current = engine.ledger().currently_displayed().await?;
    match &current {
        Some(ticket) => println!(
            "{}  ->  {}",
            ticket.code,
            ticket.service_point.as_deref().unwrap_or("-")
        ),
        None => println!("No ticket has been called yet"),
    }
    Ok(current)
}

pub async fn overdue(engine: &Engine) -> Result<Vec<Ticket>> {
    let overdue = engine.ledger().overdue().await?;
    let limit = engine.ledger().settings().await?.max_service_ms();
    if overdue.is_empty() {
        println!("No service has run past {}", format_duration_ms(limit));
    }
    for ticket in &overdue {
        println!("{}", format_called(ticket));
    }
    Ok(overdue)
}

#[cfg(test)]
#[path = "list_tests.rs"]
mod tests;
