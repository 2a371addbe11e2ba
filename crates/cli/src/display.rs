// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Plain-text rendering of tickets, snapshots and events.

use chrono::{DateTime, Local, Utc};

use tl_core::{
    ConnectionStatus, DomainEvent, EventPayload, QueueView, SnapshotMeta, Ticket, WaitingTicket,
};

/// Renders a duration in milliseconds as `1h 05m`, `3m 12s` or `42s`.
pub fn format_duration_ms(ms: u64) -> String {
    let secs = ms / 1000;
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{}h {:02}m", h, m)
    } else if m > 0 {
        format!("{}m {:02}s", m, s)
    } else {
        format!("{}s", s)
    }
}

fn local_time(at: &DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%H:%M:%S").to_string()
}

pub fn format_waiting(entry: &WaitingTicket) -> String {
    let ticket = &entry.ticket;
    let routed = ticket
        .routed_to
        .as_deref()
        .map(|sp| format!(" -> {}", sp))
        .unwrap_or_default();
    format!(
        "{:<6} {:<24} {:<8} waiting {}{}",
        ticket.code,
        ticket.category.as_str(),
        ticket.subcategory.as_str(),
        format_duration_ms(entry.waited_ms),
        routed
    )
}

pub fn format_called(ticket: &Ticket) -> String {
    let called = ticket
        .called_at
        .as_ref()
        .map(local_time)
        .unwrap_or_default();
    format!(
        "{:<6} {:<12} {} ({})",
        ticket.code,
        ticket.service_point.as_deref().unwrap_or("-"),
        called,
        ticket.state.as_str()
    )
}

pub fn format_snapshot(meta: &SnapshotMeta) -> String {
    format!(
        "{}  {:<9} {} tickets  {}",
        meta.key,
        meta.kind.as_str(),
        meta.ticket_count,
        meta.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M")
    )
}

fn format_status(status: &ConnectionStatus) -> String {
    match status {
        ConnectionStatus::Connecting => "connecting".to_string(),
        ConnectionStatus::Connected => "connected".to_string(),
        ConnectionStatus::Reconnecting { attempt } => format!("reconnecting (attempt {})", attempt),
        ConnectionStatus::Fallback { retrying: true } => {
            "relay unreachable, using poll queue".to_string()
        }
        ConnectionStatus::Fallback { retrying: false } => {
            "relay unreachable, using poll queue (press r to retry)".to_string()
        }
        ConnectionStatus::Disconnected => "disconnected".to_string(),
    }
}

/// One line for `tally watch`. Sync traffic is not shown.
pub fn format_event(event: &DomainEvent) -> Option<String> {
    let line = match &event.payload {
        EventPayload::TicketCreated { ticket } => {
            format!("issued {} ({} / {})", ticket.code, ticket.category, ticket.subcategory)
        }
        EventPayload::TicketCalled { ticket } => format!(
            "calling {} at {}",
            ticket.code,
            ticket.service_point.as_deref().unwrap_or("-")
        ),
        EventPayload::TicketDirected { ticket } => format!(
            "routed {} to {}",
            ticket.code,
            ticket.routed_to.as_deref().unwrap_or("-")
        ),
        EventPayload::TicketCompleted { ticket, record } => format!(
            "completed {} by {} in {}",
            ticket.code,
            record.actor_id,
            format_duration_ms(record.service_duration_ms)
        ),
        EventPayload::TicketCancelled { ticket } => format!("cancelled {}", ticket.code),
        EventPayload::SystemBackup { key, .. } => format!("backup {}", key),
        EventPayload::SystemRestore { key } => format!("restored from {}", key),
        EventPayload::ConnectionStatus { status } => format_status(status),
        EventPayload::PeerJoined { client_id } => format!("{} joined", client_id),
        EventPayload::PeerLeft { client_id } => format!("{} left", client_id),
        EventPayload::DataRequested { .. }
        | EventPayload::DataResponse { .. }
        | EventPayload::DataUpdate { .. } => return None,
    };
    Some(format!("[{}] {}", local_time(&event.timestamp), line))
}

/// Summary line of the queue board: how many wait and who is being served.
pub fn format_board(view: &QueueView) -> String {
    let serving = view
        .displayed()
        .map(|t| format!("now serving {}", t.code))
        .unwrap_or_else(|| "nobody called yet".to_string());
    format!(
        "  {} waiting, {} served, {}",
        view.waiting(None).len(),
        view.completed_count(),
        serving
    )
}

#[cfg(test)]
#[path = "display_tests.rs"]
mod tests;
