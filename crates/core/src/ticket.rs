// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Core ticket types for the service queue.
//!
//! This module contains the fundamental data types: Ticket, Category,
//! Subcategory, TicketState, ServiceRecord and the Actor context supplied by
//! the authentication layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// The kind of service a client is queueing for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    General,
    Marriage,
    NameChange,
    Transfer,
    LateDeathRegistration,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::General,
        Category::Marriage,
        Category::NameChange,
        Category::Transfer,
        Category::LateDeathRegistration,
    ];

    /// Returns the string representation used in storage and display.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::General => "general",
            Category::Marriage => "marriage",
            Category::NameChange => "name_change",
            Category::Transfer => "transfer",
            Category::LateDeathRegistration => "late_death_registration",
        }
    }

    /// Letter that starts every ticket code in this category.
    pub fn prefix(&self) -> char {
        match self {
            Category::General => 'G',
            Category::Marriage => 'M',
            Category::NameChange => 'N',
            Category::Transfer => 'T',
            Category::LateDeathRegistration => 'D',
        }
    }

    /// Builds the display code for the `sequence`-th ticket of this category.
    pub fn code_for(&self, sequence: u32) -> String {
        format!("{}{:03}", self.prefix(), sequence)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "general" => Ok(Category::General),
            "marriage" => Ok(Category::Marriage),
            "name_change" => Ok(Category::NameChange),
            "transfer" => Ok(Category::Transfer),
            "late_death_registration" => Ok(Category::LateDeathRegistration),
            _ => Err(Error::InvalidCategory(s.to_string())),
        }
    }
}

/// Priority class within a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subcategory {
    Normal,
    Priority,
    Special,
}

impl Subcategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Subcategory::Normal => "normal",
            Subcategory::Priority => "priority",
            Subcategory::Special => "special",
        }
    }
}

impl fmt::Display for Subcategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Subcategory {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "normal" => Ok(Subcategory::Normal),
            "priority" => Ok(Subcategory::Priority),
            "special" => Ok(Subcategory::Special),
            _ => Err(Error::InvalidSubcategory(s.to_string())),
        }
    }
}

/// Lifecycle state of a ticket.
///
/// `Waiting -> Called -> Completed`. `Called -> Called` is a re-announcement
/// and keeps the state. Nothing leaves `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketState {
    Waiting,
    Called,
    Completed,
}

impl TicketState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketState::Waiting => "waiting",
            TicketState::Called => "called",
            TicketState::Completed => "completed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TicketState::Completed)
    }
}

impl fmt::Display for TicketState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One unit of queued work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: String,
    /// Display label such as `G007`.
    pub code: String,
    pub category: Category,
    pub subcategory: Subcategory,
    pub issued_at: DateTime<Utc>,
    /// Time of the most recent call; refreshed by re-announcements.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub called_at: Option<DateTime<Utc>>,
    /// Service point that called the ticket.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_point: Option<String>,
    /// Service point a supervisor directed the ticket to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routed_to: Option<String>,
    pub state: TicketState,
}

impl Ticket {
    /// Creates a waiting ticket.
    pub fn new(
        id: String,
        code: String,
        category: Category,
        subcategory: Subcategory,
        issued_at: DateTime<Utc>,
    ) -> Self {
        Ticket {
            id,
            code,
            category,
            subcategory,
            issued_at,
            called_at: None,
            service_point: None,
            routed_to: None,
            state: TicketState::Waiting,
        }
    }

    /// Checks the invariant that call data is present iff the ticket has
    /// left `Waiting`.
    pub fn is_consistent(&self) -> bool {
        let waiting = self.state == TicketState::Waiting;
        !self.id.is_empty()
            && !self.code.is_empty()
            && waiting == self.called_at.is_none()
            && waiting == self.service_point.is_none()
    }

    pub fn matches(&self, category: Category, subcategory: Subcategory) -> bool {
        self.category == category && self.subcategory == subcategory
    }
}

/// Completed-service history entry appended when a ticket is completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub ticket_id: String,
    pub code: String,
    pub category: Category,
    pub actor_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_point: Option<String>,
    pub completed_at: DateTime<Utc>,
    pub service_duration_ms: u64,
}

/// A waiting ticket annotated with how long it has been waiting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WaitingTicket {
    #[serde(flatten)]
    pub ticket: Ticket,
    pub waited_ms: u64,
}

/// Role of the person operating a terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Staff,
    Reception,
    Admin,
}

/// The current operator, as provided by the authentication layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub display_name: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_point: Option<String>,
}

/// Milliseconds from `from` to `to`, clamped at zero for skewed clocks.
pub fn elapsed_ms(from: DateTime<Utc>, to: DateTime<Utc>) -> u64 {
    u64::try_from((to - from).num_milliseconds()).unwrap_or(0)
}

#[cfg(test)]
#[path = "ticket_tests.rs"]
mod tests;
