// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

mod args;

pub use args::{LimitArgs, TicketKindArgs};

/// Output format for listing commands.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

const EXAMPLES_HELP: &str = "\
Get started:
  tally issue general                   Issue a general ticket
  tally call general --at desk-1        Call the next general ticket to desk 1
  tally complete G001 --by clerk-7      Finish serving G001
  tally waiting                         Show who is still waiting
  tally watch                           Stay connected and follow events";

#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Walk-in service queue: issue, call and serve numbered tickets")]
#[command(after_help = EXAMPLES_HELP)]
pub struct Cli {
    /// Data directory (defaults to $TALLY_DATA_DIR, then the platform data dir)
    #[arg(long, global = true, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Keep all state in memory; nothing is written to disk
    #[arg(long, global = true)]
    pub ephemeral: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Issue a new ticket
    Issue {
        #[command(flatten)]
        kind: TicketKindArgs,

        #[arg(long = "output", short = 'o', value_enum, default_value = "text")]
        output: OutputFormat,
    },

    /// Call the next waiting ticket to a service point
    Call {
        #[command(flatten)]
        kind: TicketKindArgs,

        /// Service point calling the ticket
        #[arg(long = "at", value_name = "SERVICE_POINT")]
        service_point: String,
    },

    /// Direct a waiting ticket to a service point
    #[command(arg_required_else_help = true)]
    Route {
        /// Ticket id or code
        ticket: String,

        /// Service point the ticket should be served at
        #[arg(long = "to", value_name = "SERVICE_POINT")]
        service_point: String,
    },

    /// Announce a called ticket again
    #[command(arg_required_else_help = true)]
    Recall {
        /// Ticket id or code
        ticket: String,
    },

    /// Finish serving a called ticket
    #[command(arg_required_else_help = true)]
    Complete {
        /// Ticket id or code
        ticket: String,

        /// Staff member who served the ticket
        #[arg(long = "by", value_name = "ACTOR")]
        actor: String,
    },

    /// Remove a waiting ticket from the queue
    #[command(arg_required_else_help = true)]
    Cancel {
        /// Ticket id or code
        ticket: String,
    },

    /// List waiting tickets, oldest first
    Waiting {
        /// Only this category
        #[arg(long, short)]
        category: Option<String>,

        #[arg(long = "output", short = 'o', value_enum, default_value = "text")]
        output: OutputFormat,
    },

    /// List called tickets, most recent first
    Called {
        #[command(flatten)]
        limit: LimitArgs,

        #[arg(long = "output", short = 'o', value_enum, default_value = "text")]
        output: OutputFormat,
    },

    /// Show the ticket currently on the public display
    Display,

    /// List called tickets whose service has run too long
    Overdue,

    /// Manage snapshots
    #[command(subcommand)]
    Backup(BackupCommand),

    /// Write the full queue state to a JSON file
    #[command(arg_required_else_help = true)]
    Export {
        /// Output file
        file: PathBuf,
    },

    /// Replace the full queue state from a JSON file
    #[command(arg_required_else_help = true)]
    Import {
        /// Input file written by `tally export`
        file: PathBuf,
    },

    /// Connect to the relay and follow queue events until interrupted
    #[command(after_help = "\
While running:
  r + Enter    Retry the relay connection now
  q + Enter    Quit")]
    Watch,
}

#[derive(Subcommand)]
pub enum BackupCommand {
    /// Take a manual snapshot
    Create,

    /// List snapshots, newest first
    List {
        #[arg(long = "output", short = 'o', value_enum, default_value = "text")]
        output: OutputFormat,
    },

    /// Restore the queue from a snapshot
    #[command(arg_required_else_help = true)]
    Restore {
        /// Snapshot key (see `tally backup list`)
        key: String,
    },

    /// Delete a snapshot
    #[command(arg_required_else_help = true)]
    Delete {
        /// Snapshot key
        key: String,
    },
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
