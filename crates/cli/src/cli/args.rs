// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Argument groups shared by several commands.

use clap::Args;

use tl_core::{Category, Subcategory};

/// Category and subcategory of a ticket.
#[derive(Args, Clone, Debug)]
pub struct TicketKindArgs {
    /// general, marriage, name_change, transfer or late_death_registration
    pub category: String,

    /// normal, priority or special
    #[arg(long, short, default_value = "normal")]
    pub subcategory: String,
}

impl TicketKindArgs {
    pub fn parse(&self) -> tl_core::Result<(Category, Subcategory)> {
        Ok((self.category.parse()?, self.subcategory.parse()?))
    }
}

#[derive(Args, Clone, Debug)]
pub struct LimitArgs {
    /// Maximum number of results
    #[arg(short = 'n', long, default_value_t = 10)]
    pub limit: usize,
}
