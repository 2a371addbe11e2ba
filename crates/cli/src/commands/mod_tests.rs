// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

//! Test infrastructure for running commands against a throwaway engine.
//!
//! ```rust,ignore
//! let ctx = TestContext::new().await;
//! let code = ctx.issue(Category::General).await;
//! ticket::call(&ctx.engine, &kind("general"), "desk-1").await.unwrap();
//! ```

use tempfile::TempDir;
use tl_core::{Category, Subcategory, Ticket};

use crate::cli::TicketKindArgs;
use crate::config::Config;
use crate::engine::Engine;

pub struct TestContext {
    pub engine: Engine,
    pub dir: TempDir,
}

impl TestContext {
    /// An in-memory engine with default config.
    pub async fn new() -> Self {
        let dir = TempDir::new().expect("temp dir");
        let engine = Engine::ephemeral(dir.path(), Config::default())
            .await
            .expect("engine");
        TestContext { engine, dir }
    }

    pub async fn issue(&self, category: Category) -> Ticket {
        self.engine
            .ledger()
            .issue(category, Subcategory::Normal)
            .await
            .unwrap()
    }

    pub async fn called(&self, category: Category, service_point: &str) -> Ticket {
        self.issue(category).await;
        self.engine
            .ledger()
            .call_next(category, Subcategory::Normal, service_point)
            .await
            .unwrap()
            .expect("a waiting ticket")
    }

    pub async fn ticket(&self, id_or_code: &str) -> Ticket {
        self.engine.ledger().find(id_or_code).await.unwrap()
    }
}

pub fn kind(category: &str) -> TicketKindArgs {
    TicketKindArgs {
        category: category.to_string(),
        subcategory: "normal".to_string(),
    }
}
