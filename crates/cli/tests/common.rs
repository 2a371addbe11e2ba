// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

// Shared across test binaries; not every file uses every helper.
#![allow(dead_code)]
#![allow(unused_imports)]

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;

pub use predicates::prelude::*;
pub use tempfile::TempDir;

/// `tally` pointed at `dir` through the environment, with logging quiet.
pub fn tally(dir: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("tally");
    cmd.env("TALLY_DATA_DIR", dir.path()).env("RUST_LOG", "warn");
    cmd
}

pub fn issue(dir: &TempDir, category: &str) -> String {
    let output = tally(dir).arg("issue").arg(category).output().unwrap();
    String::from_utf8_lossy(&output.stdout)
        .split_whitespace()
        .nth(1)
        .unwrap()
        .to_string()
}
