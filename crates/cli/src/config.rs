// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Client configuration.
//!
//! Configuration lives in `tally.toml` inside the data directory and includes:
//! - `client_name`: how this station is labelled in presence and snapshots
//! - `[queue]`: categories and service limits handed to the ledger
//! - `[store]`: backend choice and byte quota
//! - `[remote]`: relay connection, absent for a standalone station
//! - `[backup]`: snapshot schedule and retention

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tl_core::{BackupConfig, QueueSettings, StoreConfig};

use crate::error::{Error, Result};

pub const CONFIG_FILE_NAME: &str = "tally.toml";
const DATA_DIR_NAME: &str = "tally";
pub const DATA_DIR_ENV: &str = "TALLY_DATA_DIR";

/// Client configuration stored in `tally.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_client_name")]
    pub client_name: String,
    /// Written to the store's `settings` key when the file has a `[queue]` table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue: Option<QueueSettings>,
    #[serde(default)]
    pub store: StoreConfig,
    /// Relay connection (optional - if absent, runs in local-only mode).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<RemoteConfig>,
    #[serde(default)]
    pub backup: BackupConfig,
}

fn default_client_name() -> String {
    "station".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Config {
            client_name: default_client_name(),
            queue: None,
            store: StoreConfig::default(),
            remote: None,
            backup: BackupConfig::default(),
        }
    }
}

/// Relay connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Relay URL, `ws://...` or `wss://...`.
    #[serde(default = "default_url")]
    pub url: String,
    /// Fixed delay between reconnection attempts in milliseconds (default: 3000).
    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,
    /// Attempts before the channel stops retrying and stays on the poll queue (default: 10).
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    /// Consecutive failures before the poll queue takes over (default: 3).
    #[serde(default = "default_fallback_after_failures")]
    pub fallback_after_failures: u32,
    /// Heartbeat ping interval in milliseconds (default: 30000). 0 = disabled.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// Max time to wait for pong response in milliseconds (default: 10000).
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,
    /// Poll queue read interval in milliseconds (default: 2000).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Shared poll queue file, relative to the data directory.
    #[serde(default = "default_poll_queue")]
    pub poll_queue: String,
    /// Seconds a poll queue entry is kept for slower readers (default: 120).
    #[serde(default = "default_poll_retention_secs")]
    pub poll_retention_secs: u64,
    /// Seconds without a peer bundle before state is requested again (default: 60).
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
}

fn default_url() -> String {
    "ws://localhost:7890".to_string()
}

fn default_reconnect_interval_ms() -> u64 {
    3_000
}

fn default_max_reconnect_attempts() -> u32 {
    10
}

fn default_fallback_after_failures() -> u32 {
    3
}

fn default_heartbeat_interval_ms() -> u64 {
    30_000
}

fn default_heartbeat_timeout_ms() -> u64 {
    10_000
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

fn default_poll_queue() -> String {
    "events.jsonl".to_string()
}

fn default_poll_retention_secs() -> u64 {
    120
}

fn default_stale_after_secs() -> u64 {
    60
}

impl Default for RemoteConfig {
    fn default() -> Self {
        RemoteConfig {
            url: default_url(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            fallback_after_failures: default_fallback_after_failures(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            heartbeat_timeout_ms: default_heartbeat_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            poll_queue: default_poll_queue(),
            poll_retention_secs: default_poll_retention_secs(),
            stale_after_secs: default_stale_after_secs(),
        }
    }
}

impl RemoteConfig {
    /// Rejects anything that is not a WebSocket URL.
    pub fn validate(&self) -> Result<()> {
        let rest = self
            .url
            .strip_prefix("ws://")
            .or_else(|| self.url.strip_prefix("wss://"));
        match rest {
            Some(host) if !host.is_empty() => Ok(()),
            _ => Err(Error::InvalidRemoteUrl(self.url.clone())),
        }
    }

    /// Path of the shared poll queue.
    pub fn poll_queue_path(&self, data_dir: &Path) -> PathBuf {
        let path = Path::new(&self.poll_queue);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            data_dir.join(path)
        }
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}

impl Config {
    /// Loads `tally.toml` from `data_dir`. A missing file yields the defaults.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let config_path = data_dir.join(CONFIG_FILE_NAME);
        let content = match fs::read_to_string(&config_path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Config::default()),
            Err(e) => return Err(Error::Config(format!("failed to read config: {}", e))),
        };
        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;
        if let Some(remote) = &config.remote {
            remote.validate()?;
        }
        Ok(config)
    }

    /// Saves configuration to `data_dir`.
    pub fn save(&self, data_dir: &Path) -> Result<()> {
        let config_path = data_dir.join(CONFIG_FILE_NAME);
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("failed to serialize config: {}", e)))?;
        fs::write(&config_path, content)?;
        Ok(())
    }

    /// Returns true if a relay is configured.
    pub fn is_remote_mode(&self) -> bool {
        self.remote.is_some()
    }
}

/// Resolves the data directory: explicit flag, then `TALLY_DATA_DIR`, then
/// the platform's local data directory.
pub fn resolve_data_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = explicit {
        return Ok(dir.to_path_buf());
    }
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    dirs::data_local_dir()
        .map(|dir| dir.join(DATA_DIR_NAME))
        .ok_or(Error::NoDataDir)
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
