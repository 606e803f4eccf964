// Conn Monitor - Configuration
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! Sidecar settings loaded from a local JSON file.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Sidecar settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSettings {
    /// Address the control API listens on.
    #[serde(default = "default_api_listen")]
    pub api_listen: SocketAddr,
    /// Emit informational log lines.
    #[serde(default)]
    pub log_enabled: bool,
    /// Traffic sampling period in milliseconds.
    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,
    /// Caller addresses allowed to use the control endpoints.
    #[serde(default = "default_allowed_ips")]
    pub allowed_ips: Vec<String>,
    /// Comment attached to every block directive.
    #[serde(default = "default_block_comment")]
    pub block_comment: String,
    /// Relay in front of the monitored server; `null` disables it.
    #[serde(default = "default_relay")]
    pub relay: Option<RelaySettings>,
    /// Also block through firewalld when set.
    #[serde(default)]
    pub firewalld: Option<FirewalldSettings>,
}

/// Relay listener and upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelaySettings {
    #[serde(default = "default_relay_listen")]
    pub listen: SocketAddr,
    #[serde(default = "default_relay_upstream")]
    pub upstream: SocketAddr,
}

/// Firewalld block sink options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FirewalldSettings {
    /// Zone for the reject rules; empty for the default zone.
    #[serde(default)]
    pub zone: String,
    /// Write rules to the permanent configuration as well.
    #[serde(default)]
    pub permanent: bool,
}

fn default_api_listen() -> SocketAddr { SocketAddr::from(([127, 0, 0, 1], 9870)) }
fn default_sample_interval_ms() -> u64 { 5000 }
fn default_allowed_ips() -> Vec<String> {
    ["127.0.0.1", "::1", "::ffff:127.0.0.1"].map(String::from).to_vec()
}
fn default_block_comment() -> String { "Blocked by Conn Monitor".to_string() }
fn default_relay() -> Option<RelaySettings> { Some(RelaySettings::default()) }
fn default_relay_listen() -> SocketAddr { SocketAddr::from(([0, 0, 0, 0], 8080)) }
fn default_relay_upstream() -> SocketAddr { SocketAddr::from(([127, 0, 0, 1], 8000)) }

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            api_listen: default_api_listen(),
            log_enabled: false,
            sample_interval_ms: default_sample_interval_ms(),
            allowed_ips: default_allowed_ips(),
            block_comment: default_block_comment(),
            relay: default_relay(),
            firewalld: None,
        }
    }
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            listen: default_relay_listen(),
            upstream: default_relay_upstream(),
        }
    }
}

impl AppSettings {
    /// Sampling period as a duration, never shorter than one millisecond.
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms.max(1))
    }
}

/// Settings manager backed by a JSON file.
#[derive(Debug)]
pub struct Settings {
    settings: AppSettings,
    path: PathBuf,
}

impl Settings {
    /// Default location of the settings file.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("conn-monitor")
            .join("settings.json")
    }

    /// Load settings from `path`, or from the default location.
    ///
    /// A missing file yields defaults. A file that cannot be read or parsed
    /// is reported and also yields defaults.
    pub fn load(path: Option<&Path>) -> Self {
        let path = path.map(Path::to_path_buf).unwrap_or_else(Self::default_path);

        let settings = if path.exists() {
            match fs::read_to_string(&path) {
                Ok(content) => {
                    match serde_json::from_str(&content) {
                        Ok(s) => s,
                        Err(e) => {
                            warn!("Failed to parse settings {}: {}", path.display(), e);
                            AppSettings::default()
                        }
                    }
                }
                Err(e) => {
                    warn!("Failed to read settings {}: {}", path.display(), e);
                    AppSettings::default()
                }
            }
        } else {
            AppSettings::default()
        };

        Self { settings, path }
    }

    /// Save settings to disk.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let content = serde_json::to_string_pretty(&self.settings)
            .context("Failed to serialize settings")?;
        fs::write(&self.path, content)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self) -> &AppSettings {
        &self.settings
    }

    pub fn into_inner(self) -> AppSettings {
        self.settings
    }
}
