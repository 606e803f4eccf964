// Conn Monitor - Deny List
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! In-process set of blocked addresses, enforced by the relay.
//!
//! Every block bumps a change counter so relayed connections that are
//! already open can re-check their peer.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::info;

use super::{BlockDirective, BlockSink};

/// A recorded block.
#[derive(Debug, Clone, PartialEq)]
pub struct DenyEntry {
    pub comment: String,
    pub blocked_at: DateTime<Utc>,
}

/// Blocked addresses keyed by their textual form.
///
/// Entries that do not parse as an address are kept but never match a
/// peer.
#[derive(Debug)]
pub struct DenyList {
    entries: RwLock<HashMap<String, DenyEntry>>,
    changes: watch::Sender<u64>,
}

impl Default for DenyList {
    fn default() -> Self {
        Self {
            entries: RwLock::default(),
            changes: watch::Sender::new(0),
        }
    }
}

impl DenyList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receiver notified after every added block.
    fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    /// Resolve once `ip` is covered by a block.
    ///
    /// Never resolves for an address that stays unblocked.
    pub async fn blocked(&self, ip: IpAddr) -> DenyEntry {
        let mut changes = self.subscribe();
        loop {
            if let Some(entry) = self.find(ip) {
                return entry;
            }
            if changes.changed().await.is_err() {
                return std::future::pending().await;
            }
        }
    }

    /// The block covering `ip`, if connections from it must be refused.
    pub fn find(&self, ip: IpAddr) -> Option<DenyEntry> {
        let entries = self.entries.read().ok()?;
        if let Some(entry) = entries.get(&ip.to_string()) {
            return Some(entry.clone());
        }
        // An IPv4 block also covers the IPv4-mapped IPv6 form of that peer.
        match ip {
            IpAddr::V6(v6) => v6
                .to_ipv4_mapped()
                .and_then(|v4| entries.get(&v4.to_string()).cloned()),
            IpAddr::V4(_) => None,
        }
    }
}

/// Canonical key for `ip`: parsed addresses use their display form so
/// `0:0:0:0:0:0:0:1` and `::1` share one entry.
fn normalize(ip: &str) -> String {
    ip.parse::<IpAddr>()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| ip.to_string())
}

impl BlockSink for DenyList {
    fn add_block(&self, directive: &BlockDirective) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| anyhow!("Deny list lock poisoned"))?;
        entries.insert(
            normalize(&directive.ip),
            DenyEntry {
                comment: directive.comment.clone(),
                blocked_at: Utc::now(),
            },
        );
        info!(
            "Added {} to deny list ({} entries): {}",
            directive.ip,
            entries.len(),
            directive.comment
        );
        drop(entries);
        self.changes.send_modify(|generation| *generation += 1);
        Ok(())
    }
}

#[cfg(test)]
impl DenyList {
    /// Whether an entry exists for exactly this text.
    pub fn contains_text(&self, ip: &str) -> bool {
        self.entries
            .read()
            .map(|e| e.contains_key(&normalize(ip)))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
