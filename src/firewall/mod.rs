// Conn Monitor - Firewall Module
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! Block sinks: the mechanisms that stop traffic from blocked addresses.

mod client;
mod deny_list;

use std::sync::Arc;

use anyhow::Result;

pub use client::FirewalldSink;
pub use deny_list::DenyList;

/// D-Bus bus name for firewalld.
pub const BUS_NAME: &str = "org.fedoraproject.FirewallD1";

/// D-Bus object paths.
pub mod paths {
    pub const ROOT: &str = "/org/fedoraproject/FirewallD1";
    pub const CONFIG: &str = "/org/fedoraproject/FirewallD1/config";
}

/// D-Bus interface names.
pub mod interfaces {
    /// Main firewalld interface (for getDefaultZone)
    pub const MAIN: &str = "org.fedoraproject.FirewallD1";
    /// Zone interface (for runtime rich rules)
    pub const ZONE: &str = "org.fedoraproject.FirewallD1.zone";
    pub const CONFIG: &str = "org.fedoraproject.FirewallD1.config";
    pub const CONFIG_ZONE: &str = "org.fedoraproject.FirewallD1.config.zone";
}

/// Request to stop traffic from one address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockDirective {
    /// IPv4 or IPv6 literal as supplied by the caller.
    pub ip: String,
    /// Human-readable note stored alongside the block.
    pub comment: String,
}

impl BlockDirective {
    pub fn new(ip: impl Into<String>, comment: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            comment: comment.into(),
        }
    }
}

/// Something that can enforce a block directive.
///
/// Implementations may block the calling thread.
pub trait BlockSink: Send + Sync {
    fn add_block(&self, directive: &BlockDirective) -> Result<()>;
}

/// Sink that forwards every directive to several sinks in order.
///
/// Stops at the first failure.
pub struct FanoutSink {
    sinks: Vec<Arc<dyn BlockSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn BlockSink>>) -> Self {
        Self { sinks }
    }
}

impl BlockSink for FanoutSink {
    fn add_block(&self, directive: &BlockDirective) -> Result<()> {
        for sink in &self.sinks {
            sink.add_block(directive)?;
        }
        Ok(())
    }
}
