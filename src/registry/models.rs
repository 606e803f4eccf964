// Conn Monitor - Connection Models
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! Data structures describing monitored connections.

use std::net::IpAddr;

use chrono::{DateTime, Utc};

/// Point-in-time view of one active connection.
///
/// Byte counters never decrease for the lifetime of a connection.
#[derive(Debug, Clone, PartialEq)]
pub struct Connection {
    /// Registry-assigned identifier.
    pub id: u64,
    /// Remote peer address.
    pub ip: IpAddr,
    /// User name carried by the client's own credentials.
    pub account: Option<String>,
    /// User name asserted by a fronting proxy.
    pub forwarded_user: Option<String>,
    /// When the first request was observed on this connection.
    pub started: Option<DateTime<Utc>>,
    /// When the connection was accepted.
    pub timestamp: Option<DateTime<Utc>>,
    /// Bytes written to the peer.
    pub bytes_sent: u64,
    /// Bytes read from the peer.
    pub bytes_received: u64,
    /// False when the transport exposes no byte counters.
    pub byte_counters_available: bool,
    pub user_agent: Option<String>,
    /// Resource path reported by a fronting proxy.
    pub original_uri: Option<String>,
    /// Request target from the first request line.
    pub request_target: Option<String>,
}

impl Connection {
    /// Create a connection with no traffic and no request details.
    pub fn new(id: u64, ip: IpAddr) -> Self {
        Self {
            id,
            ip,
            account: None,
            forwarded_user: None,
            started: None,
            timestamp: None,
            bytes_sent: 0,
            bytes_received: 0,
            byte_counters_available: true,
            user_agent: None,
            original_uri: None,
            request_target: None,
        }
    }

    /// Moment the connection is considered to have begun, if known.
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.started.or(self.timestamp)
    }

    /// Total bytes moved in both directions.
    pub fn total_bytes(&self) -> u64 {
        self.bytes_sent.saturating_add(self.bytes_received)
    }
}

/// Details sniffed from the first request head on a connection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestDetails {
    pub request_target: Option<String>,
    pub user_agent: Option<String>,
    pub account: Option<String>,
    pub forwarded_user: Option<String>,
    pub original_uri: Option<String>,
}
