// Conn Monitor - Connection Summaries
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! Client-facing view of a connection.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::registry::Connection;
use crate::stats::connection_speed;

type Lookup = fn(&Connection) -> Option<&str>;

/// Sources for the user name, in order of preference.
const USER_LOOKUPS: [Lookup; 2] = [account_name, forwarded_user];
/// Sources for the requested resource, in order of preference.
const FILE_LOOKUPS: [Lookup; 2] = [original_uri, request_target];

fn account_name(c: &Connection) -> Option<&str> {
    c.account.as_deref()
}

fn forwarded_user(c: &Connection) -> Option<&str> {
    c.forwarded_user.as_deref()
}

fn original_uri(c: &Connection) -> Option<&str> {
    c.original_uri.as_deref()
}

fn request_target(c: &Connection) -> Option<&str> {
    c.request_target.as_deref()
}

fn first_of(conn: &Connection, lookups: &[Lookup]) -> Option<String> {
    lookups
        .iter()
        .filter_map(|lookup| lookup(conn))
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSummary {
    pub ip: String,
    pub user: String,
    pub started: String,
    pub sent: u64,
    pub received: u64,
    pub user_agent: Option<String>,
    pub id: u64,
    pub file: String,
    /// Bytes per second since the connection started.
    pub speed: f64,
}

impl ConnectionSummary {
    pub fn from_connection(conn: &Connection, now: DateTime<Utc>) -> Self {
        let started = conn.start_time().unwrap_or(now);
        Self {
            ip: conn.ip.to_string(),
            user: first_of(conn, &USER_LOOKUPS).unwrap_or_else(|| "Anonymous".to_string()),
            started: started.to_rfc3339_opts(SecondsFormat::Millis, true),
            sent: if conn.byte_counters_available { conn.bytes_sent } else { 0 },
            received: if conn.byte_counters_available { conn.bytes_received } else { 0 },
            user_agent: conn.user_agent.clone(),
            id: conn.id,
            file: first_of(conn, &FILE_LOOKUPS).unwrap_or_else(|| "N/A".to_string()),
            speed: connection_speed(conn, now),
        }
    }
}
