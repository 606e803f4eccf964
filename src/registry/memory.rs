// Conn Monitor - In-Memory Registry
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! Connection registry backed by live, shared counters.
//!
//! Producers (the relay) register a connection and receive a
//! [`ConnectionHandle`]. The handle updates counters without locking and
//! removes the entry from the registry when dropped.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use tracing::debug;

use super::models::{Connection, RequestDetails};
use super::ConnectionRegistry;

#[derive(Debug)]
struct Entry {
    id: u64,
    ip: IpAddr,
    accepted_at: DateTime<Utc>,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    request: RwLock<Option<(DateTime<Utc>, RequestDetails)>>,
}

impl Entry {
    fn snapshot(&self) -> Connection {
        let mut conn = Connection::new(self.id, self.ip);
        conn.timestamp = Some(self.accepted_at);
        conn.bytes_sent = self.bytes_sent.load(Ordering::Relaxed);
        conn.bytes_received = self.bytes_received.load(Ordering::Relaxed);

        if let Ok(request) = self.request.read() {
            if let Some((started, details)) = request.as_ref() {
                conn.started = Some(*started);
                conn.account = details.account.clone();
                conn.forwarded_user = details.forwarded_user.clone();
                conn.user_agent = details.user_agent.clone();
                conn.original_uri = details.original_uri.clone();
                conn.request_target = details.request_target.clone();
            }
        }
        conn
    }
}

type EntryMap = BTreeMap<u64, Arc<Entry>>;

/// Registry of connections tracked inside this process.
///
/// Iteration order is registration order.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    next_id: AtomicU64,
    entries: Arc<RwLock<EntryMap>>,
}

impl MemoryRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a newly accepted connection from `ip`.
    pub fn register(&self, ip: IpAddr) -> ConnectionHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let entry = Arc::new(Entry {
            id,
            ip,
            accepted_at: Utc::now(),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            request: RwLock::new(None),
        });

        if let Ok(mut entries) = self.entries.write() {
            entries.insert(id, Arc::clone(&entry));
            debug!("Registered connection {} from {} ({} active)", id, ip, entries.len());
        }

        ConnectionHandle {
            entry,
            entries: Arc::clone(&self.entries),
        }
    }
}

#[cfg(test)]
impl MemoryRegistry {
    /// Number of connections currently tracked.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ConnectionRegistry for MemoryRegistry {
    fn list_connections(&self) -> Result<Vec<Connection>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| anyhow!("Connection registry lock poisoned"))?;
        Ok(entries.values().map(|entry| entry.snapshot()).collect())
    }
}

/// Live handle to one registered connection.
#[derive(Debug)]
pub struct ConnectionHandle {
    entry: Arc<Entry>,
    entries: Arc<RwLock<EntryMap>>,
}

impl ConnectionHandle {
    pub fn id(&self) -> u64 {
        self.entry.id
    }

    /// Account for bytes written to the peer.
    pub fn add_sent(&self, bytes: u64) {
        self.entry.bytes_sent.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Account for bytes read from the peer.
    pub fn add_received(&self, bytes: u64) {
        self.entry.bytes_received.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record the first request seen on this connection.
    ///
    /// Later calls are ignored so `started` stays at the first request.
    pub fn record_request(&self, details: RequestDetails) {
        if let Ok(mut request) = self.entry.request.write() {
            if request.is_none() {
                *request = Some((Utc::now(), details));
            }
        }
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(&self.entry.id);
        }
        debug!("Released connection {}", self.entry.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    #[test]
    fn test_register_and_release() {
        let registry = MemoryRegistry::new();
        let first = registry.register(ip(1));
        let second = registry.register(ip(2));
        assert_eq!(registry.len(), 2);

        drop(first);
        let conns = registry.list_connections().unwrap();
        assert_eq!(conns.len(), 1);
        assert_eq!(conns[0].id, second.id());
        assert_eq!(conns[0].ip, ip(2));
    }

    #[test]
    fn test_snapshot_preserves_registration_order() {
        let registry = MemoryRegistry::new();
        let handles: Vec<_> = (1..=5).map(|n| registry.register(ip(n))).collect();
        let ids: Vec<u64> = registry
            .list_connections()
            .unwrap()
            .iter()
            .map(|c| c.id)
            .collect();
        let expected: Vec<u64> = handles.iter().map(|h| h.id()).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_counters_and_request_details() {
        let registry = MemoryRegistry::new();
        let handle = registry.register(ip(7));
        handle.add_sent(100);
        handle.add_sent(50);
        handle.add_received(10);
        handle.record_request(RequestDetails {
            request_target: Some("/files/a.iso".to_string()),
            user_agent: Some("curl/8.0".to_string()),
            ..Default::default()
        });
        handle.record_request(RequestDetails {
            request_target: Some("/other".to_string()),
            ..Default::default()
        });

        let conn = &registry.list_connections().unwrap()[0];
        assert_eq!(conn.bytes_sent, 150);
        assert_eq!(conn.bytes_received, 10);
        assert!(conn.byte_counters_available);
        assert!(conn.started.is_some());
        assert!(conn.timestamp.is_some());
        assert_eq!(conn.request_target.as_deref(), Some("/files/a.iso"));
        assert_eq!(conn.user_agent.as_deref(), Some("curl/8.0"));
    }
}
