// Conn Monitor - Firewalld Sink
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! Firewalld D-Bus block sink using source-address rich rules.

use std::net::IpAddr;
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use tracing::info;
use zbus::blocking::Connection;
use zbus::zvariant::{ObjectPath, OwnedObjectPath};

use super::{interfaces, paths, BlockDirective, BlockSink, BUS_NAME};

/// Block sink that rejects traffic from an address in a firewalld zone.
///
/// The system bus connection is opened on first use and reused afterward.
pub struct FirewalldSink {
    /// Target zone; empty means firewalld's default zone.
    zone: String,
    /// Also write the rule to the permanent configuration.
    permanent: bool,
    connection: Mutex<Option<Connection>>,
}

impl FirewalldSink {
    /// Create a sink for `zone`.
    pub fn new(zone: impl Into<String>, permanent: bool) -> Self {
        Self {
            zone: zone.into(),
            permanent,
            connection: Mutex::new(None),
        }
    }

    fn connection(&self) -> Result<Connection> {
        let mut cached = self
            .connection
            .lock()
            .map_err(|_| anyhow!("Firewalld connection lock poisoned"))?;
        if let Some(conn) = cached.as_ref() {
            return Ok(conn.clone());
        }

        info!("Connecting to firewalld...");
        let conn = Connection::system().context("Failed to connect to system D-Bus")?;
        *cached = Some(conn.clone());
        info!("Connected to firewalld");
        Ok(conn)
    }

    /// Get the default zone name.
    fn default_zone(&self, conn: &Connection) -> Result<String> {
        let zone: String = conn
            .call_method(
                Some(BUS_NAME),
                paths::ROOT,
                Some(interfaces::MAIN),
                "getDefaultZone",
                &(),
            )?
            .body()
            .deserialize()?;

        Ok(zone)
    }

    /// Get the D-Bus path for a zone's permanent config.
    fn zone_config_path(&self, conn: &Connection, zone_name: &str) -> Result<String> {
        let path: OwnedObjectPath = conn
            .call_method(
                Some(BUS_NAME),
                paths::CONFIG,
                Some(interfaces::CONFIG),
                "getZoneByName",
                &(zone_name,),
            )?
            .body()
            .deserialize()?;

        Ok(path.to_string())
    }

    /// Add a rich rule to the runtime zone and, if configured, the
    /// permanent zone.
    fn add_rich_rule(&self, conn: &Connection, rule: &str) -> Result<()> {
        let result = conn.call_method(
            Some(BUS_NAME),
            paths::ROOT,
            Some(interfaces::ZONE),
            "addRichRule",
            &(self.zone.as_str(), rule, 0i32),
        );

        match result {
            Ok(_) => info!("Added rich rule to zone {:?}: {}", self.zone, rule),
            Err(e) if e.to_string().contains("ALREADY_ENABLED") => {}
            Err(e) => return Err(e).context("firewalld rejected rich rule"),
        }

        if self.permanent {
            let zone = if self.zone.is_empty() {
                self.default_zone(conn)?
            } else {
                self.zone.clone()
            };
            let config_path = self.zone_config_path(conn, &zone)?;
            let result = conn.call_method(
                Some(BUS_NAME),
                ObjectPath::try_from(config_path.as_str())?,
                Some(interfaces::CONFIG_ZONE),
                "addRichRule",
                &(rule,),
            );
            match result {
                Ok(_) => {}
                Err(e) if e.to_string().contains("ALREADY_ENABLED") => {}
                Err(e) => return Err(e).context("Failed to persist rich rule"),
            }
        }

        Ok(())
    }
}

impl BlockSink for FirewalldSink {
    fn add_block(&self, directive: &BlockDirective) -> Result<()> {
        let rule = reject_rule(&directive.ip);
        let conn = self.connection()?;
        self.add_rich_rule(&conn, &rule)?;
        info!("Firewalld block for {}: {}", directive.ip, directive.comment);
        Ok(())
    }
}

/// Build a rich rule rejecting all traffic from `ip`.
/// Example: `rule family="ipv4" source address="1.2.3.4" reject`
fn reject_rule(ip: &str) -> String {
    let family = match ip.parse::<IpAddr>() {
        Ok(IpAddr::V6(_)) => "ipv6",
        Ok(IpAddr::V4(_)) => "ipv4",
        Err(_) if ip.contains(':') => "ipv6",
        Err(_) => "ipv4",
    };
    format!("rule family=\"{}\" source address=\"{}\" reject", family, ip)
}
