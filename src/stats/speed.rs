// Conn Monitor - Speed Estimator
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! Per-connection average throughput.

use chrono::{DateTime, Utc};

use crate::registry::Connection;

/// Bytes per second moved on `conn` since it started.
///
/// Returns 0 when the connection has no byte counters or when no time has
/// elapsed (including a start time in the future).
pub fn connection_speed(conn: &Connection, now: DateTime<Utc>) -> f64 {
    if !conn.byte_counters_available {
        return 0.0;
    }

    let start = conn.start_time().unwrap_or(now);
    let elapsed = (now - start).num_milliseconds() as f64 / 1000.0;
    if elapsed > 0.0 {
        conn.total_bytes() as f64 / elapsed
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::net::{IpAddr, Ipv4Addr};

    fn conn_started(started: DateTime<Utc>, sent: u64, received: u64) -> Connection {
        let mut conn = Connection::new(1, IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20)));
        conn.started = Some(started);
        conn.bytes_sent = sent;
        conn.bytes_received = received;
        conn
    }

    #[test]
    fn test_speed_over_elapsed_time() {
        let now = Utc::now();
        let conn = conn_started(now - Duration::seconds(4), 3000, 1000);
        assert_eq!(connection_speed(&conn, now), 1000.0);
    }

    #[test]
    fn test_zero_bytes_is_zero() {
        let now = Utc::now();
        let conn = conn_started(now - Duration::hours(2), 0, 0);
        assert_eq!(connection_speed(&conn, now), 0.0);
    }

    #[test]
    fn test_future_start_is_zero() {
        let now = Utc::now();
        let conn = conn_started(now + Duration::seconds(30), 5000, 5000);
        assert_eq!(connection_speed(&conn, now), 0.0);
    }

    #[test]
    fn test_falls_back_to_accept_time() {
        let now = Utc::now();
        let mut conn = Connection::new(2, IpAddr::V4(Ipv4Addr::LOCALHOST));
        conn.timestamp = Some(now - Duration::seconds(2));
        conn.bytes_sent = 400;
        assert_eq!(connection_speed(&conn, now), 200.0);
    }

    #[test]
    fn test_unknown_start_or_no_counters_is_zero() {
        let now = Utc::now();
        let mut conn = Connection::new(3, IpAddr::V4(Ipv4Addr::LOCALHOST));
        conn.bytes_sent = 400;
        assert_eq!(connection_speed(&conn, now), 0.0);

        let mut conn = conn_started(now - Duration::seconds(10), 100, 100);
        conn.byte_counters_available = false;
        assert_eq!(connection_speed(&conn, now), 0.0);
    }
}
