// Conn Monitor - Access Guard
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! Restricts the monitoring endpoints to allow-listed (loopback) callers.

use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::{info, warn};

use super::error::ApiError;

/// Paths the guard protects. Everything else passes through.
pub const PROTECTED_PATHS: [&str; 3] = [
    "/current-connections",
    "/current-traffic",
    "/block-connection",
];

#[derive(Debug, Clone)]
pub struct AccessGuard {
    allowed: HashSet<String>,
}

impl AccessGuard {
    /// Create a guard admitting callers whose address text is in `allowed`.
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: allowed.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_protected(path: &str) -> bool {
        PROTECTED_PATHS.contains(&path)
    }

    /// Decide whether a caller at `ip` may reach `path`.
    ///
    /// The comparison is on the textual form, so `::ffff:127.0.0.1` is
    /// admitted only if listed as such.
    pub fn authorize(&self, path: &str, ip: IpAddr) -> Result<(), ApiError> {
        if !Self::is_protected(path) {
            return Ok(());
        }
        if self.allowed.contains(&ip.to_string()) {
            return Ok(());
        }
        warn!("Blocked external plugin access from IP: {} to {}", ip, path);
        Err(ApiError::AccessDenied)
    }
}

/// Middleware running [`AccessGuard::authorize`] before any handler.
pub async fn require_allowed_caller(
    State(guard): State<Arc<AccessGuard>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path().to_owned();
    if let Err(denied) = guard.authorize(&path, peer.ip()) {
        return denied.into_response();
    }
    if AccessGuard::is_protected(&path) {
        info!("Plugin request: {} {} from {}", req.method(), path, peer.ip());
    }
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    fn guard() -> AccessGuard {
        AccessGuard::new(["127.0.0.1", "::1", "::ffff:127.0.0.1"])
    }

    #[test]
    fn test_remote_caller_denied_on_protected_paths() {
        let remote = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5));
        for path in PROTECTED_PATHS {
            assert!(matches!(
                guard().authorize(path, remote),
                Err(ApiError::AccessDenied)
            ));
        }
    }

    #[test]
    fn test_loopback_forms_allowed() {
        let g = guard();
        assert!(g.authorize("/current-connections", IpAddr::V4(Ipv4Addr::LOCALHOST)).is_ok());
        assert!(g.authorize("/current-traffic", IpAddr::V6(Ipv6Addr::LOCALHOST)).is_ok());
        let mapped = IpAddr::V6(Ipv4Addr::LOCALHOST.to_ipv6_mapped());
        assert!(g.authorize("/block-connection", mapped).is_ok());
    }

    #[test]
    fn test_other_loopback_addresses_are_not_listed() {
        let g = guard();
        assert!(g
            .authorize("/current-traffic", IpAddr::V4(Ipv4Addr::new(127, 0, 0, 2)))
            .is_err());
    }

    #[test]
    fn test_unprotected_paths_pass_through() {
        let remote = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5));
        assert!(guard().authorize("/foo", remote).is_ok());
        assert!(guard().authorize("/current-traffic/extra", remote).is_ok());
    }
}
