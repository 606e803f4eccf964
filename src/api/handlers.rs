// Conn Monitor - API Handlers
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

use std::sync::Arc;

use anyhow::Context;
use axum::body::to_bytes;
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap};
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};
use tracing::info;

use super::error::ApiError;
use super::summary::ConnectionSummary;
use super::AppState;
use crate::firewall::BlockDirective;
use crate::stats::CurrentRate;

pub(super) async fn current_connections(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ConnectionSummary>>, ApiError> {
    let conns = state
        .registry
        .list_connections()
        .context("Failed to read connection registry")?;
    let now = Utc::now();
    let summaries = conns
        .iter()
        .map(|conn| ConnectionSummary::from_connection(conn, now))
        .collect();
    Ok(Json(summaries))
}

pub(super) async fn current_traffic(State(state): State<Arc<AppState>>) -> Json<CurrentRate> {
    Json(state.traffic.current())
}

/// Largest block request body that is read.
const MAX_BODY_LEN: usize = 2 * 1024 * 1024;

pub(super) async fn block_connection(
    State(state): State<Arc<AppState>>,
    req: Request,
) -> Result<Json<Value>, ApiError> {
    // Other content types are never read.
    let payload = if is_json(req.headers()) {
        let body = to_bytes(req.into_body(), MAX_BODY_LEN)
            .await
            .context("Failed to read request body")?;
        serde_json::from_slice::<Value>(&body).context("Malformed JSON body")?
    } else {
        Value::Null
    };

    let Some(ip) = truthy_text(payload.get("ip")) else {
        info!("Block request: Missing IP");
        return Err(ApiError::Validation {
            message: "IP required",
        });
    };
    let reason = truthy_text(payload.get("reason"));

    if !is_ip_literal(&ip) {
        info!("Invalid IP format: {}", ip);
        return Err(ApiError::Validation {
            message: "Invalid IP format",
        });
    }

    // The caller's reason is only logged; the sink always gets the
    // configured comment.
    let directive = BlockDirective::new(ip.clone(), state.block_comment.clone());
    let sink = Arc::clone(&state.sink);
    tokio::task::spawn_blocking(move || sink.add_block(&directive))
        .await
        .context("Block sink task failed")?
        .with_context(|| format!("Failed to block {}", ip))?;

    info!(
        "Blocked IP: {}, reason: {}",
        ip,
        reason.as_deref().unwrap_or("No reason provided")
    );
    Ok(Json(json!({ "success": true })))
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("application/json"))
}

/// Text of a JSON field, or `None` if it is absent or falsy
/// (`null`, `false`, `0`, `""`).
fn truthy_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Dotted quad of 1-3 digit groups, or eight groups of 1-4 hex digits.
///
/// Octets are not range-checked and `::` shorthand is not accepted.
pub(crate) fn is_ip_literal(ip: &str) -> bool {
    let groups_match = |sep: char, count: usize, max_len: usize, is_digit: fn(&u8) -> bool| {
        let groups: Vec<&str> = ip.split(sep).collect();
        groups.len() == count
            && groups.iter().all(|g| {
                !g.is_empty() && g.len() <= max_len && g.as_bytes().iter().all(is_digit)
            })
    };

    groups_match('.', 4, 3, u8::is_ascii_digit) || groups_match(':', 8, 4, u8::is_ascii_hexdigit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ipv4_literals() {
        assert!(is_ip_literal("1.2.3.4"));
        assert!(is_ip_literal("192.168.100.254"));
        assert!(is_ip_literal("999.999.999.999"));
        assert!(!is_ip_literal("1.2.3"));
        assert!(!is_ip_literal("1.2.3.4.5"));
        assert!(!is_ip_literal("1.2.3.4444"));
        assert!(!is_ip_literal("1.2..4"));
        assert!(!is_ip_literal("a.b.c.d"));
        assert!(!is_ip_literal(" 1.2.3.4"));
    }

    #[test]
    fn test_ipv6_literals() {
        assert!(is_ip_literal("2001:0db8:85a3:0000:0000:8a2e:0370:7334"));
        assert!(is_ip_literal("fe80:0:0:0:0:0:0:1"));
        assert!(is_ip_literal("FFFF:ffff:0:0:0:0:0:1"));
        assert!(!is_ip_literal("::1"));
        assert!(!is_ip_literal("2001:db8::1"));
        assert!(!is_ip_literal("2001:0db8:85a3:0000:0000:8a2e:0370:7334:1"));
        assert!(!is_ip_literal("2001:0db8:85a3:0000:0000:8a2e:0370:7g34"));
        assert!(!is_ip_literal("12345:0:0:0:0:0:0:1"));
    }

    #[test]
    fn test_truthy_text() {
        assert_eq!(truthy_text(None), None);
        assert_eq!(truthy_text(Some(&Value::Null)), None);
        assert_eq!(truthy_text(Some(&json!(""))), None);
        assert_eq!(truthy_text(Some(&json!(false))), None);
        assert_eq!(truthy_text(Some(&json!(0))), None);
        assert_eq!(truthy_text(Some(&json!("1.2.3.4"))).as_deref(), Some("1.2.3.4"));
        assert_eq!(truthy_text(Some(&json!(1234))).as_deref(), Some("1234"));
    }
}
