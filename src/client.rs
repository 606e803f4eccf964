// Conn Monitor - Control API Client
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! HTTP client for querying a running sidecar.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::stats::CurrentRate;

/// Error body returned by the control API.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

pub struct MonitorClient {
    base_url: String,
    http: reqwest::Client,
}

impl MonitorClient {
    /// Create a client for the sidecar at `base_url` (e.g. `http://127.0.0.1:9870`).
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(format!("conn-monitor/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Current aggregate throughput.
    pub async fn traffic(&self) -> Result<CurrentRate> {
        let response = self.http.get(self.url("/current-traffic")).send().await?;
        Self::parse(response).await
    }

    /// Summaries of all active connections, as raw JSON objects.
    pub async fn connections(&self) -> Result<Vec<Value>> {
        let response = self.http.get(self.url("/current-connections")).send().await?;
        Self::parse(response).await
    }

    /// Ask the sidecar to block `ip`.
    pub async fn block(&self, ip: &str, reason: Option<&str>) -> Result<()> {
        let mut body = json!({ "ip": ip });
        if let Some(reason) = reason {
            body["reason"] = json!(reason);
        }
        let response = self
            .http
            .post(self.url("/block-connection"))
            .json(&body)
            .send()
            .await?;
        let _: Value = Self::parse(response).await?;
        Ok(())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn parse<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        debug!("{} {}", status, response.url());

        if !status.is_success() {
            let message = match response.json::<ErrorBody>().await {
                Ok(body) => body.error,
                Err(_) => status.to_string(),
            };
            return Err(anyhow!("Sidecar returned {}: {}", status, message));
        }

        response
            .json()
            .await
            .context("Failed to parse sidecar response")
    }
}

/// Format a summary row for terminal output.
pub fn format_connection(conn: &Value) -> String {
    let field = |name: &str| match &conn[name] {
        Value::String(s) => s.clone(),
        Value::Null => "-".to_string(),
        other => other.to_string(),
    };
    let speed = conn["speed"].as_f64().unwrap_or(0.0);

    format!(
        "#{:<6} {:<40} {:<12} {:>12} {:>12} {:>10.1} KB/s  {}",
        field("id"),
        field("ip"),
        field("user"),
        field("sent"),
        field("received"),
        speed / 1024.0,
        field("file"),
    )
}
