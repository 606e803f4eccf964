// Conn Monitor - Statistics Models
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! Data structures for traffic statistics.

use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bytes per megabyte used for rate reporting.
pub const BYTES_PER_MB: f64 = 1_048_576.0;

/// Aggregate byte totals at one moment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrafficSample {
    pub total_in: u64,
    pub total_out: u64,
    pub timestamp: DateTime<Utc>,
}

impl TrafficSample {
    /// Create a sample with zero totals at `timestamp`.
    pub fn empty(timestamp: DateTime<Utc>) -> Self {
        Self {
            total_in: 0,
            total_out: 0,
            timestamp,
        }
    }
}

/// Aggregate throughput in megabytes per second.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CurrentRate {
    #[serde(rename = "in")]
    pub rate_in: f64,
    #[serde(rename = "out")]
    pub rate_out: f64,
}

/// Process-wide traffic state shared between the sampler and the API.
///
/// Only the sampler writes the rate. The pair is replaced whole so readers
/// never observe a half-updated value.
#[derive(Debug, Default)]
pub struct TrafficState {
    rate: RwLock<CurrentRate>,
}

impl TrafficState {
    /// Create state with a zero rate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the current rate.
    pub fn current(&self) -> CurrentRate {
        self.rate.read().map(|r| *r).unwrap_or_default()
    }

    pub(super) fn publish(&self, rate: CurrentRate) {
        if let Ok(mut current) = self.rate.write() {
            *current = rate;
        }
    }
}
