// Conn Monitor - Traffic Sampler
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! Periodic sampling of registry byte counters into an aggregate rate.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::models::{CurrentRate, TrafficSample, TrafficState, BYTES_PER_MB};
use crate::registry::{Connection, ConnectionRegistry};

/// Computes aggregate throughput from successive registry snapshots.
///
/// Holds the single previous sample; no history is kept.
pub struct TrafficSampler {
    registry: Arc<dyn ConnectionRegistry>,
    state: Arc<TrafficState>,
    previous: TrafficSample,
}

impl TrafficSampler {
    /// Create a sampler whose first interval starts now.
    pub fn new(registry: Arc<dyn ConnectionRegistry>, state: Arc<TrafficState>) -> Self {
        Self {
            registry,
            state,
            previous: TrafficSample::empty(Utc::now()),
        }
    }

    /// Run one sampling tick against the wall clock.
    pub fn sample(&mut self) -> Result<Option<CurrentRate>> {
        self.sample_at(Utc::now())
    }

    /// Run one sampling tick as if the current time were `now`.
    ///
    /// Returns the published rate, or `None` when no time has elapsed
    /// since the previous tick. In that case the stored totals and the
    /// published rate are left untouched.
    pub fn sample_at(&mut self, now: DateTime<Utc>) -> Result<Option<CurrentRate>> {
        let conns = self
            .registry
            .list_connections()
            .context("Failed to read connection registry")?;
        let (total_in, total_out) = sum_counters(&conns);

        let time_diff = (now - self.previous.timestamp).num_milliseconds() as f64 / 1000.0;
        self.previous.timestamp = now;
        if time_diff <= 0.0 {
            return Ok(None);
        }

        let diff_in = total_in.saturating_sub(self.previous.total_in);
        let diff_out = total_out.saturating_sub(self.previous.total_out);
        self.previous.total_in = total_in;
        self.previous.total_out = total_out;

        let rate = CurrentRate {
            rate_in: diff_in as f64 / BYTES_PER_MB / time_diff,
            rate_out: diff_out as f64 / BYTES_PER_MB / time_diff,
        };
        self.state.publish(rate);
        Ok(Some(rate))
    }

    /// Spawn the sampler on the tokio runtime, ticking every `period`.
    ///
    /// The first tick happens one full period after the call.
    pub fn start(mut self, period: Duration) -> SamplerHandle {
        info!("Starting traffic sampler every {:?}", period);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // interval() completes its first tick immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let started = Instant::now();
                match self.sample() {
                    Ok(Some(rate)) => debug!(
                        "Traffic: In={:.2} MB/s, Out={:.2} MB/s ({}ms)",
                        rate.rate_in,
                        rate.rate_out,
                        started.elapsed().as_millis()
                    ),
                    Ok(None) => debug!("Traffic sample skipped: no time elapsed"),
                    Err(e) => warn!("Traffic calculation error: {:#}", e),
                }
            }
        });

        SamplerHandle { task: Some(task) }
    }
}

fn sum_counters(conns: &[Connection]) -> (u64, u64) {
    conns
        .iter()
        .filter(|c| c.byte_counters_available)
        .fold((0u64, 0u64), |(total_in, total_out), c| {
            (
                total_in.saturating_add(c.bytes_received),
                total_out.saturating_add(c.bytes_sent),
            )
        })
}

/// Owner of a running sampler task.
///
/// Dropping the handle stops the sampler.
#[derive(Debug)]
pub struct SamplerHandle {
    task: Option<JoinHandle<()>>,
}

impl SamplerHandle {
    /// Cancel the sampler's timer. Safe to call any number of times.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            info!("Traffic sampler stopped");
        }
    }
}

#[cfg(test)]
impl SamplerHandle {
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for SamplerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
