// Conn Monitor - Statistics Module
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! Traffic statistics collection and aggregation.

pub mod models;
mod sampler;
mod speed;

pub use models::{CurrentRate, TrafficState};
pub use sampler::TrafficSampler;
pub use speed::connection_speed;
