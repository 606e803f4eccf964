// Conn Monitor - Registry Module
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! Source of truth for currently active connections.

mod memory;
pub mod models;

use anyhow::Result;

pub use memory::{ConnectionHandle, MemoryRegistry};
pub use models::{Connection, RequestDetails};

/// Read-only access to the set of active connections.
pub trait ConnectionRegistry: Send + Sync {
    /// Snapshot of all active connections in the registry's natural order.
    ///
    /// Must not block indefinitely. May be empty.
    fn list_connections(&self) -> Result<Vec<Connection>>;
}
