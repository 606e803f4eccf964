// Conn Monitor - Control API
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! Localhost-only HTTP control surface.
//!
//! | Endpoint                | Method | Response                    |
//! |-------------------------|--------|-----------------------------|
//! | `/current-connections`  | GET    | array of connection summaries |
//! | `/current-traffic`      | GET    | `{ "in": MB/s, "out": MB/s }` |
//! | `/block-connection`     | POST   | `{ "success": true }`         |
//!
//! The [`guard`] middleware runs before every handler.

mod error;
pub mod guard;
mod handlers;
mod summary;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub use guard::AccessGuard;

use crate::firewall::BlockSink;
use crate::registry::ConnectionRegistry;
use crate::stats::TrafficState;

/// Everything the handlers read.
pub struct AppState {
    pub registry: Arc<dyn ConnectionRegistry>,
    pub traffic: Arc<TrafficState>,
    pub sink: Arc<dyn BlockSink>,
    /// Comment attached to every block directive.
    pub block_comment: String,
}

/// Build the control router.
pub fn router(state: Arc<AppState>, guard: AccessGuard) -> Router {
    Router::new()
        .route("/current-connections", get(handlers::current_connections))
        .route("/current-traffic", get(handlers::current_traffic))
        .route("/block-connection", post(handlers::block_connection))
        .with_state(state)
        .layer(CatchPanicLayer::custom(error::panic_response))
        .layer(axum::middleware::from_fn_with_state(
            Arc::new(guard),
            guard::require_allowed_caller,
        ))
        .layer(TraceLayer::new_for_http())
}

/// Serve `router` on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, router: Router, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!("Control API listening on {}", listener.local_addr()?);
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;
    Ok(())
}
