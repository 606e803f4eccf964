// Conn Monitor - Main Entry Point
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! Conn Monitor - a connection-monitoring sidecar.
//!
//! Tracks active connections through a relay, samples aggregate throughput
//! and exposes a localhost-only control API to inspect and block peers.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, EnvFilter};

mod api;
mod client;
mod config;
mod firewall;
mod registry;
mod relay;
mod stats;

use api::{AccessGuard, AppState};
use client::MonitorClient;
use config::{AppSettings, Settings};
use firewall::{BlockSink, DenyList, FanoutSink, FirewalldSink};
use registry::MemoryRegistry;
use relay::Relay;
use stats::{TrafficSampler, TrafficState};

#[derive(Debug, Parser)]
#[command(name = "conn-monitor", version, about)]
struct Cli {
    /// Settings file (defaults to the user config directory).
    #[arg(long, short, env = "CONN_MONITOR_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the sidecar (default).
    Serve,
    /// Print the current aggregate throughput of a running sidecar.
    Traffic {
        #[arg(long)]
        url: Option<String>,
    },
    /// List the active connections of a running sidecar.
    Connections {
        #[arg(long)]
        url: Option<String>,
    },
    /// Block a remote address through a running sidecar.
    Block {
        ip: String,
        #[arg(long, short)]
        reason: Option<String>,
        #[arg(long)]
        url: Option<String>,
    },
    /// Write the effective settings to the settings file.
    InitConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Start at `warn` so problems loading the settings are visible, then
    // switch to the configured verbosity.
    let (filter, filter_handle) = reload::Layer::new(EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();

    let settings = Settings::load(cli.config.as_deref());
    filter_handle
        .reload(log_filter(settings.get().log_enabled))
        .context("Failed to apply log filter")?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(settings.into_inner()).await,
        Command::Traffic { url } => {
            let client = MonitorClient::new(base_url(url, settings.get()))?;
            let rate = client.traffic().await?;
            println!("In:  {:.2} MB/s\nOut: {:.2} MB/s", rate.rate_in, rate.rate_out);
            Ok(())
        }
        Command::Connections { url } => {
            let client = MonitorClient::new(base_url(url, settings.get()))?;
            for conn in client.connections().await? {
                println!("{}", client::format_connection(&conn));
            }
            Ok(())
        }
        Command::Block { ip, reason, url } => {
            let client = MonitorClient::new(base_url(url, settings.get()))?;
            client.block(&ip, reason.as_deref()).await?;
            println!("Blocked {}", ip);
            Ok(())
        }
        Command::InitConfig => {
            settings.save()?;
            println!("Wrote {}", settings.path().display());
            Ok(())
        }
    }
}

/// `RUST_LOG` wins; otherwise `info` when logging is enabled, `warn` when not.
fn log_filter(log_enabled: bool) -> EnvFilter {
    let default = if log_enabled { "info" } else { "warn" };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

fn base_url(url: Option<String>, settings: &AppSettings) -> String {
    url.unwrap_or_else(|| format!("http://{}", settings.api_listen))
}

async fn serve(settings: AppSettings) -> Result<()> {
    let registry = Arc::new(MemoryRegistry::new());
    let traffic = Arc::new(TrafficState::new());
    let deny_list = Arc::new(DenyList::new());

    let sink: Arc<dyn BlockSink> = match &settings.firewalld {
        Some(fw) => Arc::new(FanoutSink::new(vec![
            deny_list.clone(),
            Arc::new(FirewalldSink::new(fw.zone.clone(), fw.permanent)),
        ])),
        None => deny_list.clone(),
    };

    // Dropping the handle on any early return stops the sampler.
    let mut sampler = TrafficSampler::new(registry.clone(), traffic.clone())
        .start(settings.sample_interval());

    let relay_task = match &settings.relay {
        Some(relay) => {
            let listener = TcpListener::bind(relay.listen)
                .await
                .with_context(|| format!("Failed to bind relay on {}", relay.listen))?;
            let relay = Relay::new(relay.upstream, registry.clone(), deny_list.clone());
            Some(tokio::spawn(relay.run(listener)))
        }
        None => {
            info!("Relay disabled; no connections will be tracked");
            None
        }
    };

    let state = Arc::new(AppState {
        registry,
        traffic,
        sink,
        block_comment: settings.block_comment.clone(),
    });
    let router = api::router(state, AccessGuard::new(settings.allowed_ips.clone()));
    let listener = TcpListener::bind(settings.api_listen)
        .await
        .with_context(|| format!("Failed to bind control API on {}", settings.api_listen))?;

    info!("Plugin initialized. Endpoints restricted to localhost.");
    let result = api::serve(listener, router, shutdown_signal()).await;

    sampler.stop();
    if let Some(task) = relay_task {
        task.abort();
    }
    info!("Conn Monitor stopped");
    result
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown requested");
}
