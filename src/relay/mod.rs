// Conn Monitor - TCP Relay
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! TCP relay placed in front of the monitored server.
//!
//! Every accepted connection is registered in the [`MemoryRegistry`] for
//! as long as it lives, with live byte counters:
//!
//! ```text
//! client ──received──▶ relay ──▶ upstream
//! client ◀───sent───── relay ◀── upstream
//! ```
//!
//! Peers on the [`DenyList`] are refused at accept time, and open
//! connections from a peer are closed as soon as it gets blocked.

mod sniff;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::firewall::DenyList;
use crate::registry::{ConnectionHandle, MemoryRegistry};
use sniff::HeadSniffer;

const BUF_SIZE: usize = 16 * 1024;
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

pub struct Relay {
    upstream: SocketAddr,
    registry: Arc<MemoryRegistry>,
    deny_list: Arc<DenyList>,
}

impl Relay {
    pub fn new(
        upstream: SocketAddr,
        registry: Arc<MemoryRegistry>,
        deny_list: Arc<DenyList>,
    ) -> Self {
        Self {
            upstream,
            registry,
            deny_list,
        }
    }

    /// Accept and relay connections until the task is cancelled.
    pub async fn run(self, listener: TcpListener) -> Result<()> {
        info!(
            "Relay listening on {} -> {}",
            listener.local_addr()?,
            self.upstream
        );

        loop {
            let (client, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("Relay accept failed: {}", e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            };

            if let Some(block) = self.deny_list.find(peer.ip()) {
                info!(
                    "Refused connection from blocked IP {} ({}, since {})",
                    peer.ip(),
                    block.comment,
                    block.blocked_at.format("%Y-%m-%d %H:%M:%S")
                );
                drop(client);
                continue;
            }

            let handle = self.registry.register(peer.ip());
            let upstream = self.upstream;
            let deny_list = Arc::clone(&self.deny_list);
            tokio::spawn(async move {
                let id = handle.id();
                tokio::select! {
                    result = relay_connection(client, upstream, &handle) => {
                        if let Err(e) = result {
                            debug!("Connection {} from {} ended: {:#}", id, peer, e);
                        }
                    }
                    block = deny_list.blocked(peer.ip()) => {
                        info!(
                            "Closed connection {} from blocked IP {} ({})",
                            id,
                            peer.ip(),
                            block.comment
                        );
                    }
                }
            });
        }
    }
}

async fn relay_connection(
    client: TcpStream,
    upstream: SocketAddr,
    handle: &ConnectionHandle,
) -> Result<()> {
    let server = TcpStream::connect(upstream)
        .await
        .with_context(|| format!("Failed to connect to upstream {}", upstream))?;

    let (mut client_read, mut client_write) = client.into_split();
    let (mut server_read, mut server_write) = server.into_split();
    let mut sniffer = HeadSniffer::new();

    let upload = pump(&mut client_read, &mut server_write, |chunk| {
        handle.add_received(chunk.len() as u64);
        if let Some(details) = sniffer.feed(chunk) {
            handle.record_request(details);
        }
    });
    let download = pump(&mut server_read, &mut client_write, |chunk| {
        handle.add_sent(chunk.len() as u64);
    });

    tokio::try_join!(upload, download)?;
    Ok(())
}

/// Copy `reader` into `writer` until EOF, reporting each forwarded chunk.
async fn pump<R, W, F>(reader: &mut R, writer: &mut W, mut on_chunk: F) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    F: FnMut(&[u8]),
{
    let mut buf = vec![0u8; BUF_SIZE];
    loop {
        let n = reader.read(&mut buf).await.context("Relay read failed")?;
        if n == 0 {
            // Propagate the half-close so the other side sees EOF.
            let _ = writer.shutdown().await;
            return Ok(());
        }
        writer
            .write_all(&buf[..n])
            .await
            .context("Relay write failed")?;
        on_chunk(&buf[..n]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    use crate::firewall::{BlockDirective, BlockSink};
    use crate::registry::ConnectionRegistry;

    const RESPONSE: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello";

    /// Upstream that answers one request per connection.
    async fn spawn_upstream() -> SocketAddr {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 4096];
                    let mut seen = Vec::new();
                    while sniff::head_end(&seen).is_none() {
                        let n = stream.read(&mut buf).await.unwrap();
                        if n == 0 {
                            return;
                        }
                        seen.extend_from_slice(&buf[..n]);
                    }
                    stream.write_all(RESPONSE).await.unwrap();
                    // Hold the connection until the client goes away.
                    let _ = stream.read(&mut buf).await;
                });
            }
        });
        addr
    }

    async fn spawn_relay(
        upstream: SocketAddr,
    ) -> (SocketAddr, Arc<MemoryRegistry>, Arc<DenyList>) {
        let registry = Arc::new(MemoryRegistry::new());
        let deny_list = Arc::new(DenyList::new());
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let relay = Relay::new(upstream, registry.clone(), deny_list.clone());
        tokio::spawn(relay.run(listener));
        (addr, registry, deny_list)
    }

    async fn wait_until<F: Fn() -> bool>(cond: F) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn test_relay_tracks_connection() {
        let upstream = spawn_upstream().await;
        let (relay_addr, registry, _) = spawn_relay(upstream).await;

        let request = b"GET /files/report.pdf HTTP/1.1\r\nHost: x\r\nUser-Agent: test-agent\r\n\r\n";
        let mut client = TcpStream::connect(relay_addr).await.unwrap();
        client.write_all(request).await.unwrap();

        let mut response = vec![0u8; RESPONSE.len()];
        client.read_exact(&mut response).await.unwrap();
        assert_eq!(response, RESPONSE);

        wait_until(|| {
            registry
                .list_connections()
                .unwrap()
                .first()
                .is_some_and(|c| {
                    c.bytes_sent == RESPONSE.len() as u64
                        && c.bytes_received == request.len() as u64
                })
        })
        .await;

        let conn = registry.list_connections().unwrap().remove(0);
        assert_eq!(conn.ip, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(conn.bytes_received, request.len() as u64);
        assert_eq!(conn.request_target.as_deref(), Some("/files/report.pdf"));
        assert_eq!(conn.user_agent.as_deref(), Some("test-agent"));
        assert!(conn.started.is_some());

        drop(client);
        wait_until(|| registry.is_empty()).await;
    }

    #[tokio::test]
    async fn test_relay_refuses_blocked_peer() {
        let upstream = spawn_upstream().await;
        let (relay_addr, registry, deny_list) = spawn_relay(upstream).await;
        deny_list
            .add_block(&BlockDirective::new("127.0.0.1", "test"))
            .unwrap();

        let mut client = TcpStream::connect(relay_addr).await.unwrap();
        let _ = client.write_all(b"GET / HTTP/1.1\r\n\r\n").await;
        let mut buf = [0u8; 16];
        let n = client.read(&mut buf).await.unwrap_or(0);
        assert_eq!(n, 0);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_blocking_open_peer_closes_its_connection() {
        let upstream = spawn_upstream().await;
        let (relay_addr, registry, deny_list) = spawn_relay(upstream).await;

        let mut client = TcpStream::connect(relay_addr).await.unwrap();
        client.write_all(b"GET /big.iso HTTP/1.1\r\n\r\n").await.unwrap();
        let mut response = vec![0u8; RESPONSE.len()];
        client.read_exact(&mut response).await.unwrap();
        assert_eq!(registry.len(), 1);

        deny_list
            .add_block(&BlockDirective::new("127.0.0.1", "abuse"))
            .unwrap();

        let mut buf = [0u8; 16];
        let n = tokio::time::timeout(Duration::from_secs(2), client.read(&mut buf))
            .await
            .expect("relay kept the blocked connection open")
            .unwrap_or(0);
        assert_eq!(n, 0);
        wait_until(|| registry.is_empty()).await;

        // Nothing more reaches the upstream either.
        let _ = client.write_all(b"pong").await;
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_upstream_releases_connection() {
        // Bind then drop to get a port nobody listens on.
        let unused = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let upstream = unused.local_addr().unwrap();
        drop(unused);

        let (relay_addr, registry, _) = spawn_relay(upstream).await;
        let mut client = TcpStream::connect(relay_addr).await.unwrap();
        let mut buf = [0u8; 16];
        let n = client.read(&mut buf).await.unwrap_or(0);
        assert_eq!(n, 0);
        wait_until(|| registry.is_empty()).await;
    }
}
