//! Startup dials.
//!
//! Without discovery, a node only learns about peers that dial it. The
//! addresses given on the command line or under `network.dial` are dialed
//! once at startup: the handshake teaches us the remote's id, we send it
//! the greeting, and it joins the registry so the broadcast loops include
//! it from then on.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::AsyncWriteExt;

use murmur_core::{CipherContext, PeerId};
use murmur_services::PeerRegistry;

use crate::tcp::TcpTransport;

pub async fn dial_addresses(
    transport: Arc<TcpTransport>,
    registry: PeerRegistry,
    cipher: Arc<CipherContext>,
    greeting: String,
    addrs: Vec<String>,
) {
    for addr in addrs {
        match dial_one(&transport, &registry, &cipher, &greeting, &addr).await {
            Ok(peer) => tracing::info!(%addr, %peer, "dialed peer"),
            Err(e) => tracing::warn!(%addr, error = %e, "dial failed"),
        }
    }
}

async fn dial_one(
    transport: &TcpTransport,
    registry: &PeerRegistry,
    cipher: &CipherContext,
    greeting: &str,
    addr: &str,
) -> Result<PeerId> {
    let resolved = tokio::net::lookup_host(addr)
        .await
        .with_context(|| format!("cannot resolve {addr}"))?
        .next()
        .with_context(|| format!("{addr} resolved to nothing"))?;

    let (peer, mut stream) = transport.introduce(resolved).await?;
    stream.write_all(cipher.encrypt(greeting).as_bytes()).await?;
    stream.shutdown().await?;

    registry.upsert(&peer);
    Ok(peer)
}
