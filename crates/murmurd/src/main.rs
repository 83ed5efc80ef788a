//! murmurd: Murmur peer-to-peer broadcast daemon.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;

use murmur_core::config::MurmurConfig;
use murmur_core::{CipherContext, CipherMode, PeerId};
use murmur_services::{
    Broadcaster, Heartbeat, Inbox, OutboundQueue, PeerRegistry, QueueDrain, SessionContext,
    Transport,
};

mod dial;
mod session;
mod tcp;

use tcp::TcpTransport;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = MurmurConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let mut config = MurmurConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        MurmurConfig::default()
    });

    // Extra addresses to dial, one per argument
    config.network.dial.extend(std::env::args().skip(1));

    // Cipher
    let cipher = Arc::new(
        CipherContext::from_config(&config.cipher).context("invalid cipher configuration")?,
    );
    if cipher.mode() == CipherMode::StaticIv {
        tracing::warn!("static key/iv reused for every message; set cipher.mode = \"fresh_iv\" for a per-message iv");
    }
    if config.cipher.key_hex.is_none() {
        tracing::warn!("no cipher.key_hex configured, using a random key; other nodes cannot decrypt our messages");
    }

    // Identity + transport
    let local_peer_id = PeerId::random();
    let (transport, listener) =
        TcpTransport::bind(&config.network.listen_addr, local_peer_id.clone(), &config.network.protocol)
            .await?;
    tracing::info!(
        peer_id = %local_peer_id,
        listen_addr = %transport.listen_addr(),
        protocol = %config.network.protocol,
        "murmurd starting"
    );

    // Shared state
    let registry = PeerRegistry::new();
    let queue = OutboundQueue::new();
    let inbox = Inbox::new(config.session.inbox_capacity);
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

    let broadcaster = Broadcaster::new(
        transport.clone() as Arc<dyn Transport>,
        registry.clone(),
        cipher.clone(),
        config.network.protocol.clone(),
        config.broadcast.send_timeout(),
    );

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    // ── Spawn tasks ──────────────────────────────────────────────────────────

    let accept_task = tokio::spawn(transport.clone().accept_loop(
        listener,
        inbound_tx,
        shutdown_tx.subscribe(),
    ));

    let session_listener_task = tokio::spawn(
        session::SessionListener::new(
            inbound_rx,
            SessionContext {
                registry: registry.clone(),
                cipher: cipher.clone(),
                inbox: inbox.clone(),
                max_message_bytes: config.session.max_message_bytes,
            },
            shutdown_tx.subscribe(),
        )
        .run(),
    );

    let heartbeat_task = tokio::spawn(
        Heartbeat::new(
            broadcaster.clone(),
            config.broadcast.greeting.clone(),
            config.broadcast.heartbeat_interval(),
            shutdown_tx.subscribe(),
        )
        .run(),
    );

    let drain_task = tokio::spawn(
        QueueDrain::new(broadcaster, queue.clone(), shutdown_tx.subscribe()).run(),
    );

    let peer_printer = {
        let registry = registry.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(5));
            loop {
                interval.tick().await;
                let peers = registry.snapshot();
                tracing::info!(count = peers.len(), "peer table snapshot");
                for p in peers {
                    tracing::info!(peer = %p.peer_id.short(), last_seen = p.last_seen_secs(), "  peer");
                }
            }
        })
    };

    if !config.network.dial.is_empty() {
        tokio::spawn(dial::dial_addresses(
            transport.clone(),
            registry.clone(),
            cipher.clone(),
            config.broadcast.greeting.clone(),
            config.network.dial.clone(),
        ));
    }

    // HTTP control surface
    let api_port = config.network.api_port;
    let api_task = {
        let state = murmur_api::ApiState {
            registry: registry.clone(),
            queue: queue.clone(),
            inbox: inbox.clone(),
            local_peer_id: local_peer_id.clone(),
            listen_addr: transport.listen_addr().to_string(),
            protocol: config.network.protocol.clone(),
            cipher_mode: cipher.mode(),
        };
        let shutdown = shutdown_tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) = murmur_api::serve(state, api_port, shutdown).await {
                tracing::error!(error = %e, "api server failed");
            }
        })
    };

    // ── Wait for exit ────────────────────────────────────────────────────────

    let mut shutdown_rx = shutdown_tx.subscribe();

    tokio::select! {
        _ = shutdown_rx.recv()      => tracing::info!("shutting down"),
        r = accept_task             => tracing::error!("stream listener exited: {:?}", r),
        r = session_listener_task   => tracing::error!("session listener exited: {:?}", r),
        r = heartbeat_task          => tracing::error!("heartbeat exited: {:?}", r),
        r = drain_task              => tracing::error!("queue drain exited: {:?}", r),
        r = peer_printer            => tracing::error!("peer printer exited: {:?}", r),
        r = api_task                => tracing::error!("api server exited: {:?}", r),
    }

    Ok(())
}
