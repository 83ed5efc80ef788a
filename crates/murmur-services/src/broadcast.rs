//! Broadcast scheduler: heartbeat and queue-drain fan-out.
//!
//! Both loops share one delivery path: for each peer in a registry
//! snapshot, open a fresh stream, write one ciphertext, close the write
//! side. Peers are attempted concurrently and independently. A failed dial
//! or write is taken as proof the peer is dead and removes it from the
//! registry. There are no retries and a dequeued message is never requeued.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use murmur_core::{CipherContext, PeerId};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast;
use tokio::time::{self, MissedTickBehavior};

use crate::queue::OutboundQueue;
use crate::registry::PeerRegistry;
use crate::transport::{Transport, TransportError};

#[derive(Debug, Error)]
pub enum SendError {
    #[error("dial failed: {0}")]
    Dial(#[from] TransportError),
    #[error("write failed: {0}")]
    Write(std::io::Error),
    #[error("send timed out after {0:?}")]
    Timeout(Duration),
}

/// Outcome of one fan-out.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FanOutReport {
    pub attempted: usize,
    pub delivered: usize,
    /// Peers whose send failed. Each has been removed from the registry.
    pub failed: Vec<PeerId>,
}

/// Encrypts and delivers messages to registered peers.
#[derive(Clone)]
pub struct Broadcaster {
    transport: Arc<dyn Transport>,
    registry: PeerRegistry,
    cipher: Arc<CipherContext>,
    protocol: String,
    send_timeout: Duration,
}

impl Broadcaster {
    pub fn new(
        transport: Arc<dyn Transport>,
        registry: PeerRegistry,
        cipher: Arc<CipherContext>,
        protocol: impl Into<String>,
        send_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            registry,
            cipher,
            protocol: protocol.into(),
            send_timeout,
        }
    }

    /// Dial `peer`, write one encrypted message, close the write side.
    pub async fn send_to_peer(&self, peer: &PeerId, plaintext: &str) -> Result<(), SendError> {
        let attempt = async {
            let mut stream = self.transport.dial(peer, &self.protocol).await?;
            let ciphertext = self.cipher.encrypt(plaintext);
            stream
                .write_all(ciphertext.as_bytes())
                .await
                .map_err(SendError::Write)?;
            stream.shutdown().await.map_err(SendError::Write)?;
            Ok::<(), SendError>(())
        };

        time::timeout(self.send_timeout, attempt)
            .await
            .map_err(|_| SendError::Timeout(self.send_timeout))?
    }

    /// Send `plaintext` to every peer in the current registry snapshot.
    ///
    /// Peers that register after the snapshot is taken are not included.
    pub async fn fan_out(&self, plaintext: &str) -> FanOutReport {
        let peers = self.registry.snapshot();
        if peers.is_empty() {
            tracing::trace!("no peers to send to");
            return FanOutReport::default();
        }

        let local = self.transport.local_peer_id();
        let sends = peers.into_iter().map(|record| async move {
            let peer = record.peer_id;
            match self.send_to_peer(&peer, plaintext).await {
                Ok(()) => {
                    tracing::debug!(from = %local.short(), peer = %peer, "message sent");
                    Ok(peer)
                }
                Err(e) => {
                    tracing::warn!(
                        from = %local.short(),
                        peer = %peer,
                        error = %e,
                        "error sending to peer, removing"
                    );
                    self.registry.remove(&peer);
                    self.transport.forget(&peer);
                    Err(peer)
                }
            }
        });

        let mut report = FanOutReport::default();
        for result in join_all(sends).await {
            report.attempted += 1;
            match result {
                Ok(_) => report.delivered += 1,
                Err(peer) => report.failed.push(peer),
            }
        }
        report
    }
}

// ── Heartbeat ─────────────────────────────────────────────────────────────────

/// Sends a fixed greeting to every known peer on a fixed period.
pub struct Heartbeat {
    broadcaster: Broadcaster,
    greeting: String,
    period: Duration,
    shutdown: broadcast::Receiver<()>,
}

impl Heartbeat {
    pub fn new(
        broadcaster: Broadcaster,
        greeting: impl Into<String>,
        period: Duration,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            broadcaster,
            greeting: greeting.into(),
            period,
            shutdown,
        }
    }

    /// One heartbeat round.
    pub async fn tick(&self) -> FanOutReport {
        self.broadcaster.fan_out(&self.greeting).await
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        let mut interval = time::interval_at(time::Instant::now() + self.period, self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(period_ms = self.period.as_millis() as u64, "heartbeat starting");

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("heartbeat shutting down");
                    return Ok(());
                }

                _ = interval.tick() => {
                    let report = self.tick().await;
                    if report.attempted > 0 {
                        tracing::debug!(
                            attempted = report.attempted,
                            delivered = report.delivered,
                            failed = report.failed.len(),
                            "heartbeat sent"
                        );
                    }
                }
            }
        }
    }
}

// ── Queue drain ───────────────────────────────────────────────────────────────

/// Takes queued messages one at a time and fans each out to every peer.
pub struct QueueDrain {
    broadcaster: Broadcaster,
    queue: OutboundQueue,
    shutdown: broadcast::Receiver<()>,
}

impl QueueDrain {
    pub fn new(
        broadcaster: Broadcaster,
        queue: OutboundQueue,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            broadcaster,
            queue,
            shutdown,
        }
    }

    /// Drain one message if the queue is non-empty.
    pub async fn drain_once(&self) -> Option<FanOutReport> {
        let msg = self.queue.try_dequeue().await?;
        Some(self.broadcast(&msg).await)
    }

    async fn broadcast(&self, msg: &str) -> FanOutReport {
        let report = self.broadcaster.fan_out(msg).await;
        tracing::info!(
            attempted = report.attempted,
            delivered = report.delivered,
            failed = report.failed.len(),
            "queued message broadcast"
        );
        report
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        tracing::info!("queue drain starting");
        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("queue drain shutting down");
                    return Ok(());
                }

                msg = self.queue.dequeue() => {
                    self.broadcast(&msg).await;
                }
            }
        }
    }
}
