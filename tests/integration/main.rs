//! Murmur integration test harness.
//!
//! Several nodes share one in-process `MemoryNetwork`. Each node runs the
//! same tasks the daemon runs (session dispatch and queue drain) against
//! its own registry, inbox and queue. Heartbeats are driven by the tests.
//!
//!   cargo test --test integration

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use tokio::sync::broadcast;

use murmur_core::{CipherContext, CipherMode, PeerId};
use murmur_services::{
    run_session, Broadcaster, Heartbeat, Inbox, MemoryNetwork, OutboundQueue, PeerRegistry,
    QueueDrain, SessionContext, Transport,
};

mod delivery;
mod membership;
mod encryption;

// ── Harness ───────────────────────────────────────────────────────────────────

pub const GREETING: &str = "Hello, NET!";
pub const SEND_TIMEOUT: Duration = Duration::from_secs(2);

pub fn shared_cipher(mode: CipherMode) -> Arc<CipherContext> {
    Arc::new(CipherContext::from_parts([0x42; 32], [0x24; 16], mode))
}

pub struct Node {
    pub id: PeerId,
    pub registry: PeerRegistry,
    pub inbox: Inbox,
    pub queue: OutboundQueue,
    pub broadcaster: Broadcaster,
    shutdown: broadcast::Sender<()>,
}

impl Node {
    /// Join `net` as `id` and start the session dispatcher and queue drain.
    pub fn spawn(net: &MemoryNetwork, id: &str, cipher: Arc<CipherContext>) -> Self {
        let id = PeerId::from(id);
        let (transport, mut inbound) = net.join(id.clone());
        let registry = PeerRegistry::new();
        let inbox = Inbox::new(64);
        let queue = OutboundQueue::new();
        let (shutdown, _) = broadcast::channel(1);

        let broadcaster = Broadcaster::new(
            Arc::new(transport) as Arc<dyn Transport>,
            registry.clone(),
            cipher.clone(),
            murmur_core::wire::PROTOCOL_ID,
            SEND_TIMEOUT,
        );

        let ctx = SessionContext {
            registry: registry.clone(),
            cipher,
            inbox: inbox.clone(),
            max_message_bytes: 64 * 1024,
        };
        let mut stop = shutdown.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stop.recv() => return,
                    next = inbound.recv() => match next {
                        Some(stream) => { tokio::spawn(run_session(stream, ctx.clone())); }
                        None => return,
                    },
                }
            }
        });

        tokio::spawn(QueueDrain::new(broadcaster.clone(), queue.clone(), shutdown.subscribe()).run());

        Self {
            id,
            registry,
            inbox,
            queue,
            broadcaster,
            shutdown,
        }
    }

    /// Make `other` a known peer of this node.
    pub fn knows(&self, other: &Node) {
        self.registry.upsert(&other.id);
    }

    pub fn heartbeat(&self, period: Duration) -> Heartbeat {
        Heartbeat::new(self.broadcaster.clone(), GREETING, period, self.shutdown.subscribe())
    }

    /// Texts received so far, from `from`.
    pub async fn received_from(&self, from: &Node) -> Vec<String> {
        self.inbox
            .list()
            .await
            .into_iter()
            .filter(|m| m.from == from.id)
            .map(|m| m.text)
            .collect()
    }

    pub fn stop(&self) {
        let _ = self.shutdown.send(());
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        self.stop();
    }
}

const POLL: Duration = Duration::from_millis(10);
const POLL_ROUNDS: usize = 200;

impl Node {
    /// Wait until exactly `expected` has arrived from `from`, in any order.
    /// Each message is its own session, so arrival order is not guaranteed.
    pub async fn wait_for(&self, from: &Node, expected: &[&str]) -> Result<()> {
        let mut expected = expected.to_vec();
        expected.sort_unstable();
        let mut got = Vec::new();
        for _ in 0..POLL_ROUNDS {
            got = self.received_from(from).await;
            got.sort_unstable();
            if got == expected {
                return Ok(());
            }
            tokio::time::sleep(POLL).await;
        }
        bail!("{} expected {expected:?} from {}, got {got:?}", self.id, from.id)
    }

    /// Wait until at least `n` messages have arrived from `from`.
    pub async fn wait_for_count(&self, from: &Node, n: usize) -> Result<()> {
        for _ in 0..POLL_ROUNDS {
            if self.received_from(from).await.len() >= n {
                return Ok(());
            }
            tokio::time::sleep(POLL).await;
        }
        bail!("{} never got {n} messages from {}", self.id, from.id)
    }

    /// Wait until `peer` is no longer in this node's registry.
    pub async fn wait_until_forgotten(&self, peer: &PeerId) -> Result<()> {
        for _ in 0..POLL_ROUNDS {
            if !self.registry.contains(peer) {
                return Ok(());
            }
            tokio::time::sleep(POLL).await;
        }
        bail!("{} still lists {peer}", self.id)
    }
}

/// Give in-flight sessions a moment to finish.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}
