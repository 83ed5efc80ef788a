//! In-process transport over `tokio::io::duplex`.
//!
//! Every endpoint joined to a `MemoryNetwork` gets a channel of inbound
//! streams. Dialing an endpoint that never joined, or that has left, fails
//! the way an unreachable peer would on a real network.

use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;
use murmur_core::PeerId;
use tokio::sync::mpsc;

use crate::transport::{BoxedStream, InboundStream, Transport, TransportError};

const DUPLEX_BUFFER: usize = 64 * 1024;

#[derive(Clone, Default)]
pub struct MemoryNetwork {
    endpoints: Arc<DashMap<PeerId, mpsc::UnboundedSender<InboundStream>>>,
    dials: Arc<DashMap<PeerId, usize>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `peer` to the network.
    pub fn join(&self, peer: PeerId) -> (MemoryTransport, mpsc::UnboundedReceiver<InboundStream>) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.endpoints.insert(peer.clone(), tx);
        let transport = MemoryTransport {
            local: peer,
            network: self.clone(),
        };
        (transport, rx)
    }

    /// Detach `peer`. Later dials to it fail.
    pub fn leave(&self, peer: &PeerId) {
        self.endpoints.remove(peer);
    }

    /// Dial attempts made towards `peer`, successful or not.
    pub fn dial_count(&self, peer: &PeerId) -> usize {
        self.dials.get(peer).map(|n| *n).unwrap_or(0)
    }
}

pub struct MemoryTransport {
    local: PeerId,
    network: MemoryNetwork,
}

impl Transport for MemoryTransport {
    fn local_peer_id(&self) -> &PeerId {
        &self.local
    }

    fn dial<'a>(
        &'a self,
        peer: &'a PeerId,
        _protocol: &'a str,
    ) -> BoxFuture<'a, Result<BoxedStream, TransportError>> {
        Box::pin(async move {
            *self.network.dials.entry(peer.clone()).or_insert(0) += 1;

            let endpoint = self
                .network
                .endpoints
                .get(peer)
                .map(|e| e.value().clone())
                .ok_or_else(|| TransportError::UnknownPeer(peer.clone()))?;

            let (ours, theirs) = tokio::io::duplex(DUPLEX_BUFFER);
            endpoint
                .send(InboundStream {
                    peer: self.local.clone(),
                    stream: Box::new(theirs),
                })
                .map_err(|_| TransportError::Unreachable(peer.clone()))?;

            Ok(Box::new(ours) as BoxedStream)
        })
    }
}
