//! Peer registry: the set of peers this node believes it can reach.
//!
//! Written by the session handler (connect/close) and by the broadcast
//! loops (removal on send failure); read by the broadcast loops and the
//! HTTP surface. A peer that is absent must not be contacted.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use murmur_core::PeerId;

/// Metadata kept for one known peer.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerRecord {
    pub peer_id: PeerId,
    /// When the record was created or last upserted.
    pub last_seen: SystemTime,
}

impl PeerRecord {
    /// `last_seen` as fractional Unix seconds.
    pub fn last_seen_secs(&self) -> f64 {
        unix_secs(self.last_seen)
    }
}

/// Fractional seconds since the Unix epoch. Clamps pre-epoch times to 0.
pub fn unix_secs(t: SystemTime) -> f64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Concurrent peer map. Cloning shares the underlying map.
#[derive(Clone, Default)]
pub struct PeerRegistry {
    peers: Arc<DashMap<PeerId, PeerRecord>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or refresh `peer` with `last_seen = now`.
    /// Returns true if the peer was not previously known.
    pub fn upsert(&self, peer: &PeerId) -> bool {
        let record = PeerRecord {
            peer_id: peer.clone(),
            last_seen: SystemTime::now(),
        };
        self.peers.insert(peer.clone(), record).is_none()
    }

    /// Remove `peer` if present. Removing an unknown peer is a no-op.
    pub fn remove(&self, peer: &PeerId) -> Option<PeerRecord> {
        self.peers.remove(peer).map(|(_, record)| record)
    }

    /// Point-in-time copy of every record. Safe to iterate while other
    /// tasks mutate the registry.
    pub fn snapshot(&self) -> Vec<PeerRecord> {
        self.peers.iter().map(|e| e.value().clone()).collect()
    }

    pub fn contains(&self, peer: &PeerId) -> bool {
        self.peers.contains_key(peer)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
