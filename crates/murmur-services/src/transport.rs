//! Transport boundary.
//!
//! The node needs two things from whatever carries its bytes: inbound
//! streams tagged with the remote peer id, and the ability to open an
//! outbound stream to a named peer under a protocol id. Streams are
//! reliable, ordered, and authenticated by the transport; the node adds
//! nothing on top except the cipher.

use futures::future::BoxFuture;
use murmur_core::PeerId;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

/// A bidirectional byte stream.
pub trait ByteStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> ByteStream for T {}

pub type BoxedStream = Box<dyn ByteStream>;

/// A stream opened to us by a remote peer.
pub struct InboundStream {
    pub peer: PeerId,
    pub stream: BoxedStream,
}

impl std::fmt::Debug for InboundStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InboundStream")
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}

/// Outbound half of a transport. Inbound streams arrive on a channel the
/// transport hands out when it starts.
pub trait Transport: Send + Sync {
    /// This node's own identity on the transport.
    fn local_peer_id(&self) -> &PeerId;

    /// Open a new stream to `peer` speaking `protocol`.
    fn dial<'a>(
        &'a self,
        peer: &'a PeerId,
        protocol: &'a str,
    ) -> BoxFuture<'a, Result<BoxedStream, TransportError>>;

    /// Drop whatever the transport remembers about reaching `peer`.
    fn forget(&self, _peer: &PeerId) {}
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no known address for peer {0}")]
    UnknownPeer(PeerId),
    #[error("peer {0} is not accepting streams")]
    Unreachable(PeerId),
    #[error("protocol mismatch: expected {expected}, got {got}")]
    ProtocolMismatch { expected: String, got: String },
    #[error("bad stream preamble: {0}")]
    BadPreamble(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
