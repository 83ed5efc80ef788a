//! TCP stream transport.
//!
//! Every connection carries exactly one stream. The dialer opens with a
//! one-line preamble, the listener answers with its own id, and everything
//! after that is the stream body:
//!
//! ```text
//!   dialer   → "<protocol> <peer-id> <listen-port>\n"
//!   listener → "<peer-id>\n"            (or "ERR <reason>\n")
//! ```
//!
//! The listener learns the dialer's address from the socket's source IP
//! and the advertised listen port; that address book is what `dial`
//! resolves peer ids against. One address maps to at most one peer id: a
//! new id announced from a known address replaces the old one.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use dashmap::DashMap;
use futures::future::BoxFuture;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};

use murmur_core::PeerId;
use murmur_services::{BoxedStream, InboundStream, Transport, TransportError};

const MAX_PREAMBLE: u64 = 512;
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Parsed dialer preamble.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preamble {
    pub protocol: String,
    pub peer: PeerId,
    pub listen_port: u16,
}

impl Preamble {
    pub fn encode(&self) -> String {
        format!("{} {} {}\n", self.protocol, self.peer, self.listen_port)
    }

    pub fn parse(line: &str) -> Result<Self, TransportError> {
        let mut parts = line.trim_end_matches(['\r', '\n']).split(' ');
        let (Some(protocol), Some(peer), Some(port), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(TransportError::BadPreamble(line.trim_end().to_string()));
        };
        if protocol.is_empty() || peer.is_empty() {
            return Err(TransportError::BadPreamble(line.trim_end().to_string()));
        }
        let listen_port = port
            .parse()
            .map_err(|_| TransportError::BadPreamble(format!("bad port {port:?}")))?;
        Ok(Self {
            protocol: protocol.to_string(),
            peer: PeerId::new(peer),
            listen_port,
        })
    }
}

pub struct TcpTransport {
    local: PeerId,
    listen_addr: SocketAddr,
    protocol: String,
    addresses: DashMap<PeerId, SocketAddr>,
    by_addr: DashMap<SocketAddr, PeerId>,
}

impl TcpTransport {
    /// Bind the listening socket. Call `accept_loop` with the returned
    /// listener to start receiving streams.
    pub async fn bind(
        addr: &str,
        local: PeerId,
        protocol: impl Into<String>,
    ) -> Result<(Arc<Self>, TcpListener)> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind stream listener on {addr}"))?;
        let listen_addr = listener.local_addr()?;
        let transport = Arc::new(Self {
            local,
            listen_addr,
            protocol: protocol.into(),
            addresses: DashMap::new(),
            by_addr: DashMap::new(),
        });
        Ok((transport, listener))
    }

    pub fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }

    /// Record where `peer` can be reached.
    pub fn add_address(&self, peer: PeerId, addr: SocketAddr) {
        if let Some(previous) = self.by_addr.insert(addr, peer.clone()) {
            if previous != peer {
                self.addresses.remove_if(&previous, |_, a| *a == addr);
            }
        }
        if let Some(moved_from) = self.addresses.insert(peer.clone(), addr) {
            if moved_from != addr {
                self.by_addr.remove_if(&moved_from, |_, p| *p == peer);
            }
        }
    }

    /// Number of peers in the address book.
    pub fn known_addresses(&self) -> usize {
        self.addresses.len()
    }

    pub fn address_of(&self, peer: &PeerId) -> Option<SocketAddr> {
        self.addresses.get(peer).map(|e| *e.value())
    }

    /// Accept connections until shutdown, handing each completed
    /// handshake to `inbound`.
    pub async fn accept_loop(
        self: Arc<Self>,
        listener: TcpListener,
        inbound: mpsc::UnboundedSender<InboundStream>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<()> {
        tracing::info!(addr = %self.listen_addr, "stream listener starting");
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("stream listener shutting down");
                    return Ok(());
                }

                accepted = listener.accept() => {
                    let (socket, remote) = match accepted {
                        Ok(a) => a,
                        Err(e) => {
                            tracing::warn!(error = %e, "accept failed");
                            continue;
                        }
                    };
                    let transport = self.clone();
                    let inbound = inbound.clone();
                    tokio::spawn(async move {
                        let result = tokio::time::timeout(
                            HANDSHAKE_TIMEOUT,
                            transport.respond(socket, remote),
                        )
                        .await;
                        match result {
                            Ok(Ok(stream)) => {
                                if inbound.send(stream).is_err() {
                                    tracing::debug!("session listener gone, dropping stream");
                                }
                            }
                            Ok(Err(e)) => tracing::warn!(%remote, error = %e, "inbound handshake failed"),
                            Err(_) => tracing::warn!(%remote, "inbound handshake timed out"),
                        }
                    });
                }
            }
        }
    }

    /// Listener side of the handshake.
    async fn respond(
        &self,
        socket: TcpStream,
        remote: SocketAddr,
    ) -> Result<InboundStream, TransportError> {
        let mut reader = BufReader::new(socket);
        let line = read_line(&mut reader).await?;
        let preamble = Preamble::parse(&line)?;

        if preamble.protocol != self.protocol {
            let _ = reader.write_all(b"ERR unsupported protocol\n").await;
            return Err(TransportError::ProtocolMismatch {
                expected: self.protocol.clone(),
                got: preamble.protocol,
            });
        }
        if preamble.peer == self.local {
            let _ = reader.write_all(b"ERR self dial\n").await;
            return Err(TransportError::BadPreamble("peer dialed itself".into()));
        }

        self.add_address(
            preamble.peer.clone(),
            SocketAddr::new(remote.ip(), preamble.listen_port),
        );

        reader
            .write_all(format!("{}\n", self.local).as_bytes())
            .await?;
        reader.flush().await?;
        tracing::debug!(peer = %preamble.peer, %remote, "inbound stream accepted");

        Ok(InboundStream {
            peer: preamble.peer,
            stream: Box::new(reader),
        })
    }

    /// Dialer side of the handshake. Returns the remote's id and the stream.
    async fn connect(
        &self,
        addr: SocketAddr,
        protocol: &str,
    ) -> Result<(PeerId, BoxedStream), TransportError> {
        let socket = TcpStream::connect(addr).await?;
        let mut reader = BufReader::new(socket);

        let preamble = Preamble {
            protocol: protocol.to_string(),
            peer: self.local.clone(),
            listen_port: self.listen_addr.port(),
        };
        reader.write_all(preamble.encode().as_bytes()).await?;
        reader.flush().await?;

        let reply = read_line(&mut reader).await?;
        let reply = reply.trim_end();
        if let Some(reason) = reply.strip_prefix("ERR ") {
            if reason == "unsupported protocol" {
                return Err(TransportError::ProtocolMismatch {
                    expected: protocol.to_string(),
                    got: "rejected by remote".into(),
                });
            }
            return Err(TransportError::BadPreamble(reason.to_string()));
        }
        if reply.is_empty() || reply.contains(' ') {
            return Err(TransportError::BadPreamble(reply.to_string()));
        }

        Ok((PeerId::new(reply), Box::new(reader)))
    }

    /// Dial a raw address whose peer id is not yet known. The learned id is
    /// added to the address book.
    pub async fn introduce(&self, addr: SocketAddr) -> Result<(PeerId, BoxedStream), TransportError> {
        let (peer, stream) = tokio::time::timeout(HANDSHAKE_TIMEOUT, self.connect(addr, &self.protocol))
            .await
            .map_err(|_| {
                TransportError::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "handshake timed out",
                ))
            })??;
        if peer == self.local {
            return Err(TransportError::BadPreamble("dialed ourselves".into()));
        }
        self.add_address(peer.clone(), addr);
        Ok((peer, stream))
    }
}

impl Transport for TcpTransport {
    fn local_peer_id(&self) -> &PeerId {
        &self.local
    }

    fn dial<'a>(
        &'a self,
        peer: &'a PeerId,
        protocol: &'a str,
    ) -> BoxFuture<'a, Result<BoxedStream, TransportError>> {
        Box::pin(async move {
            let addr = self
                .address_of(peer)
                .ok_or_else(|| TransportError::UnknownPeer(peer.clone()))?;
            let (remote, stream) = self.connect(addr, protocol).await?;
            if &remote != peer {
                return Err(TransportError::BadPreamble(format!(
                    "expected {peer} at {addr}, found {remote}"
                )));
            }
            Ok(stream)
        })
    }

    fn forget(&self, peer: &PeerId) {
        if let Some((_, addr)) = self.addresses.remove(peer) {
            self.by_addr.remove_if(&addr, |_, p| p == peer);
        }
    }
}

/// Read one `\n`-terminated line of at most `MAX_PREAMBLE` bytes.
async fn read_line<R>(reader: &mut BufReader<R>) -> Result<String, TransportError>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut line = String::new();
    let n = reader.take(MAX_PREAMBLE).read_line(&mut line).await?;
    if n == 0 || !line.ends_with('\n') {
        return Err(TransportError::BadPreamble(format!(
            "unterminated preamble ({n} bytes)"
        )));
    }
    Ok(line)
}
