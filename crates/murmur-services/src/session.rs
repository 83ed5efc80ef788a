//! Inbound session handler.
//!
//! One session per inbound stream. The whole stream body is one base64
//! ciphertext, ended by the remote closing its write side.
//!
//! ```text
//!   Open ──accept──▶ Receiving ──close──▶ Closed
//!                        │                  ▲
//!                      error                │
//!                        ▼                  │
//!                     Errored ────close─────┘
//! ```
//!
//! Only `Close` removes the peer from the registry. A stream error is
//! reported and leaves the registry alone; the driver follows it with a
//! `Close` because the stream cannot be read any further.

use std::sync::Arc;

use murmur_core::{CipherContext, CipherError, PeerId};
use tokio::io::AsyncReadExt;

use crate::inbox::Inbox;
use crate::registry::PeerRegistry;
use crate::transport::InboundStream;

const READ_CHUNK: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Receiving,
    Errored,
    Closed,
}

#[derive(Debug)]
pub enum SessionEvent {
    /// A chunk of the stream body, in whatever size the transport chose.
    Data(Vec<u8>),
    /// The remote closed its write side.
    End,
    /// I/O fault on the stream.
    Error(std::io::Error),
    /// The stream is gone.
    Close,
}

/// State shared by every session on this node.
#[derive(Clone)]
pub struct SessionContext {
    pub registry: PeerRegistry,
    pub cipher: Arc<CipherContext>,
    pub inbox: Inbox,
    pub max_message_bytes: usize,
}

pub struct Session {
    peer: PeerId,
    state: SessionState,
    buffer: Vec<u8>,
    ctx: SessionContext,
}

impl Session {
    pub fn new(peer: PeerId, ctx: SessionContext) -> Self {
        Self {
            peer,
            state: SessionState::Open,
            buffer: Vec::new(),
            ctx,
        }
    }

    pub fn peer(&self) -> &PeerId {
        &self.peer
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Register the peer and start receiving.
    pub fn accept(&mut self) -> SessionState {
        if self.state != SessionState::Open {
            return self.state;
        }
        self.ctx.registry.upsert(&self.peer);
        tracing::info!(peer = %self.peer, "connected to peer");
        self.state = SessionState::Receiving;
        self.state
    }

    pub async fn on_event(&mut self, event: SessionEvent) -> SessionState {
        match (self.state, event) {
            (SessionState::Closed, event) => {
                tracing::trace!(peer = %self.peer, ?event, "event after close ignored");
            }

            (_, SessionEvent::Close) => {
                self.ctx.registry.remove(&self.peer);
                self.buffer = Vec::new();
                self.state = SessionState::Closed;
                tracing::info!(peer = %self.peer, "disconnected from peer");
            }

            (SessionState::Open, event) => {
                tracing::debug!(peer = %self.peer, ?event, "event before accept ignored");
            }

            (_, SessionEvent::Error(e)) => {
                tracing::warn!(peer = %self.peer, error = %e, "stream error");
                self.state = SessionState::Errored;
            }

            (SessionState::Receiving, SessionEvent::Data(chunk)) => {
                if self.buffer.len() + chunk.len() > self.ctx.max_message_bytes {
                    tracing::warn!(
                        peer = %self.peer,
                        limit = self.ctx.max_message_bytes,
                        "stream error: message exceeds size limit"
                    );
                    self.buffer = Vec::new();
                    self.state = SessionState::Errored;
                } else {
                    self.buffer.extend_from_slice(&chunk);
                }
            }

            (SessionState::Receiving, SessionEvent::End) => {
                let body = std::mem::take(&mut self.buffer);
                match self.decode(body) {
                    Ok(text) => {
                        tracing::info!(peer = %self.peer, text = %text, "received message");
                        self.ctx.inbox.push(self.peer.clone(), text).await;
                    }
                    Err(e) => {
                        tracing::warn!(peer = %self.peer, error = %e, "failed to decrypt message");
                    }
                }
            }

            (SessionState::Errored, event) => {
                tracing::trace!(peer = %self.peer, ?event, "event on errored stream ignored");
            }
        }
        self.state
    }

    fn decode(&self, body: Vec<u8>) -> Result<String, CipherError> {
        let text = String::from_utf8(body)?;
        self.ctx.cipher.decrypt(&text)
    }
}

/// Drive one inbound stream to completion. Returns the final state.
pub async fn run_session(inbound: InboundStream, ctx: SessionContext) -> SessionState {
    let InboundStream { peer, mut stream } = inbound;
    let mut session = Session::new(peer, ctx);
    session.accept();

    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let event = match stream.read(&mut buf).await {
            Ok(0) => SessionEvent::End,
            Ok(n) => SessionEvent::Data(buf[..n].to_vec()),
            Err(e) => SessionEvent::Error(e),
        };
        let finished = matches!(event, SessionEvent::End);
        if session.on_event(event).await == SessionState::Errored || finished {
            break;
        }
    }

    drop(stream);
    session.on_event(SessionEvent::Close).await
}
