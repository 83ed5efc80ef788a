//! Inbound stream dispatcher.
//!
//! Takes every stream the transport accepted and drives it through its
//! own session task. Sessions are independent; one slow sender never
//! holds up another.

use tokio::sync::{broadcast, mpsc};

use murmur_services::{run_session, InboundStream, SessionContext};

pub struct SessionListener {
    inbound: mpsc::UnboundedReceiver<InboundStream>,
    ctx: SessionContext,
    shutdown: broadcast::Receiver<()>,
}

impl SessionListener {
    pub fn new(
        inbound: mpsc::UnboundedReceiver<InboundStream>,
        ctx: SessionContext,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            inbound,
            ctx,
            shutdown,
        }
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        tracing::info!("session listener starting");
        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("session listener shutting down");
                    return Ok(());
                }

                next = self.inbound.recv() => {
                    let Some(stream) = next else {
                        tracing::info!("transport closed, session listener stopping");
                        return Ok(());
                    };
                    let peer = stream.peer.clone();
                    let ctx = self.ctx.clone();
                    tokio::spawn(async move {
                        let state = run_session(stream, ctx).await;
                        tracing::debug!(%peer, ?state, "session finished");
                    });
                }
            }
        }
    }
}
