//! Outbound queue: plaintext messages waiting to be broadcast.
//!
//! Unbounded FIFO. The HTTP surface enqueues; the drain loop is the single
//! consumer. A message leaves the queue exactly once, when the drain loop
//! takes it, whether or not any peer later receives it.

use std::collections::VecDeque;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Mutex, Notify};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnqueueError {
    #[error("Content is required")]
    ContentRequired,
}

#[derive(Default)]
struct Inner {
    messages: Mutex<VecDeque<String>>,
    ready: Notify,
}

#[derive(Clone, Default)]
pub struct OutboundQueue {
    inner: Arc<Inner>,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message. Empty content is rejected and the queue is untouched.
    /// Returns the queue length after the push.
    pub async fn enqueue(&self, content: impl Into<String>) -> Result<usize, EnqueueError> {
        let content = content.into();
        if content.is_empty() {
            return Err(EnqueueError::ContentRequired);
        }
        let len = {
            let mut messages = self.inner.messages.lock().await;
            messages.push_back(content);
            messages.len()
        };
        self.inner.ready.notify_one();
        Ok(len)
    }

    /// Take the oldest message, if any.
    pub async fn try_dequeue(&self) -> Option<String> {
        self.inner.messages.lock().await.pop_front()
    }

    /// Take the oldest message, waiting until one is available.
    pub async fn dequeue(&self) -> String {
        loop {
            if let Some(msg) = self.try_dequeue().await {
                return msg;
            }
            // notify_one stores a permit when nobody is waiting, so a push
            // between the check above and this await is not lost.
            self.inner.ready.notified().await;
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.messages.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.messages.lock().await.is_empty()
    }
}
