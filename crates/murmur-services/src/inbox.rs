//! Inbox: recently received plaintext messages, newest last.
//!
//! Bounded and in-memory only. The oldest message is evicted when full.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::SystemTime;

use murmur_core::PeerId;
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedMessage {
    pub from: PeerId,
    pub text: String,
    pub received_at: SystemTime,
}

#[derive(Clone)]
pub struct Inbox {
    messages: Arc<Mutex<VecDeque<ReceivedMessage>>>,
    capacity: usize,
}

impl Inbox {
    pub fn new(capacity: usize) -> Self {
        Self {
            messages: Arc::new(Mutex::new(VecDeque::with_capacity(capacity.min(1024)))),
            capacity,
        }
    }

    pub async fn push(&self, from: PeerId, text: String) {
        if self.capacity == 0 {
            return;
        }
        let mut messages = self.messages.lock().await;
        while messages.len() >= self.capacity {
            messages.pop_front();
        }
        messages.push_back(ReceivedMessage {
            from,
            text,
            received_at: SystemTime::now(),
        });
    }

    pub async fn list(&self) -> Vec<ReceivedMessage> {
        self.messages.lock().await.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.messages.lock().await.len()
    }
}
