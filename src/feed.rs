//! Live push of newly stored messages.
//!
//! Delivery is best effort: a subscriber only sees what is published while it
//! is subscribed. Anything missed (not yet connected, lagged behind the
//! channel) is recovered from `conversations::msg::history` using the last
//! `seq` the subscriber delivered.

use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};
use uuid::Uuid;

use crate::conversations::ChatMessage;

#[derive(Clone)]
pub struct Feed {
    tx: broadcast::Sender<Arc<ChatMessage>>,
}

pub enum FeedEvent {
    Message(Arc<ChatMessage>),
    /// Some messages were dropped for this subscriber; re-read history.
    Lagged,
    Closed,
}

impl Feed {
    pub fn new(capacity: usize) -> Self {
        Self {
            tx: broadcast::channel(capacity.max(1)).0,
        }
    }

    pub fn publish(&self, msg: ChatMessage) {
        // no receivers is fine
        let receivers = self.tx.send(Arc::new(msg)).unwrap_or(0);
        tracing::trace!(receivers, "message published");
    }

    pub fn subscribe(&self, conversation_id: Uuid) -> Subscription {
        Subscription {
            conversation_id,
            rx: self.tx.subscribe(),
        }
    }
}

pub struct Subscription {
    conversation_id: Uuid,
    rx: broadcast::Receiver<Arc<ChatMessage>>,
}

impl Subscription {
    pub fn conversation_id(&self) -> Uuid {
        self.conversation_id
    }

    /// Next message of this subscription's conversation.
    pub async fn next(&mut self) -> FeedEvent {
        loop {
            match self.rx.recv().await {
                Ok(msg) if msg.conversation_id == self.conversation_id => {
                    return FeedEvent::Message(msg);
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(conversation_id = %self.conversation_id, skipped, "subscriber lagged");
                    return FeedEvent::Lagged;
                }
                Err(RecvError::Closed) => return FeedEvent::Closed,
            }
        }
    }
}
