//! Per-room live feed: a process-wide registry of broadcast channels,
//! published on every message insert and subscribed by open room sessions.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::db::Message;

const FEED_CAPACITY: usize = 64;

#[derive(Clone, Default)]
pub struct ChatFeed {
    channels: Arc<Mutex<HashMap<String, broadcast::Sender<Message>>>>,
}

impl ChatFeed {
    pub fn new() -> ChatFeed {
        ChatFeed::default()
    }

    /// Subscribes to insertion events for one room. Dropping the receiver is
    /// the teardown; senders with no receivers left are pruned on publish.
    pub fn subscribe(&self, chat_id: &str) -> broadcast::Receiver<Message> {
        let mut channels = self.channels.lock();
        channels
            .entry(chat_id.to_owned())
            .or_insert_with(|| broadcast::channel(FEED_CAPACITY).0)
            .subscribe()
    }

    pub fn publish(&self, message: &Message) {
        let mut channels = self.channels.lock();
        if let Some(tx) = channels.get(&message.chat_id) {
            match tx.send(message.clone()) {
                Ok(listeners) => {
                    tracing::debug!(chat = %message.chat_id, listeners, "published message event");
                }
                Err(_) => {
                    channels.remove(&message.chat_id);
                }
            }
        }
    }
}
