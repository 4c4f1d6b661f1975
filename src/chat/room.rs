//! In-memory state for one open room session: an ordered, deduplicated view
//! of the room's messages, seeded from a snapshot and appended to by the live
//! feed. The owning task is the sole mutator.

use serde::Serialize;

use crate::db::{self, Message};

pub struct RoomSession {
    user_id: String,
    messages: Vec<Message>,
}

/// A contiguous run of messages sharing one calendar date.
#[derive(Debug, Serialize)]
pub struct DayGroup {
    pub date: String,
    pub messages: Vec<Message>,
}

impl RoomSession {
    pub fn new(user_id: impl Into<String>, snapshot: Vec<Message>) -> RoomSession {
        let mut messages = snapshot;
        messages.sort_by(|a, b| sort_key(a).cmp(&sort_key(b)));
        messages.dedup_by(|a, b| a.id == b.id);
        RoomSession {
            user_id: user_id.into(),
            messages,
        }
    }

    /// Inserts a live-feed event at its (created_at, id) position. Returns
    /// false and discards when the id is already present — the feed is
    /// at-least-once and overlaps the snapshot, so duplicates are expected.
    pub fn apply(&mut self, message: Message) -> bool {
        if self.messages.iter().any(|m| m.id == message.id) {
            return false;
        }
        let at = self
            .messages
            .partition_point(|m| sort_key(m) <= sort_key(&message));
        self.messages.insert(at, message);
        true
    }

    pub fn from_counterpart(&self, message: &Message) -> bool {
        message.sender_id != self.user_id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Partitions the ordered sequence into contiguous same-date runs.
    /// Appending a message never moves an existing group boundary.
    pub fn day_groups(&self) -> Vec<DayGroup> {
        let mut groups: Vec<DayGroup> = Vec::new();
        for message in &self.messages {
            let day = db::day_of(&message.created_at);
            match groups.last_mut() {
                Some(group) if group.date == day => group.messages.push(message.clone()),
                _ => groups.push(DayGroup {
                    date: day.to_owned(),
                    messages: vec![message.clone()],
                }),
            }
        }
        groups
    }
}

fn sort_key(message: &Message) -> (&str, &str) {
    (&message.created_at, &message.id)
}
