use crate::types::message::{Key, Message};
use dashmap::DashMap;

/// In-flight message correlation store: maps a message identity to the
/// pending record so that asynchronous server replies (`received` receipts,
/// `media`/`duplicate` upload results) can be matched back to the message
/// they answer.
///
/// Entries are transient. Sends insert before transmission and receipts
/// remove on resolution, except voice notes which stay until marked played.
/// The map is internally synchronized so several sessions may share one
/// store; a single session's access pattern is sequential anyway.
#[derive(Debug, Default)]
pub struct PendingStore {
    entries: DashMap<Key, Message>,
}

impl PendingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, message: Message) {
        self.entries.insert(message.key.clone(), message);
    }

    pub fn get(&self, key: &Key) -> Option<Message> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    pub fn remove(&self, key: &Key) -> Option<Message> {
        self.entries.remove(key).map(|(_, message)| message)
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
