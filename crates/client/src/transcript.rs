use std::collections::HashSet;

use crate::models::ChannelMessage;

/// Ordered, de-duplicated set of channel messages.
///
/// Entries are kept sorted by `created_at`; messages with equal timestamps
/// keep the order in which they arrived. Inserting an id that is already
/// present does nothing, so history pages and live frames can be applied in
/// any order.
#[derive(Default)]
pub struct Transcript {
    entries: Vec<ChannelMessage>,
    ids: HashSet<String>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when the message was not already present.
    pub fn insert(&mut self, message: ChannelMessage) -> bool {
        if !self.ids.insert(message.id.clone()) {
            return false;
        }

        // Later arrivals sort after everything with the same timestamp
        let pos = self
            .entries
            .partition_point(|m| m.created_at <= message.created_at);
        self.entries.insert(pos, message);
        true
    }

    /// Bulk insert of a history page, which the server lists newest first.
    /// Returns how many messages were new.
    ///
    /// The page is reversed before a stable sort by `created_at`, so records
    /// sharing a timestamp end up oldest first like the rest of the
    /// transcript.
    pub fn extend<I>(&mut self, messages: I) -> usize
    where
        I: IntoIterator<Item = ChannelMessage>,
    {
        let mut batch: Vec<ChannelMessage> = messages.into_iter().collect();
        batch.reverse();
        batch.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        let mut added = 0;
        for message in batch {
            if self.insert(message) {
                added += 1;
            }
        }
        added
    }

    /// Swaps in a new version of a message already in the transcript.
    /// Returns `false` when no entry has that id.
    pub fn replace(&mut self, message: ChannelMessage) -> bool {
        let Some(pos) = self.entries.iter().position(|m| m.id == message.id) else {
            return false;
        };
        if self.entries[pos].created_at == message.created_at {
            self.entries[pos] = message;
        } else {
            self.entries.remove(pos);
            let pos = self
                .entries
                .partition_point(|m| m.created_at <= message.created_at);
            self.entries.insert(pos, message);
        }
        true
    }

    /// Removes a message. Its id stays known, so a late redelivery of the
    /// same message does not bring it back.
    pub fn remove(&mut self, id: &str) -> Option<ChannelMessage> {
        let pos = self.entries.iter().position(|m| m.id == id)?;
        Some(self.entries.remove(pos))
    }

    /// Whether `id` has been seen, including removed messages.
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChannelMessage> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&ChannelMessage> {
        self.entries.last()
    }

    pub fn to_vec(&self) -> Vec<ChannelMessage> {
        self.entries.clone()
    }
}
