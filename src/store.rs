//! Ordered message store for one room.
//!
//! Backing storage is a plain `Vec` in arrival order. Rooms stay small enough
//! that linear id scans beat the bookkeeping of an index map, and order
//! preservation falls out for free: replacing a message never moves it.

use crate::protocol::ChatMessage;

/// The message list one participant (or the coordinator) holds for a room.
///
/// Invariant: ids are unique. All mutation goes through [`replace`],
/// [`replace_all`], or an [`append`] guarded by a [`find`] miss, so the
/// invariant is maintained by the callers in `reconcile` and `hub`.
///
/// [`replace`]: MessageStore::replace
/// [`replace_all`]: MessageStore::replace_all
/// [`append`]: MessageStore::append
/// [`find`]: MessageStore::find
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageStore {
    messages: Vec<ChatMessage>,
}

impl MessageStore {
    pub fn new() -> Self {
        MessageStore::default()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Messages in presentation order (oldest first).
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Position of the message with this id, if present.
    pub fn find(&self, id: &str) -> Option<usize> {
        self.messages.iter().position(|m| m.id == id)
    }

    /// Append at the end. Callers check [`find`](MessageStore::find) first;
    /// appending a duplicate id would break the uniqueness invariant.
    pub fn append(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// Replace the stored message with the same id, keeping its position.
    /// Returns false (and stores nothing) when the id is absent.
    pub fn replace(&mut self, message: ChatMessage) -> bool {
        match self.find(&message.id) {
            Some(pos) => {
                self.messages[pos] = message;
                true
            }
            None => false,
        }
    }

    /// Drop everything and adopt `messages` as-is, order included.
    pub fn replace_all(&mut self, messages: Vec<ChatMessage>) {
        self.messages = messages;
    }

    /// Snapshot for handing to a sync frame.
    pub fn to_vec(&self) -> Vec<ChatMessage> {
        self.messages.clone()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
