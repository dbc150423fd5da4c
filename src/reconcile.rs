//! Reconciliation: fold one decoded envelope into a message store.
//!
//! The whole protocol reduces to three moves:
//!
//! | envelope | id present           | id absent  |
//! |----------|----------------------|------------|
//! | add      | replace in place     | append     |
//! | update   | replace in place     | drop       |
//! | sync     | replace everything   | replace everything |
//!
//! Add replacing-in-place is what collapses the coordinator's echo of an
//! optimistic local send into the row already on screen, so applying the same
//! add twice is indistinguishable from applying it once.

use crate::protocol::Envelope;
use crate::store::MessageStore;
use tracing::debug;

/// What [`apply`] did to the store. Useful for logging and for deciding
/// whether a UI needs repainting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// Add with a new id: message appended at the end.
    Appended,
    /// Add with a known id: stored fields replaced in place.
    Replaced,
    /// Update with a known id: stored fields replaced in place.
    Updated,
    /// Update with an unknown id: dropped without touching the store.
    Ignored,
    /// Sync: store replaced wholesale; carries the new message count.
    Synced(usize),
}

/// Fold `envelope` into `store` per the table above.
pub fn apply(store: &mut MessageStore, envelope: Envelope) -> Applied {
    match envelope {
        Envelope::Add(message) => {
            if store.replace(message.clone()) {
                Applied::Replaced
            } else {
                store.append(message);
                Applied::Appended
            }
        }
        Envelope::Update(message) => {
            if store.replace(message.clone()) {
                Applied::Updated
            } else {
                // A peer raced an edit against a sync that dropped the row,
                // or the frame was simply stale. Not worth more than a trace.
                debug!(id = %message.id, "update for unknown id dropped");
                Applied::Ignored
            }
        }
        Envelope::Sync { messages } => {
            let count = messages.len();
            store.replace_all(messages);
            Applied::Synced(count)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
