//! # Partyline
//!
//! A small room-based chat core with the coordinator and terminal client
//! built around it.
//!
//! Everything hangs off a three-verb wire protocol (`add`, `update`, `sync`)
//! and one reconciliation rule set that both sides of the wire share:
//!
//! - [`protocol`]: message and envelope types, JSON encoding, frame decoding
//! - [`store`]: the ordered per-room message list
//! - [`reconcile`]: folds envelopes into a store
//! - [`composer`]: stamps outgoing messages with fresh ids
//! - [`hub`]: the coordinator with rooms, fan-out, authoritative state
//! - [`web`]: HTTP front door and WebSocket upgrade for the hub
//! - [`client`]: interactive terminal client
//! - [`cli`]: command-line argument surface
//!
//! [`RoomView`] glues store and composer together for one participant's view
//! of one room; the terminal client and the tests both drive it.

pub mod cli;
pub mod client;
pub mod composer;
pub mod hub;
pub mod protocol;
pub mod reconcile;
pub mod store;
pub mod web;

use composer::Composer;
use protocol::{ChatMessage, Envelope};
use reconcile::Applied;
use store::MessageStore;

/// One participant's live view of one room: the reconciled message list plus
/// the composer that stamps their outgoing messages.
///
/// The flow is optimistic: [`submit`](RoomView::submit) appends the message
/// locally and hands back the frame to transmit; when the coordinator echoes
/// it, [`apply`](RoomView::apply) collapses the echo into the row already
/// present instead of duplicating it.
#[derive(Debug)]
pub struct RoomView {
    room: String,
    store: MessageStore,
    composer: Composer,
}

impl RoomView {
    pub fn new(room: impl Into<String>, user: impl Into<String>) -> Self {
        RoomView {
            room: room.into(),
            store: MessageStore::new(),
            composer: Composer::new(user),
        }
    }

    pub fn room(&self) -> &str {
        &self.room
    }

    pub fn user(&self) -> &str {
        self.composer.user()
    }

    /// Messages in presentation order.
    pub fn messages(&self) -> &[ChatMessage] {
        self.store.messages()
    }

    /// Whether a message id was stamped by this view's composer, i.e. an
    /// inbound frame carrying it is our own send coming back.
    pub fn issued(&self, id: &str) -> bool {
        self.composer.issued(id)
    }

    /// Fold one inbound envelope into the view.
    pub fn apply(&mut self, envelope: Envelope) -> Applied {
        reconcile::apply(&mut self.store, envelope)
    }

    /// Compose from typed input, echo it locally, and return the add frame
    /// to send. Blank input changes nothing and returns `None`.
    pub fn submit(&mut self, text: &str) -> Option<Envelope> {
        let message = self.composer.compose(text)?;
        self.store.append(message.clone());
        Some(Envelope::Add(message))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
