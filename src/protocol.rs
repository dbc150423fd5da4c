//! Wire protocol: chat messages and the envelopes that carry them.
//!
//! ## Design
//! - Every frame on the wire is a JSON object discriminated by a `"type"` tag
//! - `add` and `update` carry one message with its fields inlined
//! - `sync` carries the coordinator's full ordered message list and replaces
//!   local state wholesale; `all` is accepted as a legacy spelling on decode
//! - The tag set is closed: anything else is an [`EnvelopeError`], never a
//!   silent fall-through to the sync path
//!
//! Decoding classifies failures so the boundary layer can log and skip a bad
//! frame without tearing down the session.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Who authored a message. The composer only ever produces `User`;
/// `Assistant` exists for coordinator-injected bot messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// One chat message. Identity is `id`; every other field is replaced
/// wholesale when an update for the same id arrives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub content: String,
    pub user: String,
    pub role: Role,
}

impl ChatMessage {
    pub fn new(
        id: impl Into<String>,
        content: impl Into<String>,
        user: impl Into<String>,
        role: Role,
    ) -> Self {
        ChatMessage {
            id: id.into(),
            content: content.into(),
            user: user.into(),
            role,
        }
    }
}

/// A wire event. Serializes to the tagged JSON shapes described above.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Envelope {
    /// Insert a new message, or replace the one already shown for this id
    /// (the coordinator's echo of an optimistic local send).
    Add(ChatMessage),
    /// Replace the fields of an existing message. Never inserts.
    Update(ChatMessage),
    /// Full authoritative state; adopted verbatim, order included.
    Sync { messages: Vec<ChatMessage> },
}

/// Why an inbound frame was rejected before reaching the reconciliation
/// engine. All variants are fatal to that single frame only.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// The frame is not parseable JSON.
    #[error("unparseable envelope: {0}")]
    Parse(#[source] serde_json::Error),

    /// The frame parsed but has no string `"type"` tag.
    #[error("envelope has no string `type` tag")]
    MissingKind,

    /// The tag matches none of `add` / `update` / `sync` (or `all`).
    #[error("unknown envelope kind `{0}`")]
    UnknownKind(String),

    /// A sync frame without a `messages` list. Adopting this as empty state
    /// would silently wipe the room, so it is surfaced instead.
    #[error("sync envelope is missing the `messages` list")]
    MissingMessages,

    /// The tag was recognized but the payload fields do not deserialize.
    #[error("{kind} envelope with invalid fields: {source}")]
    BadPayload {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl Envelope {
    /// Decode one text frame.
    ///
    /// Dispatches on the `"type"` tag the same way the coordinator does, but
    /// with a closed tag set: unrecognized kinds are an error rather than an
    /// implicit sync.
    pub fn decode(text: &str) -> Result<Envelope, EnvelopeError> {
        let value: Value = serde_json::from_str(text).map_err(EnvelopeError::Parse)?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(EnvelopeError::MissingKind)?
            .to_string();

        match kind.as_str() {
            "add" => serde_json::from_value(value)
                .map(Envelope::Add)
                .map_err(|source| EnvelopeError::BadPayload { kind: "add", source }),
            "update" => serde_json::from_value(value)
                .map(Envelope::Update)
                .map_err(|source| EnvelopeError::BadPayload { kind: "update", source }),
            // "all" is what the original coordinator called its full-state
            // frame; we emit "sync" but keep reading both.
            "sync" | "all" => match value.get("messages") {
                None | Some(Value::Null) => Err(EnvelopeError::MissingMessages),
                Some(list) => serde_json::from_value(list.clone())
                    .map(|messages| Envelope::Sync { messages })
                    .map_err(|source| EnvelopeError::BadPayload { kind: "sync", source }),
            },
            _ => Err(EnvelopeError::UnknownKind(kind)),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
