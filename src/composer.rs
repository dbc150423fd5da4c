//! Builds outgoing messages for the local participant.

use crate::protocol::{ChatMessage, Role};
use rand::Rng;
use std::collections::HashSet;

const ID_LEN: usize = 8;
const ID_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// A short random message id, 8 alphanumeric chars.
pub fn fresh_id() -> String {
    let mut rng = rand::thread_rng();
    (0..ID_LEN)
        .map(|_| {
            let idx = rng.gen_range(0..ID_CHARSET.len());
            ID_CHARSET[idx] as char
        })
        .collect()
}

/// Turns typed text into [`ChatMessage`]s attributed to one user, stamping
/// each with a fresh id. Ids issued by this composer are remembered so a
/// collision inside the session regenerates instead of shipping a duplicate.
#[derive(Debug)]
pub struct Composer {
    user: String,
    issued: HashSet<String>,
}

impl Composer {
    pub fn new(user: impl Into<String>) -> Self {
        Composer {
            user: user.into(),
            issued: HashSet::new(),
        }
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    /// Build a message from raw input. Whitespace-only input produces
    /// nothing; anything else ships exactly as typed, whitespace included.
    pub fn compose(&mut self, text: &str) -> Option<ChatMessage> {
        if text.trim().is_empty() {
            return None;
        }
        let mut id = fresh_id();
        while !self.issued.insert(id.clone()) {
            id = fresh_id();
        }
        Some(ChatMessage::new(id, text, self.user.clone(), Role::User))
    }

    /// Whether this composer stamped the given id (i.e. the message
    /// originated here and an inbound add for it is our own echo).
    pub fn issued(&self, id: &str) -> bool {
        self.issued.contains(id)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_id_length_and_charset() {
        for _ in 0..50 {
            let id = fresh_id();
            assert_eq!(id.len(), ID_LEN);
            assert!(id.bytes().all(|b| ID_CHARSET.contains(&b)));
        }
    }

    #[test]
    fn test_compose_stamps_user_and_role() {
        let mut composer = Composer::new("alice");
        let m = composer.compose("hello there").unwrap();
        assert_eq!(m.user, "alice");
        assert_eq!(m.role, Role::User);
        assert_eq!(m.content, "hello there");
    }

    #[test]
    fn test_compose_ships_content_verbatim() {
        // Trimming is only the emptiness check; what the user typed is what
        // goes on the wire, padding and all.
        let mut composer = Composer::new("alice");
        let m = composer.compose("  hi  \n").unwrap();
        assert_eq!(m.content, "  hi  \n");
    }

    #[test]
    fn test_compose_rejects_empty_and_blank() {
        let mut composer = Composer::new("alice");
        assert!(composer.compose("").is_none());
        assert!(composer.compose("   ").is_none());
        assert!(composer.compose("\t\n").is_none());
    }

    #[test]
    fn test_compose_issues_distinct_ids() {
        let mut composer = Composer::new("alice");
        let mut seen = HashSet::new();
        for _ in 0..100 {
            let m = composer.compose("x").unwrap();
            assert!(seen.insert(m.id), "duplicate id issued");
        }
    }

    #[test]
    fn test_issued_tracks_only_own_ids() {
        let mut composer = Composer::new("alice");
        let m = composer.compose("mine").unwrap();
        assert!(composer.issued(&m.id));
        assert!(!composer.issued("somebody-elses"));
    }
}
