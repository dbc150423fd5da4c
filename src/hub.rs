//! The coordinator: authoritative room state and WebSocket fan-out.
//!
//! ## Design
//! - HubStore: Arc<Mutex<HashMap<String, Room>>> — shared across all connections
//! - Each Room holds the authoritative message list plus a broadcast channel
//!   (tokio::sync::broadcast) for real-time fan-out
//! - Each WS client subscribes to the room's broadcast sender on join
//! - Rooms come into being when the first participant connects and keep their
//!   history for the life of the process
//!
//! ## Connection lifecycle
//! 1. Client connects to WS /ws/ROOM → room is created on demand
//! 2. Hub sends a sync frame carrying the room's current history
//! 3. Client add/update frames fold into the authoritative store; the
//!    canonical envelope is then re-broadcast to every subscriber, the sender
//!    included (the sender's copy collapses its optimistic echo)
//! 4. Sync frames from clients are ignored: only the hub issues state

use crate::protocol::{ChatMessage, Envelope};
use crate::reconcile::{self, Applied};
use crate::store::MessageStore;
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

/// Shared hub state: room name → Room.
pub type HubStore = Arc<Mutex<HashMap<String, Room>>>;

/// Fan-out queue depth per room. A receiver further behind than this lags
/// and loses the overwritten frames.
const BROADCAST_CAPACITY: usize = 256;

/// One chat room: the authoritative message list and its fan-out channel.
pub struct Room {
    pub name: String,
    pub messages: MessageStore,
    pub connections: usize,
    pub created_at_ms: u64,
    /// Broadcast sender — clone to get a Receiver for a new subscriber.
    pub broadcast_tx: broadcast::Sender<Envelope>,
}

// ---------------------------------------------------------------------------
// Constructor helpers
// ---------------------------------------------------------------------------

/// Create a new empty HubStore.
pub fn new_hub_store() -> HubStore {
    Arc::new(Mutex::new(HashMap::new()))
}

/// Current Unix epoch in milliseconds.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Room operations
// ---------------------------------------------------------------------------

/// Register a participant in `name`, creating the room if it does not exist
/// yet.
///
/// Returns the room's current history (for the sync-on-join frame) and a
/// receiver subscribed to its broadcast channel.
pub fn join_room(
    store: &HubStore,
    name: &str,
) -> Result<(Vec<ChatMessage>, broadcast::Receiver<Envelope>), String> {
    let mut guard = store
        .lock()
        .map_err(|_| "internal: lock poisoned".to_string())?;

    let room = guard.entry(name.to_string()).or_insert_with(|| {
        let (tx, _rx) = broadcast::channel(BROADCAST_CAPACITY);
        info!(room = %name, "room created");
        Room {
            name: name.to_string(),
            messages: MessageStore::new(),
            connections: 0,
            created_at_ms: now_ms(),
            broadcast_tx: tx,
        }
    });

    room.connections += 1;
    let history = room.messages.to_vec();
    let rx = room.broadcast_tx.subscribe();

    Ok((history, rx))
}

/// Drop one participant from a room. Returns the remaining connection count,
/// or `None` if the room was never created. The room and its history stay.
pub fn leave_room(store: &HubStore, name: &str) -> Option<usize> {
    let mut guard = store.lock().ok()?;
    let room = guard.get_mut(name)?;
    room.connections = room.connections.saturating_sub(1);
    Some(room.connections)
}

/// Fold `envelope` into the room's authoritative state and, when it changed
/// anything, re-broadcast the canonical envelope to every subscriber.
///
/// Returns what the fold did, or `None` if the room does not exist.
pub fn apply_and_broadcast(store: &HubStore, name: &str, envelope: Envelope) -> Option<Applied> {
    let mut guard = store.lock().ok()?;
    let room = guard.get_mut(name)?;
    let applied = reconcile::apply(&mut room.messages, envelope.clone());
    if applied != Applied::Ignored {
        let _ = room.broadcast_tx.send(envelope);
    }
    Some(applied)
}

/// Snapshot a room's history, or `None` if the room does not exist.
pub fn room_snapshot(store: &HubStore, name: &str) -> Option<Vec<ChatMessage>> {
    let guard = store.lock().ok()?;
    guard.get(name).map(|room| room.messages.to_vec())
}

/// The room's vitals as a JSON value, for the info endpoint. `Null` when the
/// room does not exist.
pub fn room_info(store: &HubStore, name: &str) -> serde_json::Value {
    if let Ok(guard) = store.lock() {
        if let Some(room) = guard.get(name) {
            return serde_json::json!({
                "room": room.name,
                "connections": room.connections,
                "messages": room.messages.len(),
                "created_at_ms": room.created_at_ms,
            });
        }
    }
    serde_json::Value::Null
}

// ---------------------------------------------------------------------------
// WebSocket handler
// ---------------------------------------------------------------------------

/// Handle an established WebSocket connection for room `room`.
///
/// `ws_stream` — the tokio-tungstenite WebSocketStream
/// `store`     — the shared hub state
/// `room`      — the room name from the URL path
pub async fn handle_ws(
    ws_stream: tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    store: HubStore,
    room: String,
) {
    let conn = uuid::Uuid::new_v4();

    let (history, mut room_rx) = match join_room(&store, &room) {
        Ok(pair) => pair,
        Err(err) => {
            warn!(error = %err, room = %room, "join failed");
            return;
        }
    };
    info!(conn = %conn, room = %room, history = history.len(), "participant joined");

    let (mut ws_sink, mut ws_stream) = ws_stream.split();

    // The joiner starts from the authoritative history, whatever their local
    // state believes.
    let sync = Envelope::Sync { messages: history };
    if let Ok(text) = serde_json::to_string(&sync) {
        if ws_sink.send(WsMessage::Text(text)).await.is_err() {
            finish(&store, &room, conn);
            return;
        }
    }

    // Main loop: multiplex incoming WS frames and room broadcasts.
    loop {
        tokio::select! {
            // Frame from this client.
            msg = ws_stream.next() => {
                match msg {
                    Some(Ok(WsMessage::Text(text))) => {
                        let envelope = match Envelope::decode(&text) {
                            Ok(env) => env,
                            Err(e) => {
                                warn!(error = %e, conn = %conn, room = %room, "dropping undecodable frame");
                                continue;
                            }
                        };
                        if matches!(envelope, Envelope::Sync { .. }) {
                            // Only the hub issues state; honoring this would
                            // let one participant rewrite the whole room.
                            warn!(conn = %conn, room = %room, "sync frame from client ignored");
                            continue;
                        }
                        if let Some(applied) = apply_and_broadcast(&store, &room, envelope) {
                            debug!(conn = %conn, room = %room, ?applied, "frame applied");
                        }
                    }
                    Some(Ok(_)) => {} // Ignore binary / ping / pong frames
                    Some(Err(_)) | None => break, // Connection closed or error
                }
            }

            // Broadcast from the room channel.
            bcast = room_rx.recv() => {
                match bcast {
                    Ok(envelope) => {
                        if let Ok(text) = serde_json::to_string(&envelope) {
                            if ws_sink.send(WsMessage::Text(text)).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // Missed frames are gone; a reconnect starts over from sync.
                        warn!(conn = %conn, room = %room, skipped, "broadcast receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    finish(&store, &room, conn);
}

fn finish(store: &HubStore, room: &str, conn: uuid::Uuid) {
    if let Some(remaining) = leave_room(store, room) {
        info!(conn = %conn, room = %room, remaining, "participant left");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Role;

    fn msg(id: &str, content: &str) -> ChatMessage {
        ChatMessage::new(id, content, "bob", Role::User)
    }

    // -- now_ms --------------------------------------------------------------

    #[test]
    fn test_now_ms_nonzero() {
        assert!(now_ms() > 0);
    }

    #[test]
    fn test_now_ms_monotonic() {
        let t1 = now_ms();
        let t2 = now_ms();
        assert!(t2 >= t1, "now_ms() must be non-decreasing");
    }

    // -- new_hub_store / join_room -------------------------------------------

    #[test]
    fn test_new_hub_store_is_empty() {
        let store = new_hub_store();
        assert!(store.lock().unwrap().is_empty());
    }

    #[test]
    fn test_join_creates_room_on_demand() {
        let store = new_hub_store();
        join_room(&store, "lobby").unwrap();
        assert!(store.lock().unwrap().contains_key("lobby"));
    }

    #[test]
    fn test_join_same_room_twice_keeps_one_room() {
        let store = new_hub_store();
        join_room(&store, "lobby").unwrap();
        join_room(&store, "lobby").unwrap();
        let guard = store.lock().unwrap();
        assert_eq!(guard.len(), 1);
        assert_eq!(guard.get("lobby").unwrap().connections, 2);
    }

    #[test]
    fn test_join_fresh_room_has_empty_history() {
        let store = new_hub_store();
        let (history, _rx) = join_room(&store, "lobby").unwrap();
        assert!(history.is_empty());
    }

    #[test]
    fn test_join_returns_existing_history() {
        let store = new_hub_store();
        join_room(&store, "lobby").unwrap();
        apply_and_broadcast(&store, "lobby", Envelope::Add(msg("m1", "hello"))).unwrap();
        let (history, _rx) = join_room(&store, "lobby").unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, "m1");
    }

    #[test]
    fn test_distinct_rooms_do_not_share_state() {
        let store = new_hub_store();
        join_room(&store, "one").unwrap();
        join_room(&store, "two").unwrap();
        apply_and_broadcast(&store, "one", Envelope::Add(msg("m1", "hi"))).unwrap();
        assert_eq!(room_snapshot(&store, "one").unwrap().len(), 1);
        assert!(room_snapshot(&store, "two").unwrap().is_empty());
    }

    // -- leave_room ----------------------------------------------------------

    #[test]
    fn test_leave_decrements_connections() {
        let store = new_hub_store();
        join_room(&store, "lobby").unwrap();
        join_room(&store, "lobby").unwrap();
        assert_eq!(leave_room(&store, "lobby"), Some(1));
        assert_eq!(leave_room(&store, "lobby"), Some(0));
    }

    #[test]
    fn test_leave_keeps_room_and_history() {
        let store = new_hub_store();
        join_room(&store, "lobby").unwrap();
        apply_and_broadcast(&store, "lobby", Envelope::Add(msg("m1", "hi"))).unwrap();
        leave_room(&store, "lobby");
        assert_eq!(room_snapshot(&store, "lobby").unwrap().len(), 1);
    }

    #[test]
    fn test_leave_unknown_room_returns_none() {
        let store = new_hub_store();
        assert_eq!(leave_room(&store, "nowhere"), None);
    }

    #[test]
    fn test_leave_at_zero_saturates() {
        let store = new_hub_store();
        join_room(&store, "lobby").unwrap();
        leave_room(&store, "lobby");
        assert_eq!(leave_room(&store, "lobby"), Some(0));
    }

    // -- apply_and_broadcast -------------------------------------------------

    #[test]
    fn test_apply_add_reaches_subscribers() {
        let store = new_hub_store();
        let (_, mut rx) = join_room(&store, "lobby").unwrap();
        let applied =
            apply_and_broadcast(&store, "lobby", Envelope::Add(msg("m1", "hello"))).unwrap();
        assert_eq!(applied, Applied::Appended);
        let received = rx.try_recv().expect("expected broadcast frame");
        assert_eq!(received, Envelope::Add(msg("m1", "hello")));
    }

    #[test]
    fn test_apply_echo_add_replaces_and_still_broadcasts() {
        let store = new_hub_store();
        join_room(&store, "lobby").unwrap();
        apply_and_broadcast(&store, "lobby", Envelope::Add(msg("m1", "hello"))).unwrap();

        let (_, mut rx) = join_room(&store, "lobby").unwrap();
        let applied =
            apply_and_broadcast(&store, "lobby", Envelope::Add(msg("m1", "hello again"))).unwrap();
        assert_eq!(applied, Applied::Replaced);
        assert!(rx.try_recv().is_ok());
        assert_eq!(room_snapshot(&store, "lobby").unwrap().len(), 1);
    }

    #[test]
    fn test_apply_update_for_unknown_id_is_not_broadcast() {
        let store = new_hub_store();
        let (_, mut rx) = join_room(&store, "lobby").unwrap();
        let applied =
            apply_and_broadcast(&store, "lobby", Envelope::Update(msg("ghost", "boo"))).unwrap();
        assert_eq!(applied, Applied::Ignored);
        assert!(rx.try_recv().is_err(), "ignored frame must not fan out");
    }

    #[test]
    fn test_apply_update_known_id_broadcasts_edit() {
        let store = new_hub_store();
        join_room(&store, "lobby").unwrap();
        apply_and_broadcast(&store, "lobby", Envelope::Add(msg("m1", "hello"))).unwrap();

        let (_, mut rx) = join_room(&store, "lobby").unwrap();
        let applied =
            apply_and_broadcast(&store, "lobby", Envelope::Update(msg("m1", "edited"))).unwrap();
        assert_eq!(applied, Applied::Updated);
        assert_eq!(rx.try_recv().unwrap(), Envelope::Update(msg("m1", "edited")));
        assert_eq!(room_snapshot(&store, "lobby").unwrap()[0].content, "edited");
    }

    #[test]
    fn test_apply_to_nonexistent_room_returns_none() {
        let store = new_hub_store();
        assert!(apply_and_broadcast(&store, "nowhere", Envelope::Add(msg("m1", "x"))).is_none());
    }

    #[test]
    fn test_apply_keeps_arrival_order() {
        let store = new_hub_store();
        join_room(&store, "lobby").unwrap();
        apply_and_broadcast(&store, "lobby", Envelope::Add(msg("a", "1"))).unwrap();
        apply_and_broadcast(&store, "lobby", Envelope::Add(msg("b", "2"))).unwrap();
        apply_and_broadcast(&store, "lobby", Envelope::Update(msg("a", "1 edited"))).unwrap();
        let snapshot = room_snapshot(&store, "lobby").unwrap();
        let ids: Vec<&str> = snapshot.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
    }

    // -- room_snapshot / room_info -------------------------------------------

    #[test]
    fn test_room_snapshot_unknown_room_is_none() {
        let store = new_hub_store();
        assert!(room_snapshot(&store, "nowhere").is_none());
    }

    #[test]
    fn test_room_created_at_is_plausible() {
        let store = new_hub_store();
        join_room(&store, "lobby").unwrap();
        let guard = store.lock().unwrap();
        // Must be after 2024-01-01 in milliseconds
        assert!(guard.get("lobby").unwrap().created_at_ms > 1_704_067_200_000);
    }

    #[test]
    fn test_room_info_reports_vitals() {
        let store = new_hub_store();
        let (_, _rx) = join_room(&store, "lobby").unwrap();
        apply_and_broadcast(&store, "lobby", Envelope::Add(msg("m1", "hello"))).unwrap();
        apply_and_broadcast(&store, "lobby", Envelope::Add(msg("m2", "there"))).unwrap();

        let info = room_info(&store, "lobby");
        assert_eq!(info["room"], "lobby");
        assert_eq!(info["connections"], 1);
        assert_eq!(info["messages"], 2);
        assert!(info["created_at_ms"].as_u64().unwrap() > 1_704_067_200_000);
    }

    #[test]
    fn test_room_info_tracks_leaves() {
        let store = new_hub_store();
        join_room(&store, "lobby").unwrap();
        join_room(&store, "lobby").unwrap();
        leave_room(&store, "lobby");
        assert_eq!(room_info(&store, "lobby")["connections"], 1);
    }

    #[test]
    fn test_room_info_unknown_room_is_null() {
        let store = new_hub_store();
        assert!(room_info(&store, "nowhere").is_null());
    }
}
