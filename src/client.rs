//! Interactive terminal client: one WebSocket, one room, stdin in, colored
//! lines out.
//!
//! State handling is the same [`RoomView`] the tests drive: typed lines are
//! echoed locally and sent as add frames; inbound frames fold through the
//! reconciliation rules, and only what actually changed gets printed.

use crate::protocol::{ChatMessage, Envelope, Role};
use crate::reconcile::Applied;
use crate::RoomView;
use colored::*;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::warn;

/// `ws://host:port` + room → the URL the hub listens on.
fn ws_endpoint(base: &str, room: &str) -> String {
    format!("{}/ws/{}", base.trim_end_matches('/'), room)
}

async fn prompt_name(
    lines: &mut Lines<BufReader<Stdin>>,
) -> Result<String, Box<dyn std::error::Error>> {
    loop {
        eprint!("{}", "  Pick a name to join: ".bright_blue());
        match lines.next_line().await? {
            Some(line) if !line.trim().is_empty() => return Ok(line.trim().to_string()),
            Some(_) => continue,
            None => return Err("stdin closed before a name was given".into()),
        }
    }
}

fn print_message(message: &ChatMessage, own: bool) {
    let who = if own {
        format!("{:>12}", message.user).bright_green()
    } else {
        match message.role {
            Role::Assistant => format!("{:>12}", message.user).bright_magenta(),
            Role::User => format!("{:>12}", message.user).bright_blue(),
        }
    };
    println!("{} {} {}", who, "│".bright_black(), message.content);
}

/// Fold an inbound envelope into the view and print what changed.
fn render(view: &mut RoomView, envelope: Envelope) {
    let applied = view.apply(envelope.clone());
    match applied {
        Applied::Appended => {
            if let Some(message) = view.messages().last() {
                // Usually a peer's message; our own only when a resync wiped
                // the optimistic row before the echo landed.
                print_message(message, view.issued(&message.id));
            }
        }
        // The hub echoing our own add back; the row is already on screen.
        Applied::Replaced => {}
        Applied::Updated => {
            if let Envelope::Update(message) = &envelope {
                println!(
                    "{} {} {} {}",
                    format!("{:>12}", message.user).bright_yellow(),
                    "│".bright_black(),
                    message.content,
                    "(edited)".bright_black()
                );
            }
        }
        Applied::Ignored => {}
        Applied::Synced(count) => {
            println!(
                "{}",
                format!("  ── in sync, {} message(s) ──", count).bright_black()
            );
            for message in view.messages() {
                print_message(message, view.issued(&message.id));
            }
        }
    }
}

/// Connect to `base_url` (e.g. `ws://127.0.0.1:8888`), join `room`, and chat
/// until the connection drops, stdin closes, or the user types `/quit`.
pub async fn run(
    base_url: &str,
    room: &str,
    name: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let name = match name {
        Some(n) if !n.trim().is_empty() => n.trim().to_string(),
        _ => prompt_name(&mut lines).await?,
    };

    let endpoint = ws_endpoint(base_url, room);
    let (ws_stream, _) = connect_async(&endpoint).await?;
    let (mut ws_sink, mut ws_stream) = ws_stream.split();

    let mut view = RoomView::new(room, &name);

    eprintln!(
        "{}",
        format!("  Joined room '{}' as {}", view.room(), view.user()).bright_green()
    );
    eprintln!("{}", "  Type to chat. /quit leaves.".bright_blue());

    loop {
        tokio::select! {
            // Frame from the hub.
            frame = ws_stream.next() => {
                match frame {
                    Some(Ok(WsMessage::Text(text))) => match Envelope::decode(&text) {
                        Ok(envelope) => render(&mut view, envelope),
                        Err(e) => warn!(error = %e, room = %room, "dropping undecodable frame"),
                    },
                    Some(Ok(WsMessage::Close(_))) | None => {
                        eprintln!("{}", "  Connection closed by server.".bright_red());
                        break;
                    }
                    Some(Ok(_)) => {} // Ignore binary / ping / pong frames
                    Some(Err(e)) => {
                        eprintln!("{}", format!("  Connection error: {}", e).bright_red());
                        break;
                    }
                }
            }

            // Line typed by the user.
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim() == "/quit" {
                    break;
                }
                if let Some(frame) = view.submit(&line) {
                    if let Envelope::Add(message) = &frame {
                        print_message(message, true);
                    }
                    if let Ok(text) = serde_json::to_string(&frame) {
                        ws_sink.send(WsMessage::Text(text)).await?;
                    }
                }
            }
        }
    }

    let _ = ws_sink.send(WsMessage::Close(None)).await;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
