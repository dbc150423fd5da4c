use crate::composer::fresh_id;
use crate::web::is_valid_room;
use clap::Parser;

#[derive(Parser)]
#[command(name = "partyline")]
#[command(version = "0.2.0")]
#[command(about = "Room-based real-time chat over WebSockets")]
pub struct Args {
    /// Room to join (a fresh one is generated when omitted)
    pub room: Option<String>,

    /// Display name; prompted for interactively when omitted
    #[arg(long, short)]
    pub name: Option<String>,

    /// Server base URL for client mode
    #[arg(long, default_value = "ws://127.0.0.1:8888")]
    pub url: String,

    /// Run the coordinator instead of the terminal client
    #[arg(long)]
    pub serve: bool,

    /// Port the coordinator listens on
    #[arg(long, default_value = "8888")]
    pub port: u16,
}

/// The room to use: the one given on the command line when it is routable,
/// a freshly generated id when none was given.
pub fn resolve_room(room: Option<&str>) -> Result<String, String> {
    match room {
        Some(r) if is_valid_room(r) => Ok(r.to_string()),
        Some(r) => Err(format!(
            "room '{}' is not usable: 1-64 chars of letters, digits, '-' or '_'",
            r
        )),
        None => Ok(fresh_id()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parse_minimal() {
        let args = Args::parse_from(["partyline"]);
        assert!(args.room.is_none());
        assert!(args.name.is_none());
        assert_eq!(args.url, "ws://127.0.0.1:8888");
        assert!(!args.serve);
        assert_eq!(args.port, 8888);
    }

    #[test]
    fn test_args_parse_room_positional() {
        let args = Args::parse_from(["partyline", "lobby"]);
        assert_eq!(args.room.as_deref(), Some("lobby"));
    }

    #[test]
    fn test_args_parse_name_long() {
        let args = Args::parse_from(["partyline", "lobby", "--name", "alice"]);
        assert_eq!(args.name.as_deref(), Some("alice"));
    }

    #[test]
    fn test_args_parse_name_short() {
        let args = Args::parse_from(["partyline", "lobby", "-n", "alice"]);
        assert_eq!(args.name.as_deref(), Some("alice"));
    }

    #[test]
    fn test_args_parse_custom_url() {
        let args = Args::parse_from(["partyline", "lobby", "--url", "ws://10.0.0.5:9000"]);
        assert_eq!(args.url, "ws://10.0.0.5:9000");
    }

    #[test]
    fn test_args_parse_serve_flag() {
        let args = Args::parse_from(["partyline", "--serve"]);
        assert!(args.serve);
    }

    #[test]
    fn test_args_parse_serve_with_port() {
        let args = Args::parse_from(["partyline", "--serve", "--port", "9000"]);
        assert!(args.serve);
        assert_eq!(args.port, 9000);
    }

    #[test]
    fn test_args_default_port() {
        let args = Args::parse_from(["partyline"]);
        assert_eq!(args.port, 8888);
    }

    // -- resolve_room --------------------------------------------------------

    #[test]
    fn test_resolve_room_keeps_valid_name() {
        assert_eq!(resolve_room(Some("Team-42")).unwrap(), "Team-42");
    }

    #[test]
    fn test_resolve_room_rejects_invalid_name() {
        let err = resolve_room(Some("no/slashes")).unwrap_err();
        assert!(err.contains("no/slashes"), "error should name the room: {}", err);
    }

    #[test]
    fn test_resolve_room_generates_when_omitted() {
        let room = resolve_room(None).unwrap();
        assert_eq!(room.len(), 8);
        assert!(is_valid_room(&room));
    }

    #[test]
    fn test_resolve_room_generated_ids_vary() {
        let a = resolve_room(None).unwrap();
        let b = resolve_room(None).unwrap();
        // 62^8 possibilities; two draws colliding would be remarkable.
        assert_ne!(a, b);
    }
}
