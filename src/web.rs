//! HTTP front door for the hub: serves the chat page and upgrades `/ws/ROOM`
//! connections to WebSockets.
//!
//! One TcpListener handles both jobs. Each accepted connection is peeked for
//! a WebSocket upgrade first; everything else is parsed as plain HTTP and
//! routed by path:
//!
//! - `GET /`              → 302 to a freshly generated room
//! - `GET /ROOM`          → the embedded chat page (the page reads the room
//!   from its own URL and dials `/ws/ROOM`)
//! - `GET /api/room/ROOM` → room vitals as JSON, 404 for unknown rooms
//! - anything else        → 302 back to `/`
//!
//! Room names are only routed when they are 1–64 chars of `[A-Za-z0-9_-]`.

use crate::composer::fresh_id;
use crate::hub::{self, HubStore};
use colored::*;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::warn;

const MAX_ROOM_LEN: usize = 64;

/// Embedded single-page chat UI, served for every room URL.
pub const INDEX_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>partyline</title>
<style>
*{margin:0;padding:0;box-sizing:border-box}
body{background:#0d1117;color:#c9d1d9;font-family:'Cascadia Code','Fira Code',monospace;height:100vh;display:flex;flex-direction:column}
header{padding:12px 24px;border-bottom:1px solid #21262d;background:#161b22;display:flex;align-items:baseline;gap:12px}
header h1{font-size:1.05rem;color:#58a6ff}
#room-label{font-size:.8rem;color:#8b949e}
#status{margin-left:auto;font-size:.75rem;color:#8b949e}
#messages{flex:1;overflow-y:auto;padding:16px 24px}
.msg{display:flex;gap:12px;padding:5px 0;font-size:.9rem}
.msg .who{color:#58a6ff;font-weight:600;min-width:110px;text-align:right;flex-shrink:0}
.msg.assistant .who{color:#a371f7}
.msg .text{white-space:pre-wrap;word-break:break-word}
#send-form{display:flex;gap:8px;padding:12px 24px;border-top:1px solid #21262d;background:#161b22}
input{flex:1;background:#0d1117;border:1px solid #30363d;color:#c9d1d9;padding:8px 12px;border-radius:6px;font-family:inherit;font-size:.9rem}
input:focus{outline:none;border-color:#58a6ff}
button{background:#238636;color:#fff;border:none;border-radius:6px;padding:8px 16px;font-size:.9rem;font-family:inherit;cursor:pointer}
button:hover{background:#2ea043}
#gate{position:fixed;inset:0;background:rgba(1,4,9,.85);display:flex;align-items:center;justify-content:center}
#gate form{display:flex;flex-direction:column;gap:12px;width:280px;background:#161b22;border:1px solid #30363d;border-radius:8px;padding:24px}
#gate h2{font-size:.95rem;color:#c9d1d9}
</style>
</head>
<body>
<header>
  <h1>partyline</h1>
  <span id="room-label"></span>
  <span id="status">connecting&hellip;</span>
</header>
<div id="messages"></div>
<form id="send-form">
  <input id="send-input" placeholder="Type a message" autocomplete="off">
  <button type="submit">Send</button>
</form>
<div id="gate">
  <form id="name-form">
    <h2>Pick a name to join</h2>
    <input id="name-input" placeholder="Your name" autocomplete="off" autofocus>
    <button type="submit">Join</button>
  </form>
</div>
<script>
const $=s=>document.querySelector(s);
const room=location.pathname.replace(/^\//,'')||'lobby';
$('#room-label').textContent=room;

let ws=null, user=null, messages=[];

const ID_CHARS='ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789';
function freshId(){let id='';for(let i=0;i<8;i++)id+=ID_CHARS[Math.floor(Math.random()*ID_CHARS.length)];return id;}

function render(){
  const box=$('#messages');
  box.innerHTML='';
  for(const m of messages){
    const row=document.createElement('div');row.className='msg '+m.role;
    const who=document.createElement('div');who.className='who';who.textContent=m.user;
    const text=document.createElement('div');text.className='text';text.textContent=m.content;
    row.appendChild(who);row.appendChild(text);box.appendChild(row);
  }
  box.scrollTop=box.scrollHeight;
}

/* Same three-verb reconciliation the terminal client runs: add inserts or
   replaces by id, update replaces only when present, sync adopts wholesale. */
function onFrame(m){
  switch(m.type){
    case 'add':{
      const msg={id:m.id,content:m.content,user:m.user,role:m.role};
      const i=messages.findIndex(x=>x.id===msg.id);
      if(i===-1)messages.push(msg);else messages[i]=msg;
      break;
    }
    case 'update':{
      const msg={id:m.id,content:m.content,user:m.user,role:m.role};
      const i=messages.findIndex(x=>x.id===msg.id);
      if(i!==-1)messages[i]=msg;
      break;
    }
    case 'sync':
      messages=m.messages; break;
    default:
      return;
  }
  render();
}

function connect(){
  const proto=location.protocol==='https:'?'wss':'ws';
  ws=new WebSocket(proto+'://'+location.host+'/ws/'+room);
  ws.onopen=()=>{$('#status').textContent='connected';};
  ws.onclose=()=>{$('#status').textContent='disconnected, retrying';setTimeout(connect,1000);};
  ws.onmessage=e=>{try{onFrame(JSON.parse(e.data));}catch(_){}};
}

$('#name-form').addEventListener('submit',e=>{
  e.preventDefault();
  const name=$('#name-input').value.trim();
  if(!name)return;
  user=name;
  $('#gate').style.display='none';
  $('#send-input').focus();
});

$('#send-form').addEventListener('submit',e=>{
  e.preventDefault();
  if(!user||!ws||ws.readyState!==WebSocket.OPEN)return;
  const content=$('#send-input').value;
  if(!content.trim())return;
  const m={id:freshId(),content:content,user:user,role:'user'};
  messages.push(m);render();
  ws.send(JSON.stringify({type:'add',id:m.id,content:m.content,user:m.user,role:m.role}));
  $('#send-input').value='';
});

connect();
</script>
</body>
</html>
"##;

/// Whether `name` is routable as a room: 1–64 chars of `[A-Za-z0-9_-]`.
pub fn is_valid_room(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_ROOM_LEN
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// Start the chat server and open the browser on a fresh room.
pub async fn serve(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind(format!("127.0.0.1:{}", port)).await?;

    eprintln!(
        "{}",
        format!("  partyline running at http://localhost:{}", port).bright_green()
    );
    eprintln!("{}", "  Press Ctrl+C to stop.".bright_blue());

    // Try to open the browser
    #[cfg(target_os = "windows")]
    {
        let _ = std::process::Command::new("cmd")
            .args(["/C", &format!("start http://localhost:{}", port)])
            .spawn();
    }
    #[cfg(target_os = "macos")]
    {
        let _ = std::process::Command::new("open")
            .arg(format!("http://localhost:{}", port))
            .spawn();
    }
    #[cfg(target_os = "linux")]
    {
        let _ = std::process::Command::new("xdg-open")
            .arg(format!("http://localhost:{}", port))
            .spawn();
    }

    let store = hub::new_hub_store();
    serve_on(listener, store).await
}

/// Accept loop over an already-bound listener. Split out so tests can bind an
/// ephemeral port and share the store with the server.
pub async fn serve_on(
    listener: TcpListener,
    store: HubStore,
) -> Result<(), Box<dyn std::error::Error>> {
    loop {
        let (stream, addr) = listener.accept().await?;
        let store = store.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, store).await {
                warn!(error = %e, peer = %addr, "connection failed");
            }
        });
    }
}

async fn handle_connection(
    mut stream: tokio::net::TcpStream,
    store: HubStore,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Peek at the first bytes to detect WebSocket upgrade requests.
    let mut peek_buf = [0u8; 1024];
    let peek_n = stream.peek(&mut peek_buf).await.unwrap_or(0);
    let peek_str = String::from_utf8_lossy(&peek_buf[..peek_n]);
    let peek_first_line = peek_str.lines().next().unwrap_or("").to_string();

    if peek_str.contains("Upgrade: websocket") || peek_str.contains("upgrade: websocket") {
        let ws_path = peek_first_line
            .split_whitespace()
            .nth(1)
            .unwrap_or("/")
            .to_string();
        let room = ws_path.strip_prefix("/ws/").unwrap_or("");
        if !is_valid_room(room) {
            let response =
                "HTTP/1.1 404 Not Found\r\nContent-Length: 9\r\nConnection: close\r\n\r\nNot Found";
            stream.write_all(response.as_bytes()).await?;
            return Ok(());
        }
        let room = room.to_string();
        match tokio_tungstenite::accept_async(stream).await {
            Ok(ws_stream) => {
                hub::handle_ws(ws_stream, store, room).await;
            }
            Err(e) => {
                warn!(error = %e, room = %room, "WS handshake failed");
            }
        }
        return Ok(());
    }

    let mut buf = vec![0u8; 8192];
    let n = stream.read(&mut buf).await?;

    let mut headers = [httparse::EMPTY_HEADER; 32];
    let mut req = httparse::Request::new(&mut headers);
    if req.parse(&buf[..n]).is_err() {
        let response =
            "HTTP/1.1 400 Bad Request\r\nContent-Length: 11\r\nConnection: close\r\n\r\nBad Request";
        stream.write_all(response.as_bytes()).await?;
        return Ok(());
    }

    let path_and_query = req.path.unwrap_or("/");
    let path = path_and_query
        .split('?')
        .next()
        .unwrap_or(path_and_query)
        .to_string();

    match path.as_str() {
        "/" => {
            // No room in the URL: mint one and send the browser there.
            let response = format!(
                "HTTP/1.1 302 Found\r\nLocation: /{}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                fresh_id()
            );
            stream.write_all(response.as_bytes()).await?;
        }
        path if path.starts_with("/api/room/") => {
            let name = &path["/api/room/".len()..];
            let info = hub::room_info(&store, name);
            if info.is_null() {
                let response =
                    "HTTP/1.1 404 Not Found\r\nContent-Length: 9\r\nConnection: close\r\n\r\nNot Found";
                stream.write_all(response.as_bytes()).await?;
            } else {
                let body = info.to_string();
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                stream.write_all(response.as_bytes()).await?;
            }
        }
        path if is_valid_room(path.strip_prefix('/').unwrap_or(path)) => {
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                INDEX_HTML.len(),
                INDEX_HTML,
            );
            stream.write_all(response.as_bytes()).await?;
        }
        _ => {
            let response =
                "HTTP/1.1 302 Found\r\nLocation: /\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";
            stream.write_all(response.as_bytes()).await?;
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // -- is_valid_room -------------------------------------------------------

    #[test]
    fn test_valid_room_names() {
        assert!(is_valid_room("lobby"));
        assert!(is_valid_room("a"));
        assert!(is_valid_room("Team-42"));
        assert!(is_valid_room("deep_thought"));
        assert!(is_valid_room("Xy9-_Z"));
    }

    #[test]
    fn test_invalid_room_names() {
        assert!(!is_valid_room(""));
        assert!(!is_valid_room("has space"));
        assert!(!is_valid_room("slash/inside"));
        assert!(!is_valid_room("dot.dot"));
        assert!(!is_valid_room("quer?y"));
        assert!(!is_valid_room("ümläut"));
    }

    #[test]
    fn test_room_name_length_cap() {
        let at_cap = "r".repeat(MAX_ROOM_LEN);
        let over_cap = "r".repeat(MAX_ROOM_LEN + 1);
        assert!(is_valid_room(&at_cap));
        assert!(!is_valid_room(&over_cap));
    }

    // -- INDEX_HTML structure ------------------------------------------------

    #[test]
    fn test_index_html_is_complete_page() {
        assert!(INDEX_HTML.starts_with("<!DOCTYPE html>"));
        assert!(INDEX_HTML.contains("</html>"));
    }

    #[test]
    fn test_index_html_dials_room_socket() {
        assert!(INDEX_HTML.contains("/ws/"));
        assert!(INDEX_HTML.contains("WebSocket"));
    }

    #[test]
    fn test_index_html_speaks_the_protocol() {
        assert!(INDEX_HTML.contains("'add'"));
        assert!(INDEX_HTML.contains("'update'"));
        assert!(INDEX_HTML.contains("'sync'"));
    }

    #[test]
    fn test_index_html_has_name_gate_and_send_form() {
        assert!(INDEX_HTML.contains("name-form"));
        assert!(INDEX_HTML.contains("send-form"));
        assert!(INDEX_HTML.contains("id=\"messages\""));
    }

    #[test]
    fn test_index_html_sends_input_verbatim() {
        // trim() guards the blank check only; the shipped content is the
        // field value as typed.
        assert!(INDEX_HTML.contains("const content=$('#send-input').value;"));
        assert!(INDEX_HTML.contains("if(!content.trim())return;"));
    }

    #[test]
    fn test_index_html_dark_palette() {
        assert!(INDEX_HTML.contains("#0d1117"));
        assert!(INDEX_HTML.contains("#161b22"));
    }
}
