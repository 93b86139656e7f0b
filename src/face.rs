//! HTTP front: the chat page, a health check and the per-connection WebSocket.

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::{Html, Response};
use axum::routing::get;
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::brain::Brain;
use crate::config::SessionSettings;
use crate::hands::BrowserLauncher;
use crate::session::Session;
use crate::types::{InboundMessage, ServerEvent};

/// Outbound events buffered per connection before the loop waits on the socket.
const EVENT_BUFFER: usize = 64;

/// Shared by every connection; each one still gets its own [`Session`].
pub struct AppState {
    pub brain: Arc<dyn Brain>,
    pub launcher: Arc<dyn BrowserLauncher>,
    pub settings: SessionSettings,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route(
            "/favicon.ico",
            get(|| async { axum::http::StatusCode::NO_CONTENT }),
        )
        .with_state(state)
}

async fn index_handler() -> Html<&'static str> {
    debug!("GET /");
    Html(INDEX_HTML)
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({ "status": "ok", "model": state.brain.name() }))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Drive one connection: read user messages in order, run each through the
/// session, and forward its events through a writer task.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    info!("WebSocket connection accepted");
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<ServerEvent>(EVENT_BUFFER);

    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    error!(error = %e, "failed to encode event");
                    continue;
                }
            };
            if let Err(e) = sink.send(Message::Text(text.into())).await {
                debug!(error = %e, "client went away");
                break;
            }
        }
        let _ = sink.close().await;
    });

    let mut session = Session::new(
        Arc::clone(&state.brain),
        Arc::clone(&state.launcher),
        state.settings.clone(),
    );

    while let Some(frame) = stream.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                warn!(error = %e, "WebSocket receive failed");
                let _ = tx
                    .send(ServerEvent::Error {
                        message: e.to_string(),
                    })
                    .await;
                break;
            }
        };

        let inbound: InboundMessage = match serde_json::from_str(text.as_str()) {
            Ok(inbound) => inbound,
            Err(e) => {
                let event = ServerEvent::Error {
                    message: format!("Invalid message: {e}"),
                };
                if tx.send(event).await.is_err() {
                    break;
                }
                continue;
            }
        };
        let message = inbound.message.trim();
        if message.is_empty() {
            continue;
        }

        info!(text = %message, "user message");
        if let Err(e) = session.handle_message(message, &tx).await {
            info!(error = %e, "connection lost during task");
            break;
        }
    }

    session.shutdown().await;
    drop(tx);
    let _ = writer.await;
    info!("WebSocket disconnected");
}

const INDEX_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>Browser Control Agent</title>
<style>
  * { margin: 0; padding: 0; box-sizing: border-box; }
  body {
    background: #0a0a0f;
    color: #e0e0e0;
    font-family: 'Segoe UI', system-ui, -apple-system, sans-serif;
    height: 100vh;
    display: flex;
    flex-direction: column;
  }
  header {
    padding: 20px 32px;
    border-bottom: 1px solid #1a1a2e;
    display: flex;
    align-items: center;
    gap: 12px;
  }
  header h1 { font-size: 20px; font-weight: 600; color: #fff; }
  header .dot { width: 8px; height: 8px; border-radius: 50%; background: #ef4444; }
  header .dot.online { background: #22c55e; }
  header .dot.busy { background: #f59e0b; }
  .main { flex: 1; display: flex; gap: 16px; padding: 16px 32px; overflow: hidden; }
  .chat { flex: 1; display: flex; flex-direction: column; gap: 12px; min-width: 320px; }
  #log { flex: 1; overflow-y: auto; display: flex; flex-direction: column; gap: 8px; }
  .entry { padding: 10px 14px; border-radius: 8px; font-size: 14px; line-height: 1.5; }
  .entry.user { background: #1a1a2e; border-left: 3px solid #6366f1; }
  .entry.bot { background: #111118; border-left: 3px solid #3b82f6; }
  .entry.step { background: #111118; border-left: 3px solid #f59e0b; font-family: 'Fira Code', monospace; font-size: 13px; }
  .entry.ok { background: #0a1a0a; border-left: 3px solid #22c55e; color: #86efac; }
  .entry.error { background: #1a0a0a; border-left: 3px solid #ef4444; color: #fca5a5; }
  .viewer { flex: 1.4; display: flex; flex-direction: column; gap: 8px; }
  #page-info { font-size: 13px; color: #888; white-space: nowrap; overflow: hidden; text-overflow: ellipsis; }
  #shot { width: 100%; border-radius: 8px; border: 1px solid #222; background: #111; min-height: 200px; object-fit: contain; }
  .input-area { display: flex; gap: 8px; }
  #cmd {
    flex: 1; background: #111118; border: 1px solid #222; border-radius: 8px;
    padding: 12px 16px; color: #fff; font-size: 16px; outline: none;
  }
  #cmd:focus { border-color: #6366f1; }
  #cmd:disabled { opacity: 0.5; }
  button {
    background: #6366f1; color: #fff; border: none; border-radius: 8px;
    padding: 12px 24px; font-size: 15px; font-weight: 600; cursor: pointer;
  }
  button:disabled { background: #333; cursor: not-allowed; }
</style>
</head>
<body>
  <header>
    <div class="dot" id="status-dot"></div>
    <h1>Browser Control Agent</h1>
  </header>
  <div class="main">
    <div class="chat">
      <div id="log"></div>
      <div class="input-area">
        <input type="text" id="cmd" placeholder="Tell the agent what to do..." autofocus />
        <button id="send">Send</button>
      </div>
    </div>
    <div class="viewer">
      <div id="page-info">No page yet</div>
      <img id="shot" alt="" />
    </div>
  </div>
<script>
  const log = document.getElementById('log');
  const cmd = document.getElementById('cmd');
  const sendBtn = document.getElementById('send');
  const dot = document.getElementById('status-dot');
  const shot = document.getElementById('shot');
  const pageInfo = document.getElementById('page-info');
  let ws;

  const esc = s => String(s ?? '').replace(/&/g, '&amp;').replace(/</g, '&lt;');

  function addEntry(cls, html) {
    const div = document.createElement('div');
    div.className = 'entry ' + cls;
    div.innerHTML = html;
    log.appendChild(div);
    log.scrollTop = log.scrollHeight;
  }

  function setBusy(b) {
    cmd.disabled = b;
    sendBtn.disabled = b;
    dot.className = 'dot ' + (b ? 'busy' : 'online');
    if (!b) cmd.focus();
  }

  function showPage(d) {
    if (d.screenshot) shot.src = 'data:image/png;base64,' + d.screenshot;
    if (d.url) pageInfo.textContent = (d.title ? d.title + ' | ' : '') + d.url;
  }

  function connect() {
    ws = new WebSocket((location.protocol === 'https:' ? 'wss://' : 'ws://') + location.host + '/ws');
    ws.onopen = () => { dot.className = 'dot online'; };
    ws.onclose = () => {
      dot.className = 'dot';
      setTimeout(connect, 2000);
    };
    ws.onmessage = e => {
      const { type, data } = JSON.parse(e.data);
      if (type === 'response') {
        let html = esc(data.response);
        if (data.missing_info && data.missing_info.length) {
          html += '<br><small>Missing: ' + data.missing_info.map(esc).join(', ') + '</small>';
        }
        addEntry(data.status === 'error' ? 'error' : 'bot', html);
        showPage(data);
        if (data.status !== 'in_progress') setBusy(false);
      } else if (type === 'analysis') {
        const a = data.analysis;
        addEntry('step', esc(a.action) + ': ' + esc(a.description));
        showPage(data);
        if (a.status !== 'continue') {
          addEntry(a.status === 'complete' ? 'ok' : 'error', a.status === 'complete' ? 'Task complete.' : 'Task stopped.');
          setBusy(false);
        }
      } else if (type === 'action_result') {
        addEntry(data.success ? 'ok' : 'error', esc(data.description));
        showPage(data);
        if (!data.success) setBusy(false);
      } else if (type === 'error') {
        addEntry('error', '<strong>Error:</strong> ' + esc(data.message));
        setBusy(false);
      }
    };
  }

  function send() {
    const text = cmd.value.trim();
    if (!text || !ws || ws.readyState !== WebSocket.OPEN) return;
    cmd.value = '';
    addEntry('user', '<strong>You:</strong> ' + esc(text));
    setBusy(true);
    ws.send(JSON.stringify({ message: text }));
  }

  sendBtn.addEventListener('click', send);
  cmd.addEventListener('keydown', e => { if (e.key === 'Enter') send(); });
  connect();
  addEntry('bot', 'Tell me what to do in the browser.');
</script>
</body>
</html>
"##;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_page_speaks_the_event_protocol() {
        for event_type in ["'response'", "'analysis'", "'action_result'", "'error'"] {
            assert!(INDEX_HTML.contains(event_type), "missing handler for {event_type}");
        }
        assert!(INDEX_HTML.contains("/ws"));
    }
}
