//! Local web panel: the chat UI, plus context-menu style triggers that stage
//! pending actions from the current page.

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::response::sse::{Event, Sse};
use axum::routing::{get, post};
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;

use crate::page::PageAgent;
use crate::pending::{PendingAction, PendingStore};
use crate::session::SessionEvent;

/// Menu entries that act on the current selection.
pub const SELECTION_ACTIONS: [&str; 4] = ["summary", "explain", "translate", "rewrite"];

impl SessionEvent {
    fn to_sse_event(&self) -> Event {
        match self {
            SessionEvent::User(text) => Event::default()
                .event("user")
                .data(serde_json::json!({ "text": text }).to_string()),
            SessionEvent::Assistant(text) => Event::default()
                .event("assistant")
                .data(serde_json::json!({ "text": text }).to_string()),
            SessionEvent::Notice(text) => Event::default()
                .event("notice")
                .data(serde_json::json!({ "text": text }).to_string()),
            SessionEvent::Complete(Some(text)) => Event::default()
                .event("complete")
                .data(serde_json::json!({ "text": text }).to_string()),
            SessionEvent::Complete(None) => Event::default().event("failed").data("{}"),
        }
    }
}

#[derive(Clone)]
pub struct PanelState {
    pub prompt_tx: mpsc::Sender<String>,
    pub events: broadcast::Sender<SessionEvent>,
    pub pending: Arc<PendingStore>,
    pub agent: Arc<dyn PageAgent>,
}

#[derive(Deserialize)]
struct PromptPayload {
    prompt: String,
}

pub fn router(state: PanelState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/prompt", post(prompt_handler))
        .route("/actions/{kind}", post(action_handler))
        .route("/events", get(sse_handler))
        .route(
            "/favicon.ico",
            get(|| async { StatusCode::NO_CONTENT }),
        )
        .with_state(Arc::new(state))
}

/// Serve the panel on the first free port in 3000..3010. Returns the port.
pub async fn start_server(state: PanelState) -> anyhow::Result<u16> {
    let app = router(state);

    let mut bound = None;
    for port in 3000..3010 {
        if let Ok(listener) = tokio::net::TcpListener::bind(("127.0.0.1", port)).await {
            bound = Some((listener, port));
            break;
        }
    }
    let (listener, port) = bound
        .ok_or_else(|| anyhow::anyhow!("no free port in 3000-3009; is another pagemind running?"))?;

    tracing::info!("panel running at http://localhost:{}", port);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "panel server stopped");
        }
    });

    Ok(port)
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn prompt_handler(
    State(state): State<Arc<PanelState>>,
    Json(payload): Json<PromptPayload>,
) -> Result<&'static str, (StatusCode, String)> {
    tracing::debug!(prompt = %payload.prompt, "POST /prompt");
    state
        .prompt_tx
        .send(payload.prompt)
        .await
        .map_err(|_| (StatusCode::SERVICE_UNAVAILABLE, "chat host is not running".to_string()))?;
    Ok("ok")
}

/// Stage a pending action from the page, the way a context-menu click would.
async fn action_handler(
    State(state): State<Arc<PanelState>>,
    Path(kind): Path<String>,
) -> Result<&'static str, (StatusCode, String)> {
    let unavailable = |e: anyhow::Error| (StatusCode::BAD_GATEWAY, format!("{e:#}"));

    let action = if kind == "read_page" {
        PendingAction::read_page(state.agent.get_content().await.map_err(unavailable)?)
    } else if SELECTION_ACTIONS.contains(&kind.as_str()) {
        let text = state.agent.selected_text().await.map_err(unavailable)?;
        if text.trim().is_empty() {
            return Err((StatusCode::BAD_REQUEST, "no text selected".to_string()));
        }
        PendingAction::new(kind, text)
    } else {
        return Err((StatusCode::NOT_FOUND, format!("unknown action '{kind}'")));
    };

    state
        .pending
        .stage(&action)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok("staged")
}

async fn sse_handler(
    State(state): State<Arc<PanelState>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let rx = state.events.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(event) => Some(Ok::<_, Infallible>(event.to_sse_event())),
        Err(_) => None,
    });
    Sse::new(stream)
}

const INDEX_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<title>pagemind</title>
<style>
  body { margin: 0; background: #0f1115; color: #e0e0e0; font-family: system-ui, sans-serif;
         height: 100vh; display: flex; flex-direction: column; }
  #menu { padding: 8px 12px; border-bottom: 1px solid #222; display: flex; gap: 6px; flex-wrap: wrap; }
  #messages { flex: 1; overflow-y: auto; padding: 12px; display: flex; flex-direction: column; gap: 8px; }
  .message { padding: 8px 12px; border-radius: 8px; white-space: pre-wrap; line-height: 1.4; }
  .user { background: #1e2a44; align-self: flex-end; }
  .assistant { background: #1a1a1f; }
  .notice { background: #14201a; font-family: monospace; font-size: 13px; }
  form { display: flex; gap: 8px; padding: 12px; border-top: 1px solid #222; }
  textarea { flex: 1; background: #16181d; color: inherit; border: 1px solid #333; border-radius: 6px; padding: 8px; }
  button { background: #3b5bdb; color: white; border: 0; border-radius: 6px; padding: 6px 12px; cursor: pointer; }
</style>
</head>
<body>
<div id="menu">
  <button data-action="summary">Summarize</button>
  <button data-action="explain">Explain</button>
  <button data-action="translate">Translate to Vietnamese</button>
  <button data-action="rewrite">Rewrite</button>
  <button data-action="read_page">Read Entire Page</button>
</div>
<div id="messages"></div>
<form id="form">
  <textarea id="prompt" rows="3" placeholder="Ask about this page..."></textarea>
  <button type="submit">Send</button>
</form>
<script>
  const messages = document.getElementById('messages');
  const input = document.getElementById('prompt');
  let current = null;

  const append = (role, text) => {
    const div = document.createElement('div');
    div.className = 'message ' + role;
    div.textContent = text;
    messages.appendChild(div);
    messages.scrollTop = messages.scrollHeight;
    return div;
  };

  const events = new EventSource('/events');
  events.addEventListener('user', e => {
    append('user', JSON.parse(e.data).text);
    current = append('assistant', '...');
  });
  events.addEventListener('assistant', e => {
    if (!current) current = append('assistant', '');
    current.textContent = JSON.parse(e.data).text;
    messages.scrollTop = messages.scrollHeight;
  });
  events.addEventListener('notice', e => append('notice', JSON.parse(e.data).text));
  events.addEventListener('complete', () => { current = null; });
  events.addEventListener('failed', () => { current = null; });

  document.getElementById('form').addEventListener('submit', async e => {
    e.preventDefault();
    const prompt = input.value.trim();
    if (!prompt) return;
    input.value = '';
    await fetch('/prompt', {
      method: 'POST',
      headers: { 'Content-Type': 'application/json' },
      body: JSON.stringify({ prompt })
    });
  });
  input.addEventListener('keydown', e => {
    if (e.key === 'Enter' && !e.shiftKey) {
      e.preventDefault();
      document.getElementById('form').requestSubmit();
    }
  });
  document.querySelectorAll('#menu button').forEach(b => b.addEventListener('click', async () => {
    const res = await fetch('/actions/' + b.dataset.action, { method: 'POST' });
    if (!res.ok) append('notice', '❌ ' + await res.text());
  }));
</script>
</body>
</html>
"##;
