use std::convert::Infallible;
use std::sync::Arc;

use anyhow::{Context, Result};
use autoapply::ProgressEvent;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Html;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};

/// Queued job URLs waiting for the browser worker.
const QUEUE_DEPTH: usize = 32;
const EVENT_BUFFER: usize = 256;

fn to_sse_event(event: &ProgressEvent) -> Event {
    let value = serde_json::to_value(event).unwrap_or_else(|_| json!({}));
    let name = value
        .get("event")
        .and_then(|v| v.as_str())
        .unwrap_or("progress")
        .to_string();
    Event::default().event(name).data(value.to_string())
}

#[derive(Clone)]
pub struct AppState {
    pub job_tx: mpsc::Sender<String>,
    pub event_tx: broadcast::Sender<ProgressEvent>,
}

#[derive(Deserialize)]
struct ApplyPayload {
    url: String,
}

/// Start the progress feed on `127.0.0.1:<port>`, trying the next nine ports
/// when it is taken. Returns the job queue and the event sender.
pub async fn start_server(
    port: u16,
) -> Result<(mpsc::Receiver<String>, broadcast::Sender<ProgressEvent>)> {
    let (job_tx, job_rx) = mpsc::channel::<String>(QUEUE_DEPTH);
    let (event_tx, _) = broadcast::channel::<ProgressEvent>(EVENT_BUFFER);

    let state = Arc::new(AppState {
        job_tx,
        event_tx: event_tx.clone(),
    });

    let app = Router::new()
        .route("/", get(index_handler))
        .route("/apply", post(apply_handler))
        .route("/events", get(sse_handler))
        .route("/favicon.ico", get(|| async { StatusCode::NO_CONTENT }))
        .with_state(state);

    let mut bound = None;
    for p in port..port.saturating_add(10) {
        if let Ok(listener) = tokio::net::TcpListener::bind(("127.0.0.1", p)).await {
            bound = Some((listener, p));
            break;
        }
    }
    let (listener, port) = bound.with_context(|| {
        format!("could not bind any port in {port}..{}", port.saturating_add(10))
    })?;

    info!("progress feed at http://localhost:{port}");

    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            warn!(error = %err, "progress feed stopped");
        }
    });

    Ok((job_rx, event_tx))
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn apply_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ApplyPayload>,
) -> (StatusCode, Json<serde_json::Value>) {
    let url = payload.url.trim().to_string();
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "url must be http(s)"})),
        );
    }
    info!(%url, "queued");
    match state.job_tx.try_send(url.clone()) {
        Ok(()) => (StatusCode::ACCEPTED, Json(json!({"queued": url}))),
        Err(mpsc::error::TrySendError::Full(_)) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": "queue full"})),
        ),
        Err(mpsc::error::TrySendError::Closed(_)) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": "worker stopped"})),
        ),
    }
}

async fn sse_handler(
    State(state): State<Arc<AppState>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let rx = state.event_tx.subscribe();
    // Lagged receivers just skip what they missed.
    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(event) => Some(Ok::<_, Infallible>(to_sse_event(&event))),
        Err(_) => None,
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

const INDEX_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<title>autoapply</title>
<style>
  body { background: #0a0a0f; color: #e0e0e0; font-family: system-ui, sans-serif; max-width: 800px; margin: 0 auto; padding: 24px; }
  #log { display: flex; flex-direction: column; gap: 6px; margin-bottom: 16px; }
  .entry { padding: 8px 12px; border-radius: 6px; background: #111118; border-left: 3px solid #3b82f6; font-size: 14px; }
  .entry.bad { border-left-color: #ef4444; color: #fca5a5; }
  .entry.good { border-left-color: #22c55e; color: #86efac; }
  form { display: flex; gap: 8px; }
  input { flex: 1; background: #111118; border: 1px solid #222; border-radius: 6px; padding: 10px; color: #fff; }
  button { background: #6366f1; color: #fff; border: none; border-radius: 6px; padding: 10px 20px; cursor: pointer; }
</style>
</head>
<body>
  <h1>autoapply</h1>
  <div id="log"></div>
  <form onsubmit="apply(event)">
    <input id="url" placeholder="https://boards.greenhouse.io/..." autofocus />
    <button>Apply</button>
  </form>
<script>
  const log = document.getElementById('log');
  const esc = s => String(s).replace(/</g, '&lt;');
  function add(cls, text) {
    const div = document.createElement('div');
    div.className = 'entry ' + cls;
    div.innerHTML = esc(text);
    log.appendChild(div);
  }
  async function apply(e) {
    e.preventDefault();
    const input = document.getElementById('url');
    const url = input.value.trim();
    if (!url) return;
    input.value = '';
    await fetch('/apply', {
      method: 'POST',
      headers: {'Content-Type': 'application/json'},
      body: JSON.stringify({url}),
    });
  }
  const es = new EventSource('/events');
  es.addEventListener('started', e => add('', 'Started ' + JSON.parse(e.data).url));
  es.addEventListener('classified', e => add('', 'Landing page: ' + JSON.parse(e.data).kind));
  es.addEventListener('page_started', e => {
    const d = JSON.parse(e.data);
    add('', 'Page ' + d.number + ' (' + d.elements + ' elements) ' + d.url);
  });
  es.addEventListener('plan_ready', e => {
    const d = JSON.parse(e.data);
    add('', d.source + ': ' + d.actions + ' actions');
  });
  es.addEventListener('action_failed', e => {
    const d = JSON.parse(e.data);
    add('bad', d.action + ' failed: ' + d.message);
  });
  es.addEventListener('popup_followed', e => add('', 'Followed popup ' + JSON.parse(e.data).url));
  es.addEventListener('finished', e => {
    const r = JSON.parse(e.data).result;
    add(r.status === 'success' ? 'good' : 'bad', r.status + ': ' + r.message);
  });
</script>
</body>
</html>
"##;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_events_keep_their_tag() {
        let value = serde_json::to_value(ProgressEvent::Advanced {
            url: "https://x.example/2".into(),
        })
        .unwrap();
        assert_eq!(value["event"], "advanced");
        // Building the SSE event must not panic on any variant.
        let _ = to_sse_event(&ProgressEvent::Classified { kind: "easy_apply".into() });
    }
}
