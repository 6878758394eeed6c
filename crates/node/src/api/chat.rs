//! `POST /api/chat` (`spec.md` §6.1, §6.2): executes one user turn and
//! streams NDJSON chunks back — one `{"chunk": <chunk>}` JSON object per
//! line, via `axum::body::Body::from_stream` over a hand-rolled
//! `async_stream::stream!` producer. Deliberately not SSE: there is no
//! need for event names or reconnection semantics here, just a lazy
//! sequence of JSON lines a client reads until EOF.

use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use swarm_domain::chunk::ChunkEnvelope;
use swarm_domain::session::SessionKey;

use crate::runtime::turn;
use crate::state::AppState;

const URGENT_PREFIX: &str = "[URGENT_INTERRUPT] ";
const PREEMPTION_POLL_INTERVAL: Duration = Duration::from_millis(100);
const PREEMPTION_POLL_ATTEMPTS: u32 = 20; // ~2 seconds, spec.md §6.2

#[derive(Debug, Deserialize)]
pub struct ChatRequestBody {
    pub message: String,
    pub app_name: String,
    pub user_id: String,
    pub session_id: String,
}

#[derive(Debug, Serialize)]
struct BusyResponse {
    status: &'static str,
    current_task: Option<String>,
    running_time_seconds: u64,
    suggestion: &'static str,
}

pub async fn chat_handler(State(state): State<AppState>, Json(body): Json<ChatRequestBody>) -> Response {
    let is_urgent = body.message.starts_with(URGENT_PREFIX);
    // Open Question resolved (spec.md §9): the marker is stripped before
    // the message reaches the model — it's a transport-level signal to
    // this endpoint, not conversational content.
    let message_for_model = if is_urgent {
        body.message[URGENT_PREFIX.len()..].to_string()
    } else {
        body.message.clone()
    };

    let session_key = SessionKey::new(body.app_name, body.user_id, body.session_id);
    let db_key = session_key.as_db_key();
    let task_preview: String = message_for_model.chars().take(80).collect();

    let guard = if is_urgent {
        acquire_with_preemption(&state, db_key.clone(), task_preview).await
    } else {
        state.busy_lock.try_acquire(db_key.clone(), task_preview)
    };

    let Some(guard) = guard else {
        return busy_response(&state);
    };

    let cancel = state.cancel_map.register(&db_key);
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    let state_for_task = state.clone();
    let db_key_for_task = db_key.clone();
    tokio::spawn(async move {
        let _guard = guard; // released when this task finishes, whatever the outcome
        let cancel_map = state_for_task.cancel_map.clone();
        turn::run_turn(state_for_task, session_key, message_for_model, cancel, tx).await;
        cancel_map.remove(&db_key_for_task);
    });

    let stream = async_stream::stream! {
        while let Some(chunk) = rx.recv().await {
            let env: ChunkEnvelope = chunk.into();
            match serde_json::to_vec(&env) {
                Ok(mut line) => {
                    line.push(b'\n');
                    yield Ok::<_, std::io::Error>(axum::body::Bytes::from(line));
                }
                Err(_) => continue,
            }
        }
    };

    Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "application/x-ndjson")
        .body(Body::from_stream(stream))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// Urgent preemption protocol (`spec.md` §6.2): post `CANCEL` to whatever
/// session currently holds the lock, then poll for up to ~2 seconds before
/// giving up.
async fn acquire_with_preemption(
    state: &AppState,
    db_key: String,
    task_preview: String,
) -> Option<crate::runtime::busy_lock::BusyGuard> {
    if let Some(guard) = state.busy_lock.try_acquire(db_key.clone(), task_preview.clone()) {
        return Some(guard);
    }
    if let Some(held) = state.busy_lock.peek() {
        state.cancel_map.post(&held.session_key);
    }
    for _ in 0..PREEMPTION_POLL_ATTEMPTS {
        tokio::time::sleep(PREEMPTION_POLL_INTERVAL).await;
        if let Some(guard) = state.busy_lock.try_acquire(db_key.clone(), task_preview.clone()) {
            return Some(guard);
        }
    }
    None
}

fn busy_response(state: &AppState) -> Response {
    let held = state.busy_lock.peek();
    let body = BusyResponse {
        status: "busy",
        current_task: held.as_ref().map(|h| h.task_preview.clone()),
        running_time_seconds: held.as_ref().map(|h| h.running_time_seconds()).unwrap_or(0),
        suggestion: "retry with the [URGENT_INTERRUPT] prefix to preempt the current task, or wait",
    };
    (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
}
