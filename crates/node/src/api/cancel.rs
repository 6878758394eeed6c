//! `POST /api/cancel` (`spec.md` §6.1): post a cancellation signal to a
//! running session on this node.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use swarm_domain::session::SessionKey;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CancelRequestBody {
    pub app_name: String,
    pub user_id: String,
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct CancelResponseBody {
    pub status: &'static str,
}

pub async fn cancel_handler(State(state): State<AppState>, Json(body): Json<CancelRequestBody>) -> Json<CancelResponseBody> {
    let key = SessionKey::new(body.app_name, body.user_id, body.session_id);
    let posted = state.cancel_map.post(&key.as_db_key());
    swarm_domain::trace::TraceEvent::CancellationPosted { session_key: key.as_db_key() }.emit();
    Json(CancelResponseBody {
        status: if posted { "success" } else { "error" },
    })
}
