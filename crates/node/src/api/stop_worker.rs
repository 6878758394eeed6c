//! `POST /api/stop_worker` (`spec.md` §4.5 cancellation propagation, §6):
//! the explicit stop-worker call a leader must make to cancel a peer's
//! in-flight sub-task — a cancelled leader session has no deterministic
//! effect on the peer it dispatched to otherwise.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StopWorkerRequestBody {
    pub worker_port: u16,
    pub worker_session_id: String,
    pub app_name: String,
    pub user_id: String,
}

#[derive(Debug, Serialize)]
pub struct StopWorkerResponseBody {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub async fn stop_worker_handler(
    State(state): State<AppState>,
    Json(body): Json<StopWorkerRequestBody>,
) -> Json<StopWorkerResponseBody> {
    let peer = match state.registry.get(body.worker_port) {
        Ok(Some(peer)) => peer,
        Ok(None) => {
            return Json(StopWorkerResponseBody {
                status: "error",
                error: Some(format!("no peer registered at port {}", body.worker_port)),
            })
        }
        Err(e) => {
            return Json(StopWorkerResponseBody {
                status: "error",
                error: Some(e.to_string()),
            })
        }
    };

    let request_body = serde_json::json!({
        "app_name": body.app_name,
        "user_id": body.user_id,
        "session_id": body.worker_session_id,
    });

    match state
        .http_client
        .post(format!("{}/api/cancel", peer.url))
        .json(&request_body)
        .send()
        .await
    {
        Ok(resp) if resp.status().is_success() => Json(StopWorkerResponseBody { status: "success", error: None }),
        Ok(resp) => Json(StopWorkerResponseBody {
            status: "error",
            error: Some(format!("worker returned HTTP {}", resp.status())),
        }),
        Err(e) => Json(StopWorkerResponseBody {
            status: "error",
            error: Some(e.to_string()),
        }),
    }
}
