//! Session management endpoints (`spec.md` §6.1): create, list, fetch
//! history, delete.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use swarm_domain::event::{Author, Part};
use swarm_domain::session::SessionKey;
use uuid::Uuid;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AppUserQuery {
    pub app_name: String,
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionBody {
    pub app_name: String,
    pub user_id: String,
}

#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub session_id: String,
    pub title: Option<String>,
}

pub async fn create_session(State(state): State<AppState>, Json(body): Json<CreateSessionBody>) -> Response {
    let session_id = Uuid::new_v4().to_string();
    let key = SessionKey::new(body.app_name, body.user_id, session_id.clone());
    match state.sessions.get_or_create(&key) {
        Ok(session) => Json(CreateSessionResponse {
            session_id,
            title: session.title,
        })
        .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

#[derive(Debug, Serialize)]
pub struct SessionSummaryBody {
    pub session_id: String,
    pub title: Option<String>,
    pub message_count: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize)]
pub struct ListSessionsResponse {
    pub sessions: Vec<SessionSummaryBody>,
}

pub async fn list_sessions(State(state): State<AppState>, Query(query): Query<AppUserQuery>) -> Response {
    match state.sessions.list(&query.app_name, &query.user_id) {
        Ok(summaries) => Json(ListSessionsResponse {
            sessions: summaries
                .into_iter()
                .map(|s| SessionSummaryBody {
                    session_id: s.session_id,
                    title: s.title,
                    message_count: s.message_count,
                    created_at: s.created_at,
                    updated_at: s.updated_at,
                })
                .collect(),
        })
        .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

#[derive(Debug, Serialize)]
pub struct HistoryMessage {
    pub role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocks: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub messages: Vec<HistoryMessage>,
}

pub async fn session_history(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<AppUserQuery>,
) -> Response {
    let key = SessionKey::new(query.app_name, query.user_id, session_id);
    match state.sessions.get(&key) {
        Ok(Some(session)) => {
            let messages = session
                .events
                .iter()
                .map(|event| {
                    let role = match event.author {
                        Author::User => "user",
                        Author::Model => "model",
                        Author::System => "system",
                    };
                    let texts: Vec<&str> = event.content.parts.iter().filter_map(Part::as_text).collect();
                    if texts.len() == 1 && event.content.parts.len() == 1 {
                        HistoryMessage {
                            role,
                            text: Some(texts[0].to_string()),
                            blocks: None,
                        }
                    } else {
                        HistoryMessage {
                            role,
                            text: None,
                            blocks: Some(serde_json::to_value(&event.content.parts).unwrap_or_default()),
                        }
                    }
                })
                .collect();
            Json(HistoryResponse { messages }).into_response()
        }
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<AppUserQuery>,
) -> Response {
    let key = SessionKey::new(query.app_name, query.user_id, session_id);
    match state.sessions.delete(&key) {
        Ok(true) => {
            swarm_domain::trace::TraceEvent::SessionDeleted { session_key: key.as_db_key() }.emit();
            StatusCode::OK.into_response()
        }
        Ok(false) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}
