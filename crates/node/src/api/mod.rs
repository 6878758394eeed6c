pub mod cancel;
pub mod chat;
pub mod sessions;
pub mod stop_worker;

use axum::http::HeaderValue;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Assembles the HTTP surface (`spec.md` §6.1). Mirrors the teacher's
/// `api::router(state)` pattern, minus dashboard static-file serving and
/// the rate limiter (`DESIGN.md`).
pub fn router(state: AppState) -> Router {
    let cors = build_cors(&state.config.server.cors.allowed_origins);

    Router::new()
        .route("/api/chat", post(chat::chat_handler))
        .route("/api/cancel", post(cancel::cancel_handler))
        .route("/api/stop_worker", post(stop_worker::stop_worker_handler))
        .route("/api/sessions", post(sessions::create_session).get(sessions::list_sessions))
        .route("/api/sessions/:session_id/history", get(sessions::session_history))
        .route("/api/sessions/:session_id", delete(sessions::delete_session))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn build_cors(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = allowed_origins.iter().filter_map(|o| o.parse().ok()).collect();
    CorsLayer::new().allow_origin(AllowOrigin::list(origins))
}
