/// REST API handlers for terminal session management
use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::info;

use crate::{
    api::dto::{ErrorResponse, HealthResponse, SessionListResponse, TerminateResponse},
    app_state::AppState,
    service::SessionManager,
};

fn not_found(session_id: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse::new(
            format!("Session not found: {}", session_id),
            404,
        )),
    )
        .into_response()
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let status = if state.shutdown.is_cancelled() {
        "shutting_down"
    } else {
        "ok"
    };
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: status.to_string(),
            active_sessions: state.session_count().await,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

/// Get all terminal sessions
pub async fn get_all_sessions(State(state): State<AppState>) -> impl IntoResponse {
    let sessions = SessionManager::new(state).list_sessions().await;
    (
        StatusCode::OK,
        Json(SessionListResponse {
            count: sessions.len(),
            sessions,
        }),
    )
}

/// Get a specific terminal session by ID
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    match SessionManager::new(state).session_info(&session_id).await {
        Some(info) => (StatusCode::OK, Json(info)).into_response(),
        None => not_found(&session_id),
    }
}

/// Force-kill the process running in a session; the connection stays open
pub async fn terminate_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    info!("Terminating command in session: {}", session_id);

    match SessionManager::new(state)
        .terminate_session(&session_id)
        .await
    {
        Some(terminated) => {
            let message = if terminated {
                "Command terminated by API request"
            } else {
                "No command was running"
            };
            (
                StatusCode::OK,
                Json(TerminateResponse {
                    session_id,
                    terminated,
                    message: message.to_string(),
                }),
            )
                .into_response()
        }
        None => not_found(&session_id),
    }
}
