use axum::{
    extract::State,
    extract::ws::{WebSocket, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::warn;
use uuid::Uuid;

use crate::{app_state::AppState, protocol::WebSocketConnection, service::handle_terminal_session};

pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    if state.shutdown.is_cancelled() {
        warn!("Refusing WebSocket upgrade during shutdown");
        return (StatusCode::SERVICE_UNAVAILABLE, "server is shutting down").into_response();
    }
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

pub async fn handle_socket(socket: WebSocket, state: AppState) {
    let session_id = Uuid::new_v4().to_string();
    let ws_connection = WebSocketConnection::new(socket, session_id);

    // Use the shared session handler to handle this connection
    handle_terminal_session(ws_connection, state).await;
}
