/// Server implementation for the terminal proxy
use std::future::IntoFuture;
use std::sync::Arc;

use axum::{
    Router,
    http::Method,
    routing::get,
};
use tokio::net::TcpListener;
use tokio::time::sleep_until;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::server::ShutdownCoordinator;
use crate::{app_state::AppState, handlers};

/// Build the application router with routes
pub fn build_router(state: AppState) -> Router {
    // Create CORS layer to allow cross-origin requests
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/", get(|| async { "rs_term_proxy - WebSocket terminal bridge" }))
        .route("/health", get(handlers::rest::health_check))
        // WebSocket endpoint for terminal communication
        .route("/ws", get(handlers::websocket::websocket_handler))
        // REST API endpoints for session management
        .nest("/api", api_routes())
        .layer(cors)
        .with_state(state)
}

/// Build API routes for session management
fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/sessions", get(handlers::rest::get_all_sessions))
        .route(
            "/sessions/:session_id",
            get(handlers::rest::get_session).delete(handlers::rest::terminate_session),
        )
}

/// Bind the listening socket; failure here is the only fatal startup error
pub async fn bind(config: &ServerConfig) -> Result<TcpListener, std::io::Error> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Server running on http://{}", listener.local_addr()?);
    info!("WebSocket server available at ws://{}/ws", listener.local_addr()?);
    Ok(listener)
}

/// Serve until shutdown, then drain sessions within the grace period
pub async fn run_server(
    listener: TcpListener,
    router: Router,
    coordinator: Arc<ShutdownCoordinator>,
) -> Result<(), std::io::Error> {
    let signal_coordinator = coordinator.clone();
    let server = axum::serve(listener, router)
        .with_graceful_shutdown(async move { signal_coordinator.wait_for_signal().await })
        .into_future();

    let token = coordinator.token();
    let grace = coordinator.grace();
    tokio::select! {
        result = server => result?,
        _ = async {
            token.cancelled().await;
            sleep_until(coordinator.deadline()).await;
        } => {
            warn!("HTTP server did not stop within {:?}, dropping open connections", grace);
        }
    }

    // 与 HTTP 停止共用同一个截止时间
    coordinator.drain().await;
    info!("Server shutdown complete");
    Ok(())
}
