//! Shared helpers for end-to-end tests
#![allow(dead_code)]

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

use rs_term_proxy::app_state::AppState;
use rs_term_proxy::config::{ProxyConfig, PtyBackend};
use rs_term_proxy::server::{ShutdownCoordinator, bind, build_router, run_server};

pub type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub const FRAME_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TestServer {
    pub addr: SocketAddr,
    pub state: AppState,
    pub coordinator: Arc<ShutdownCoordinator>,
    pub handle: JoinHandle<std::io::Result<()>>,
}

pub fn test_config(backend: PtyBackend) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.server.host = "127.0.0.1".to_string();
    config.server.port = 0;
    config.server.shutdown_grace_ms = 1000;
    config.terminal.shell = vec!["sh".to_string(), "-c".to_string()];
    config.terminal.backend = backend;
    config.session.relay_drain_ms = 500;
    config
}

pub async fn spawn_server(config: ProxyConfig) -> TestServer {
    let listener = bind(&config.server).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let grace = config.shutdown_grace();
    let state = AppState::new(config);
    let coordinator = ShutdownCoordinator::new(&state, grace);
    let handle = tokio::spawn(run_server(
        listener,
        build_router(state.clone()),
        coordinator.clone(),
    ));
    TestServer {
        addr,
        state,
        coordinator,
        handle,
    }
}

/// Serve the router without a shutdown coordinator, so the listener keeps
/// accepting after the shutdown token is cancelled
pub async fn spawn_router(config: ProxyConfig) -> (SocketAddr, AppState) {
    let listener = bind(&config.server).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = AppState::new(config);
    tokio::spawn(axum::serve(listener, build_router(state.clone())).into_future());
    (addr, state)
}

pub async fn connect(addr: SocketAddr) -> Client {
    let (client, _response) = connect_async(format!("ws://{}/ws", addr)).await.unwrap();
    client
}

pub async fn send(client: &mut Client, kind: &str, data: &str) {
    let text = json!({"type": kind, "data": data}).to_string();
    client.send(Message::Text(text)).await.unwrap();
}

/// Next JSON frame, `None` once the server closes the socket
pub async fn next_frame(client: &mut Client) -> Option<Value> {
    loop {
        let message = timeout(FRAME_TIMEOUT, client.next())
            .await
            .expect("timed out waiting for a frame")?;
        match message {
            Ok(Message::Text(text)) => return Some(serde_json::from_str(&text).unwrap()),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
}

/// Frames up to and including `exit`
pub async fn frames_until_exit(client: &mut Client) -> Vec<Value> {
    let mut frames = Vec::new();
    while let Some(frame) = next_frame(client).await {
        let done = frame["type"] == "exit";
        frames.push(frame);
        if done {
            return frames;
        }
    }
    panic!("connection closed before exit frame: {:?}", frames);
}

pub fn output_of(frames: &[Value]) -> String {
    frames
        .iter()
        .filter(|f| f["type"] == "output")
        .filter_map(|f| f["data"].as_str())
        .collect()
}

/// True if nothing arrives within `window`
pub async fn stays_quiet(client: &mut Client, window: Duration) -> bool {
    timeout(window, client.next()).await.is_err()
}

/// Minimal HTTP/1.1 request; returns status and parsed JSON body
pub async fn http(addr: SocketAddr, method: &str, path: &str) -> (u16, Value) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "{method} {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\nContent-Length: 0\r\n\r\n"
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut raw = Vec::new();
    timeout(FRAME_TIMEOUT, stream.read_to_end(&mut raw))
        .await
        .unwrap()
        .unwrap();
    let raw = String::from_utf8_lossy(&raw);
    let (head, body) = raw.split_once("\r\n\r\n").unwrap();
    let status = head
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .unwrap();
    let body = serde_json::from_str(body).unwrap_or(Value::Null);
    (status, body)
}

/// Poll until some session reports `state`; returns its id
pub async fn wait_for_session_state(addr: SocketAddr, state: &str) -> Value {
    for _ in 0..200 {
        let (_, body) = http(addr, "GET", "/api/sessions").await;
        if let Some(session) = body["sessions"]
            .as_array()
            .and_then(|sessions| sessions.iter().find(|s| s["state"] == state))
        {
            return session.clone();
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("no session reached state {state}");
}
