//! WebSocket to pseudo-terminal bridge.
//!
//! Each WebSocket connection owns a session that can run one shell command
//! at a time inside a pty, streaming its output back as JSON frames and
//! forwarding keystrokes to it.
pub mod api;
pub mod app_state;
pub mod config;
pub mod handlers;
pub mod protocol;
pub mod pty;
pub mod server;
pub mod service;
