/// Data Transfer Objects (DTOs) for REST API endpoints
use serde::Serialize;

use crate::app_state::SessionInfo;

/// Response DTO for the health check
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// "ok" while serving, "shutting_down" once shutdown has begun
    pub status: String,

    /// Number of live sessions
    pub active_sessions: usize,

    /// Crate version
    pub version: String,
}

/// Response DTO listing sessions
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionListResponse {
    pub sessions: Vec<SessionInfo>,
    pub count: usize,
}

/// Response DTO for a termination request
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminateResponse {
    /// Session ID
    pub session_id: String,

    /// Whether a running process was stopped
    pub terminated: bool,

    /// Human readable outcome
    pub message: String,
}

/// Generic error response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    /// Error flag
    pub error: bool,

    /// Error message
    pub message: String,

    /// Optional error code
    pub code: Option<u16>,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>, code: u16) -> Self {
        Self {
            error: true,
            message: message.into(),
            code: Some(code),
        }
    }
}
