use serde::Serialize;

/// Lifecycle of a session's command slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No process attached; a `command` frame may start one
    Idle,
    /// A process is attached and streaming
    Running,
    /// The attached process is being force-killed
    Terminating,
}

/// Point-in-time view of a session, as reported over REST
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    /// Unique session ID
    pub id: String,

    /// Current state
    pub state: SessionState,

    /// Command line of the attached process, if any
    pub command: Option<String>,

    /// OS pid of the attached process, if any
    pub pid: Option<u32>,

    /// Commands started over the session's lifetime
    pub commands_run: u64,

    /// Session creation timestamp (UNIX epoch in seconds)
    pub created_at: i64,
}
