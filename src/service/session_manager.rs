/// Session manager for managing terminal sessions
use std::sync::Arc;
use std::time::Duration;
use futures_util::future::join_all;
use tokio::time::{Instant, sleep};
use tracing::{info, warn};

use crate::app_state::{AppState, SessionInfo};
use crate::service::Session;

const EMPTY_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Session manager responsible for the registry of live sessions
#[derive(Clone)]
pub struct SessionManager {
    app_state: AppState,
}

impl SessionManager {
    /// Create a new session manager
    pub fn new(app_state: AppState) -> Self {
        Self { app_state }
    }

    /// Register a session
    pub async fn add_session(&self, session: Arc<Session>) {
        let session_id = session.id().to_string();
        self.app_state.add_session(session).await;
        info!("Added session: {}", session_id);
    }

    /// Unregister a session
    pub async fn remove_session(&self, session_id: &str) -> Option<Arc<Session>> {
        let removed = self.app_state.remove_session(session_id).await;
        if removed.is_some() {
            info!("Removed session: {}", session_id);
        } else {
            warn!("Session not found for removal: {}", session_id);
        }
        removed
    }

    pub async fn get_session(&self, session_id: &str) -> Option<Arc<Session>> {
        self.app_state.get_session(session_id).await
    }

    /// Snapshot of one session
    pub async fn session_info(&self, session_id: &str) -> Option<SessionInfo> {
        let session = self.get_session(session_id).await?;
        Some(session.info().await)
    }

    /// Snapshots of every live session, oldest first
    pub async fn list_sessions(&self) -> Vec<SessionInfo> {
        let sessions = self.app_state.get_all_sessions().await;
        let mut infos = join_all(sessions.iter().map(|s| s.info())).await;
        infos.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        infos
    }

    /// Force-kill the active process of one session.
    ///
    /// `None` if the session is unknown, otherwise whether a process was stopped.
    pub async fn terminate_session(&self, session_id: &str) -> Option<bool> {
        let session = self.get_session(session_id).await?;
        Some(session.terminate().await)
    }

    /// Force-kill every active process; returns how many were stopped
    pub async fn terminate_all(&self) -> usize {
        let sessions = self.app_state.get_all_sessions().await;
        if sessions.is_empty() {
            return 0;
        }
        info!("Terminating {} session(s)", sessions.len());
        join_all(sessions.iter().map(|s| s.terminate()))
            .await
            .into_iter()
            .filter(|stopped| *stopped)
            .count()
    }

    /// Get the current number of sessions
    pub async fn session_count(&self) -> usize {
        self.app_state.session_count().await
    }

    /// Wait until every session has unregistered; false on timeout
    pub async fn wait_until_empty(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.session_count().await == 0 {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            sleep(EMPTY_POLL_INTERVAL).await;
        }
    }
}
