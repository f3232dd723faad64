/// Application state shared across handlers
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::ProxyConfig;
use crate::pty::{self, PtyFactory};
use crate::service::{PtyManager, Session};

/// Application state containing shared data across handlers
#[derive(Clone)]
pub struct AppState {
    /// Map of live sessions by session ID
    pub sessions: Arc<Mutex<HashMap<String, Arc<Session>>>>,
    /// Application configuration
    pub config: Arc<ProxyConfig>,
    /// Spawns ptys for every session
    pub pty_manager: Arc<PtyManager>,
    /// Cancelled once, when shutdown begins
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Create application state, picking the pty backend from configuration
    pub fn new(config: ProxyConfig) -> Self {
        let factory = pty::create_factory(config.terminal.backend);
        Self::with_factory(config, factory)
    }

    /// Create application state around a specific pty factory
    pub fn with_factory(config: ProxyConfig, factory: Arc<dyn PtyFactory>) -> Self {
        let pty_manager = PtyManager::new(factory, &config.terminal);
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            config: Arc::new(config),
            pty_manager: Arc::new(pty_manager),
            shutdown: CancellationToken::new(),
        }
    }

    /// Add a new session to the state
    pub async fn add_session(&self, session: Arc<Session>) {
        let mut sessions = self.sessions.lock().await;
        sessions.insert(session.id().to_string(), session);
    }

    /// Get a session by ID
    pub async fn get_session(&self, session_id: &str) -> Option<Arc<Session>> {
        let sessions = self.sessions.lock().await;
        sessions.get(session_id).cloned()
    }

    /// Remove a session by ID
    pub async fn remove_session(&self, session_id: &str) -> Option<Arc<Session>> {
        let mut sessions = self.sessions.lock().await;
        sessions.remove(session_id)
    }

    /// Get all sessions
    pub async fn get_all_sessions(&self) -> Vec<Arc<Session>> {
        let sessions = self.sessions.lock().await;
        sessions.values().cloned().collect()
    }

    /// Get the number of live sessions
    pub async fn session_count(&self) -> usize {
        let sessions = self.sessions.lock().await;
        sessions.len()
    }
}
