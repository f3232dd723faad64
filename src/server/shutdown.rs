/// Shutdown coordination: signal → cancel sessions → bounded drain
use std::future::pending;
use std::sync::{Arc, OnceLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::signal;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::app_state::AppState;
use crate::service::SessionManager;

/// Fires shutdown exactly once, from a signal or programmatically
pub struct ShutdownCoordinator {
    token: CancellationToken,
    fired: AtomicBool,
    fired_at: OnceLock<Instant>,
    grace: Duration,
    sessions: SessionManager,
}

impl ShutdownCoordinator {
    pub fn new(state: &AppState, grace: Duration) -> Arc<Self> {
        Arc::new(Self {
            token: state.shutdown.clone(),
            fired: AtomicBool::new(false),
            fired_at: OnceLock::new(),
            grace,
            sessions: SessionManager::new(state.clone()),
        })
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    pub fn is_shutting_down(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Begin shutdown. Returns false if it had already begun.
    ///
    /// Session loops observe the token, terminate their process, flush and
    /// close; every registered session is also terminated directly.
    pub async fn initiate(&self) -> bool {
        if self.fired.swap(true, Ordering::SeqCst) {
            return false;
        }
        let _ = self.fired_at.set(Instant::now());
        info!("Graceful shutdown initiated");
        self.token.cancel();
        let stopped = self.sessions.terminate_all().await;
        info!("Shutdown: stopped {} running command(s)", stopped);
        true
    }

    /// Resolve once shutdown has begun, initiating it on ctrl-c or SIGTERM
    pub async fn wait_for_signal(&self) {
        tokio::select! {
            _ = ctrl_c() => info!("Received Ctrl+C signal, initiating graceful shutdown..."),
            _ = terminate() => info!("Received SIGTERM signal, initiating graceful shutdown..."),
            _ = self.token.cancelled() => {}
        }
        self.initiate().await;
    }

    /// One grace period after shutdown began (or from now, if it has not)
    pub fn deadline(&self) -> Instant {
        self.fired_at.get().copied().unwrap_or_else(Instant::now) + self.grace
    }

    /// Wait, until the shutdown deadline, for every session to unregister.
    /// Stragglers are force-terminated; returns whether the drain was clean.
    pub async fn drain(&self) -> bool {
        let remaining = self.deadline().saturating_duration_since(Instant::now());
        if self.sessions.wait_until_empty(remaining).await {
            info!("All sessions closed");
            return true;
        }
        let open = self.sessions.session_count().await;
        warn!(
            "{} session(s) still open after {:?}, dropping them",
            open, self.grace
        );
        self.sessions.terminate_all().await;
        false
    }
}

async fn ctrl_c() {
    if let Err(e) = signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        pending::<()>().await;
    }
}

#[cfg(unix)]
async fn terminate() {
    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            error!("Failed to install SIGTERM handler: {}", e);
            pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    pending::<()>().await;
}
