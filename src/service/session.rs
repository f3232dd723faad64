/// Per-connection session: at most one running command at a time
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info, warn};

use crate::app_state::{SessionInfo, SessionState};
use crate::config::SessionConfig;
use crate::protocol::Frame;
use crate::pty::AsyncPty;
use crate::service::PtyManager;
use crate::service::output_relay::{FrameSender, RelayStats, run_output_relay};

/// Message sent when a command arrives while another one is running
pub const SESSION_BUSY_MESSAGE: &str = "a command is already running in this session";

const SETTLE_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Timing knobs for a session
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    /// Bounded join of the relay once the process has exited
    pub relay_drain: Duration,
    /// Bounded wait for a forced termination to finish
    pub terminate_timeout: Duration,
}

impl From<&SessionConfig> for SessionSettings {
    fn from(config: &SessionConfig) -> Self {
        Self {
            relay_drain: config.relay_drain(),
            terminate_timeout: config.terminate_timeout(),
        }
    }
}

/// Result of a `command` request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The process is running and streaming
    Started,
    /// Another command is active; an `error` frame was sent
    Rejected,
    /// The pty could not be created; an `error` frame was sent
    SpawnFailed,
}

struct ActiveCommand {
    generation: u64,
    command: String,
    pty: Arc<dyn AsyncPty>,
    supervisor: JoinHandle<()>,
}

struct SessionInner {
    state: SessionState,
    active: Option<ActiveCommand>,
    commands_run: u64,
}

/// Server-side state bound to one client connection.
///
/// The active command lives behind a single async mutex; every transition
/// (spawn, input, exit, forced termination) goes through it, so one session
/// can never own two live processes.
pub struct Session {
    id: String,
    created_at: i64,
    pty_manager: Arc<PtyManager>,
    outbound: FrameSender,
    settings: SessionSettings,
    inner: Mutex<SessionInner>,
}

impl Session {
    pub fn new(
        id: String,
        pty_manager: Arc<PtyManager>,
        outbound: FrameSender,
        settings: SessionSettings,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            created_at: chrono::Utc::now().timestamp(),
            pty_manager,
            outbound,
            settings,
            inner: Mutex::new(SessionInner {
                state: SessionState::Idle,
                active: None,
                commands_run: 0,
            }),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state
    }

    /// Snapshot for reporting
    pub async fn info(&self) -> SessionInfo {
        let inner = self.inner.lock().await;
        let active = inner.active.as_ref();
        SessionInfo {
            id: self.id.clone(),
            state: inner.state,
            command: active.map(|a| a.command.clone()),
            pid: active.and_then(|a| a.pty.pid()),
            commands_run: inner.commands_run,
            created_at: self.created_at,
        }
    }

    /// Start `command` if the session is idle.
    ///
    /// Commands arriving while another is running or being torn down are
    /// rejected with an `error` frame; nothing is queued.
    pub async fn handle_command(self: &Arc<Self>, command: String) -> CommandOutcome {
        let mut inner = self.inner.lock().await;

        if inner.state != SessionState::Idle {
            warn!(
                "Session {}: rejecting command {:?} while {:?}",
                self.id, command, inner.state
            );
            self.send(Frame::error(SESSION_BUSY_MESSAGE));
            return CommandOutcome::Rejected;
        }

        let pty = match self.pty_manager.spawn(&command).await {
            Ok(pty) => pty,
            Err(e) => {
                self.send(Frame::error(format!("failed to start command: {e}")));
                return CommandOutcome::SpawnFailed;
            }
        };

        inner.commands_run += 1;
        let generation = inner.commands_run;
        info!(
            "Session {}: running command #{} {:?}",
            self.id, generation, command
        );

        let relay = tokio::spawn(run_output_relay(
            pty.clone(),
            self.outbound.clone(),
            self.id.clone(),
        ));
        let supervisor = tokio::spawn(self.clone().supervise(generation, pty.clone(), relay));

        inner.active = Some(ActiveCommand {
            generation,
            command,
            pty,
            supervisor,
        });
        inner.state = SessionState::Running;
        CommandOutcome::Started
    }

    /// Forward keystrokes to the running process; dropped when idle.
    ///
    /// A write failure ends the command through the normal exit path.
    pub async fn handle_input(&self, data: &str) {
        let inner = self.inner.lock().await;
        let Some(active) = inner.active.as_ref() else {
            debug!(
                "Session {}: no running command, discarding {} bytes of input",
                self.id,
                data.len()
            );
            return;
        };

        if let Err(e) = active.pty.write_input(data.as_bytes()).await {
            warn!(
                "Session {}: input write failed, ending command: {}",
                self.id, e
            );
            if let Err(e) = active.pty.terminate().await {
                warn!("Session {}: terminate after write failure: {}", self.id, e);
            }
        }
    }

    /// Force-kill the running command, if any, and wait (bounded) for its
    /// exit path to finish. Returns false when there was nothing to stop.
    ///
    /// A caller racing an in-progress termination waits for it to settle, so
    /// on return the `exit` frame has been queued either way.
    pub async fn terminate(&self) -> bool {
        let active = {
            let mut inner = self.inner.lock().await;
            match inner.active.take() {
                Some(active) => {
                    inner.state = SessionState::Terminating;
                    active
                }
                None => {
                    let busy = inner.state == SessionState::Terminating;
                    drop(inner);
                    if busy {
                        self.wait_settled().await;
                    }
                    return false;
                }
            }
        };

        info!(
            "Session {}: terminating command #{} {:?}",
            self.id, active.generation, active.command
        );
        if let Err(e) = active.pty.terminate().await {
            warn!("Session {}: terminate failed: {}", self.id, e);
        }

        let mut supervisor = active.supervisor;
        if timeout(self.settings.terminate_timeout, &mut supervisor)
            .await
            .is_err()
        {
            warn!(
                "Session {}: command did not wind down within {:?}, abandoning it",
                self.id, self.settings.terminate_timeout
            );
            supervisor.abort();
        }

        let mut inner = self.inner.lock().await;
        if inner.active.is_none() {
            inner.state = SessionState::Idle;
        }
        true
    }

    /// Await exit, let the relay drain, tear down, report `exit`
    async fn supervise(
        self: Arc<Self>,
        generation: u64,
        pty: Arc<dyn AsyncPty>,
        mut relay: JoinHandle<RelayStats>,
    ) {
        let status = pty.wait().await;
        debug!(
            "Session {}: command #{} exited with {}",
            self.id,
            generation,
            status.code()
        );

        // 先让 relay 把剩余输出发完，再发送 exit
        match timeout(self.settings.relay_drain, &mut relay).await {
            Ok(Ok(stats)) => debug!("Session {}: relay drained {:?}", self.id, stats),
            Ok(Err(e)) => warn!("Session {}: relay task failed: {}", self.id, e),
            Err(_) => {
                warn!(
                    "Session {}: output still open {:?} after exit, closing pty",
                    self.id, self.settings.relay_drain
                );
                if let Err(e) = pty.terminate().await {
                    warn!("Session {}: terminate failed: {}", self.id, e);
                }
                if timeout(self.settings.relay_drain, &mut relay).await.is_err() {
                    relay.abort();
                }
            }
        }

        if let Err(e) = pty.terminate().await {
            warn!("Session {}: teardown failed: {}", self.id, e);
        }
        self.finish_command(generation, status.code()).await;
        info!(
            "Session {}: command #{} finished with exit code {}",
            self.id,
            generation,
            status.code()
        );
    }

    async fn wait_settled(&self) {
        let deadline = Instant::now() + self.settings.terminate_timeout;
        while self.state().await == SessionState::Terminating && Instant::now() < deadline {
            sleep(SETTLE_POLL_INTERVAL).await;
        }
    }

    /// Return to Idle, then report `exit` while still holding the lock, so a
    /// command sent in response to the `exit` frame always finds the session idle.
    async fn finish_command(&self, generation: u64, code: i32) {
        let mut inner = self.inner.lock().await;
        if inner
            .active
            .as_ref()
            .is_some_and(|active| active.generation == generation)
        {
            inner.active = None;
            inner.state = SessionState::Idle;
        } else if inner.active.is_none() && inner.state == SessionState::Terminating {
            // terminate() 已取走该命令
            inner.state = SessionState::Idle;
        }
        self.send(Frame::exit(code));
    }

    fn send(&self, frame: Frame) {
        if self.outbound.send(frame).is_err() {
            debug!("Session {}: transport gone, frame dropped", self.id);
        }
    }
}
