/// Terminal session handler for processing terminal connections
use std::future::pending;
use std::time::Duration;
use tokio::select;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, info, warn};

use crate::app_state::{AppState, SessionState};
use crate::protocol::{Frame, TerminalConnection};
use crate::service::{MessageHandler, Session, SessionManager, SessionSettings};

/// Drive one client connection until it closes.
///
/// Inbound messages and outbound frames are multiplexed on this task, so the
/// connection is only ever written from one place. On exit (client close,
/// transport error, idle timeout or shutdown) the active process is
/// terminated, queued frames are flushed best-effort, and the session is
/// unregistered.
pub async fn handle_terminal_session(mut connection: impl TerminalConnection, state: AppState) {
    let conn_id = connection.id().to_string();
    info!(
        "New terminal connection: {} (Type: {:?})",
        conn_id,
        connection.connection_type()
    );

    let (tx, mut rx) = mpsc::unbounded_channel::<Frame>();
    let session = Session::new(
        conn_id.clone(),
        state.pty_manager.clone(),
        tx,
        SessionSettings::from(&state.config.session),
    );
    let manager = SessionManager::new(state.clone());
    manager.add_session(session.clone()).await;

    let handler = MessageHandler::new();
    let idle_timeout = state.config.session.idle_timeout();
    let mut last_activity = Instant::now();
    let mut closing_error = None;

    loop {
        select! {
            msg_result = connection.receive() => {
                last_activity = Instant::now();
                match msg_result {
                    Some(Ok(msg)) => match handler.handle_message(msg, &session).await {
                        Ok(true) => break,
                        Ok(false) => {}
                        Err(e) => {
                            warn!("Closing session {}: {}", conn_id, e);
                            closing_error = Some(e.to_string());
                            break;
                        }
                    },
                    Some(Err(e)) => {
                        error!("Connection error for session {}: {}", conn_id, e);
                        break;
                    }
                    None => {
                        info!("Connection closed by client for session {}", conn_id);
                        break;
                    }
                }
            }
            Some(frame) = rx.recv() => {
                last_activity = Instant::now();
                if let Err(e) = connection.send_frame(&frame).await {
                    warn!("Failed to send {} frame to session {}: {}", frame.kind.as_str(), conn_id, e);
                    break;
                }
            }
            _ = state.shutdown.cancelled() => {
                info!("Shutdown: closing session {}", conn_id);
                break;
            }
            _ = idle_deadline(idle_timeout, last_activity) => {
                if session.state().await == SessionState::Idle {
                    info!("Session {} idle for {:?}, closing", conn_id, idle_timeout);
                    break;
                }
                last_activity = Instant::now();
            }
        }
    }

    info!("Cleaning up session {}", conn_id);
    session.terminate().await;

    // 尽量把已排队的帧（包括 exit）发出去
    let mut flushed = 0usize;
    while let Ok(frame) = rx.try_recv() {
        if connection.send_frame(&frame).await.is_err() {
            break;
        }
        flushed += 1;
    }
    if let Some(message) = closing_error {
        let _ = connection.send_frame(&Frame::error(message)).await;
    }
    debug!("Session {}: flushed {} queued frame(s)", conn_id, flushed);

    if let Err(e) = connection.close().await {
        debug!("Failed to close connection for session {}: {}", conn_id, e);
    }

    manager.remove_session(&conn_id).await;
    info!("Terminal session {} closed", conn_id);
}

async fn idle_deadline(idle_timeout: Option<Duration>, since: Instant) {
    match idle_timeout {
        Some(timeout) => sleep_until(since + timeout).await,
        None => pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProxyConfig;
    use crate::protocol::{ChannelConnection, ChannelPeer, FrameType, TerminalMessage};
    use crate::pty::MemoryPtyFactory;
    use std::sync::Arc;
    use tokio::task::JoinHandle;
    use tokio::time::timeout;

    struct Running {
        state: AppState,
        factory: Arc<MemoryPtyFactory>,
        peer: ChannelPeer,
        task: JoinHandle<()>,
    }

    fn start(config: ProxyConfig) -> Running {
        let factory = Arc::new(MemoryPtyFactory::new());
        let state = AppState::with_factory(config, factory.clone());
        let (connection, peer) = ChannelConnection::pair("chan-1");
        let task = tokio::spawn(handle_terminal_session(connection, state.clone()));
        Running {
            state,
            factory,
            peer,
            task,
        }
    }

    impl Running {
        async fn next(&mut self) -> Option<Frame> {
            timeout(Duration::from_secs(2), self.peer.recv_frame())
                .await
                .expect("timed out waiting for the server")
                .map(|decoded| decoded.expect("server sent an invalid frame"))
        }

        async fn finished(self) {
            timeout(Duration::from_secs(2), self.task)
                .await
                .expect("session loop did not finish")
                .unwrap();
        }
    }

    #[tokio::test]
    async fn command_output_and_exit_reach_the_client() {
        let mut r = start(ProxyConfig::default());
        r.peer
            .send_text(r#"{"type":"command","data":"echo hello"}"#);

        let output = r.next().await.unwrap();
        assert_eq!(output.kind, FrameType::Output);
        assert!(output.data.contains("hello"));
        assert!(output.timestamp > 0);

        let exit = r.next().await.unwrap();
        assert_eq!((exit.kind, exit.data.as_str()), (FrameType::Exit, "0"));
        assert_eq!(r.state.session_count().await, 1);

        r.peer.tx.send(TerminalMessage::Close).unwrap();
        let state = r.state.clone();
        r.finished().await;
        assert_eq!(state.session_count().await, 0);
    }

    #[tokio::test]
    async fn disconnect_kills_the_running_process() {
        let r = start(ProxyConfig::default());
        r.peer.send_text(r#"{"type":"command","data":"cat"}"#);
        for _ in 0..100 {
            if r.factory.live_count() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(r.factory.live_count(), 1);

        let Running {
            state,
            factory,
            peer,
            task,
        } = r;
        drop(peer);
        timeout(Duration::from_secs(2), task).await.unwrap().unwrap();
        assert_eq!(factory.live_count(), 0);
        assert_eq!(state.session_count().await, 0);
    }

    #[tokio::test]
    async fn malformed_frame_closes_with_an_error() {
        let mut r = start(ProxyConfig::default());
        r.peer.send_text("{not json");

        let frame = r.next().await.unwrap();
        assert_eq!(frame.kind, FrameType::Error);
        assert!(r.next().await.is_none());
        r.finished().await;
    }

    #[tokio::test]
    async fn shutdown_token_ends_the_loop_after_flushing_exit() {
        let mut r = start(ProxyConfig::default());
        r.peer.send_text(r#"{"type":"command","data":"cat"}"#);
        r.peer.send_text(r#"{"type":"input","data":"hi"}"#);
        assert_eq!(r.next().await.unwrap().data, "hi");

        r.state.shutdown.cancel();
        let exit = r.next().await.unwrap();
        assert_eq!(exit.kind, FrameType::Exit);
        assert_ne!(exit.data, "0");
        assert!(r.next().await.is_none());
        r.finished().await;
    }

    #[tokio::test]
    async fn idle_connection_is_closed() {
        let mut config = ProxyConfig::default();
        config.session.idle_timeout_secs = 1;
        let mut r = start(config);
        assert!(r.next().await.is_none());
        r.finished().await;
    }

    #[tokio::test]
    async fn idle_window_spares_a_running_command() {
        let mut config = ProxyConfig::default();
        config.session.idle_timeout_secs = 1;
        let mut r = start(config);
        r.peer.send_text(r#"{"type":"command","data":"cat"}"#);

        tokio::time::sleep(Duration::from_millis(1600)).await;
        assert_eq!(r.state.session_count().await, 1);
        assert_eq!(r.factory.live_count(), 1);

        r.peer.send_text(r#"{"type":"input","data":"still here\u0004"}"#);
        assert_eq!(r.next().await.unwrap().data, "still here\u{4}");
        let exit = r.next().await.unwrap();
        assert_eq!((exit.kind, exit.data.as_str()), (FrameType::Exit, "0"));

        // 命令结束后恢复计时，空闲连接随即关闭
        assert!(r.next().await.is_none());
        r.finished().await;
    }
}
