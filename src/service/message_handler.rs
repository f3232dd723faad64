/// Message handler for processing terminal messages
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::protocol::{Frame, FrameError, FrameType, TerminalMessage};
use crate::service::{ServiceError, Session};

/// Decodes client messages and dispatches them to the session
#[derive(Debug, Default)]
pub struct MessageHandler;

impl MessageHandler {
    /// Create a new message handler
    pub fn new() -> Self {
        Self
    }

    /// Handle one transport message.
    ///
    /// Returns `Ok(true)` when the connection should be closed. A message that
    /// is not a frame at all is returned as an error, which also ends the
    /// session.
    pub async fn handle_message(
        &self,
        message: TerminalMessage,
        session: &Arc<Session>,
    ) -> Result<bool, ServiceError> {
        match message {
            TerminalMessage::Text(text) => {
                debug!("Session {}: received {}", session.id(), text);
                self.dispatch(Frame::decode(&text), session).await
            }
            TerminalMessage::Binary(bin) => {
                debug!(
                    "Session {}: received binary message of length {}",
                    session.id(),
                    bin.len()
                );
                self.dispatch(Frame::decode_bytes(&bin), session).await
            }
            TerminalMessage::Ping(_) => {
                // axum 自动回复 pong
                debug!("Session {}: ping", session.id());
                Ok(false)
            }
            TerminalMessage::Pong => {
                debug!("Session {}: pong", session.id());
                Ok(false)
            }
            TerminalMessage::Close => {
                info!("Received close message from session {}", session.id());
                Ok(true)
            }
        }
    }

    async fn dispatch(
        &self,
        decoded: Result<Frame, FrameError>,
        session: &Arc<Session>,
    ) -> Result<bool, ServiceError> {
        let frame = match decoded {
            Ok(frame) => frame,
            Err(FrameError::UnknownType(kind)) => {
                warn!(
                    "Session {}: ignoring frame of unknown type {:?}",
                    session.id(),
                    kind
                );
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };

        match frame.kind {
            FrameType::Command => {
                let outcome = session.handle_command(frame.data).await;
                debug!("Session {}: command {:?}", session.id(), outcome);
            }
            FrameType::Input => session.handle_input(&frame.data).await,
            FrameType::Output | FrameType::Exit | FrameType::Error => {
                warn!(
                    "Session {}: ignoring server-only frame type {} from client",
                    session.id(),
                    frame.kind.as_str()
                );
            }
        }
        Ok(false)
    }
}
