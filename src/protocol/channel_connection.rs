/// In-process connection backed by tokio channels
use std::fmt::Debug;
use tokio::sync::mpsc;

use crate::protocol::{
    ConnectionError, ConnectionResult, ConnectionType, Frame, FrameError, TerminalConnection,
    TerminalMessage,
};

/// Server side of an in-process connection
pub struct ChannelConnection {
    id: String,
    inbound: mpsc::UnboundedReceiver<TerminalMessage>,
    outbound: mpsc::UnboundedSender<String>,
    closed: bool,
}

/// Client side of an in-process connection
pub struct ChannelPeer {
    pub tx: mpsc::UnboundedSender<TerminalMessage>,
    pub rx: mpsc::UnboundedReceiver<String>,
}

impl ChannelConnection {
    /// Create a connected server/client pair
    pub fn pair(id: impl Into<String>) -> (Self, ChannelPeer) {
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        (
            Self {
                id: id.into(),
                inbound: in_rx,
                outbound: out_tx,
                closed: false,
            },
            ChannelPeer {
                tx: in_tx,
                rx: out_rx,
            },
        )
    }
}

impl ChannelPeer {
    /// Send a raw text message
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.tx.send(TerminalMessage::Text(text.into())).is_ok()
    }

    /// Send an encoded frame
    pub fn send_frame(&self, frame: &Frame) -> Result<bool, FrameError> {
        Ok(self.send_text(frame.encode()?))
    }

    /// Next frame from the server, `None` once the server side is gone
    pub async fn recv_frame(&mut self) -> Option<Result<Frame, FrameError>> {
        let text = self.rx.recv().await?;
        Some(Frame::decode(&text))
    }
}

impl Debug for ChannelConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelConnection")
            .field("id", &self.id)
            .field("closed", &self.closed)
            .finish()
    }
}

#[async_trait::async_trait]
impl TerminalConnection for ChannelConnection {
    async fn send_text(&mut self, message: &str) -> ConnectionResult<()> {
        if self.closed {
            return Err(ConnectionError::ConnectionClosed);
        }
        self.outbound
            .send(message.to_string())
            .map_err(|_| ConnectionError::ConnectionClosed)
    }

    async fn receive(&mut self) -> Option<ConnectionResult<TerminalMessage>> {
        if self.closed {
            return None;
        }
        self.inbound.recv().await.map(Ok)
    }

    async fn close(&mut self) -> ConnectionResult<()> {
        self.closed = true;
        self.inbound.close();
        Ok(())
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn connection_type(&self) -> ConnectionType {
        ConnectionType::Channel
    }
}
