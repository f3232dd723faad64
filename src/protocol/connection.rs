/// Terminal connection trait for abstracting the transport
use std::fmt::Debug;

use thiserror::Error;

use crate::protocol::{Frame, FrameError};

/// 连接错误类型
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// IO 错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// WebSocket 错误
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// 连接已关闭
    #[error("Connection closed")]
    ConnectionClosed,

    /// 消息序列化错误
    #[error("Message serialization error: {0}")]
    Serialization(#[from] FrameError),
}

/// 连接结果类型
pub type ConnectionResult<T> = Result<T, ConnectionError>;

/// Transport-level message, before frame decoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalMessage {
    /// Text message
    Text(String),
    /// Binary message
    Binary(Vec<u8>),
    /// Ping message
    Ping(Vec<u8>),
    /// Pong message
    Pong,
    /// Close message
    Close,
}

/// Connection types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionType {
    /// WebSocket connection
    WebSocket,
    /// In-process channel (tests, embedding)
    Channel,
}

/// Reliable, ordered message channel to one client
#[async_trait::async_trait]
pub trait TerminalConnection: Send + Debug {
    /// Send a text message over the connection
    async fn send_text(&mut self, message: &str) -> ConnectionResult<()>;

    /// Receive a message from the connection
    /// Returns None when the connection is closed
    async fn receive(&mut self) -> Option<ConnectionResult<TerminalMessage>>;

    /// Close the connection
    async fn close(&mut self) -> ConnectionResult<()>;

    /// Get the connection ID
    fn id(&self) -> &str;

    /// Get the connection type
    fn connection_type(&self) -> ConnectionType;

    /// Encode and send one frame
    async fn send_frame(&mut self, frame: &Frame) -> ConnectionResult<()> {
        let text = frame.encode()?;
        self.send_text(&text).await
    }
}
