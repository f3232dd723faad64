/// Protocol abstraction for the terminal proxy
mod channel_connection;
mod connection;
mod frame;
mod websocket_connection;

pub use channel_connection::{ChannelConnection, ChannelPeer};
pub use connection::{
    ConnectionError, ConnectionResult, ConnectionType, TerminalConnection, TerminalMessage,
};
pub use frame::{Frame, FrameError, FrameType, OutputDecoder, now_millis, sanitize_output};
pub use websocket_connection::WebSocketConnection;
