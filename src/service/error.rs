/// Error types for the service layer
use thiserror::Error;

use crate::protocol::{ConnectionError, FrameError};
use crate::pty::PtyError;

/// Service layer error type
#[derive(Error, Debug)]
pub enum ServiceError {
    /// PTY error
    #[error("PTY error: {0}")]
    Pty(#[from] PtyError),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Client sent something that is not a frame
    #[error("Malformed frame: {0}")]
    Frame(#[from] FrameError),

    /// Session error
    #[error("Session error: {0}")]
    Session(String),
}
