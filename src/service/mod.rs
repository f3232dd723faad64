/// Service layer for terminal session management
mod error;
mod message_handler;
mod output_relay;
mod pty_manager;
mod session;
mod session_handler;
mod session_manager;

pub use error::ServiceError;
pub use message_handler::MessageHandler;
pub use output_relay::{FrameSender, RelayStats, run_output_relay};
pub use pty_manager::PtyManager;
pub use session::{CommandOutcome, SESSION_BUSY_MESSAGE, Session, SessionSettings};
pub use session_handler::handle_terminal_session;
pub use session_manager::SessionManager;
