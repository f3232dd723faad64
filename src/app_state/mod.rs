/// Application state management for the terminal proxy
mod app_state;
mod session;

pub use app_state::AppState;
pub use session::{SessionInfo, SessionState};
