/// PTY (Pseudo Terminal) handling for the terminal proxy
/// This module provides a trait abstraction over pty implementations
/// with a focus on pure async operations

mod memory_pty;
mod portable_pty_impl;
mod pty_trait;

use std::sync::Arc;

use crate::config::PtyBackend;

// Export all public types and traits
pub use memory_pty::{MemoryPty, MemoryPtyFactory};
pub use portable_pty_impl::{PortablePty, PortablePtyFactory};
pub use pty_trait::*;

/// Terminal-capability hints every spawned process receives
pub fn terminal_environment() -> Vec<(String, String)> {
    vec![
        ("TERM".to_string(), "xterm-256color".to_string()),
        ("COLORTERM".to_string(), "truecolor".to_string()),
        ("FORCE_COLOR".to_string(), "1".to_string()),
    ]
}

/// 根据配置选择 PTY 实现
pub fn create_factory(backend: PtyBackend) -> Arc<dyn PtyFactory> {
    match backend {
        PtyBackend::Native => Arc::new(PortablePtyFactory),
        PtyBackend::Memory => Arc::new(MemoryPtyFactory::new()),
    }
}
