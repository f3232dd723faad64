use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

// ================ 配置与错误类型 ================

/// Output is read from the pty in chunks of at most this many bytes
pub const READ_CHUNK_SIZE: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalSize {
    pub rows: u16,
    pub cols: u16,
}

impl Default for TerminalSize {
    fn default() -> Self {
        Self { rows: 40, cols: 120 }
    }
}

#[derive(Debug, Clone)]
pub struct PtyConfig {
    pub command: String,
    pub args: Vec<String>,
    pub size: TerminalSize,
    pub env: Vec<(String, String)>,
    pub cwd: Option<std::path::PathBuf>,
}

impl PtyConfig {
    /// The client command line (last argv element), used for logging
    pub fn command_line(&self) -> &str {
        self.args.last().map(String::as_str).unwrap_or(&self.command)
    }
}

#[derive(Debug, Error)]
pub enum PtyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Process spawn failed: {0}")]
    SpawnFailed(String),
    #[error("Other error: {0}")]
    Other(String),
}

// portable-pty 的接口返回 anyhow::Error
impl From<anyhow::Error> for PtyError {
    fn from(error: anyhow::Error) -> Self {
        PtyError::Other(error.to_string())
    }
}

/// Normalized process exit status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus {
    code: i32,
}

impl ExitStatus {
    /// Reported when the process died from a signal or for an unknown reason
    pub const ABNORMAL_CODE: i32 = 1;

    pub fn from_code(code: i32) -> Self {
        Self { code }
    }

    pub fn abnormal() -> Self {
        Self {
            code: Self::ABNORMAL_CODE,
        }
    }

    pub fn code(&self) -> i32 {
        self.code
    }

    pub fn success(&self) -> bool {
        self.code == 0
    }
}

// ================ 核心Trait定义 ================

/// One spawned process attached to a pseudo-terminal.
///
/// All methods take `&self` so the relay, the exit waiter and the session can
/// share one controller; implementations serialize access internally.
#[async_trait]
pub trait AsyncPty: Send + Sync {
    /// Forward raw bytes to the process as keystrokes.
    ///
    /// Writing to a terminated controller is a silent no-op.
    async fn write_input(&self, data: &[u8]) -> Result<(), PtyError>;

    /// Next chunk of output, at most [`READ_CHUNK_SIZE`] bytes.
    ///
    /// `Ok(None)` means end of stream. A pending call returns `Ok(None)` as
    /// soon as [`AsyncPty::terminate`] runs.
    async fn read_output_chunk(&self) -> Result<Option<Vec<u8>>, PtyError>;

    /// Kill the process and close the pty. Idempotent.
    async fn terminate(&self) -> Result<(), PtyError>;

    /// Wait for the process to exit.
    async fn wait(&self) -> ExitStatus;

    /// OS process id, when there is one
    fn pid(&self) -> Option<u32>;

    /// False once the process has exited or been terminated
    fn is_alive(&self) -> bool;
}

/// PTY工厂Trait
#[async_trait]
pub trait PtyFactory: Send + Sync {
    /// Spawn `config.command` with `config.args` attached to a new pty
    async fn spawn(&self, config: &PtyConfig) -> Result<Arc<dyn AsyncPty>, PtyError>;

    /// 工厂名称
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_is_the_last_argument() {
        let config = PtyConfig {
            command: "bash".to_string(),
            args: vec!["-c".to_string(), "ls | wc -l".to_string()],
            size: TerminalSize::default(),
            env: vec![],
            cwd: None,
        };
        assert_eq!(config.command_line(), "ls | wc -l");
    }

    #[test]
    fn abnormal_exit_uses_the_sentinel_code() {
        assert_eq!(ExitStatus::abnormal().code(), 1);
        assert!(!ExitStatus::abnormal().success());
        assert!(ExitStatus::from_code(0).success());
    }
}
