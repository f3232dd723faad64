/// Configuration data structures for rs_term_proxy
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::ConfigError;

/// Top-level proxy configuration
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener and shutdown settings
    pub server: ServerConfig,

    /// How commands are launched inside the pty
    pub terminal: TerminalConfig,

    /// Per-connection session timing
    pub session: SessionConfig,

    /// Log output settings
    pub logging: LoggingConfig,
}

/// HTTP/WebSocket listener configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Grace period for draining connections after a shutdown signal
    pub shutdown_grace_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            shutdown_grace_ms: 3000,
        }
    }
}

/// Which pty implementation backs new commands
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PtyBackend {
    /// Real pseudo-terminal via portable-pty
    #[default]
    Native,
    /// Scripted in-process pty
    Memory,
}

/// Terminal (pty) configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct TerminalConfig {
    /// Shell argv prefix; the client's command line is appended as the last argument
    pub shell: Vec<String>,

    /// Initial window rows
    pub rows: u16,

    /// Initial window columns
    pub columns: u16,

    /// Extra environment, applied on top of the terminal-capability overlay
    pub environment: HashMap<String, String>,

    /// Working directory (defaults to the server's current directory)
    pub working_directory: Option<PathBuf>,

    /// Pty implementation
    pub backend: PtyBackend,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            shell: vec!["bash".to_string(), "-c".to_string()],
            rows: 40,
            columns: 120,
            environment: HashMap::new(),
            working_directory: None,
            backend: PtyBackend::Native,
        }
    }
}

/// Session timing configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct SessionConfig {
    /// Close a connection whose session stayed idle this long (0 disables)
    pub idle_timeout_secs: u64,

    /// How long the exit path waits for the output relay to drain
    pub relay_drain_ms: u64,

    /// How long a forced termination waits for the command to wind down
    pub terminate_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 30 * 60,
            relay_drain_ms: 1000,
            terminate_timeout_ms: 3000,
        }
    }
}

impl SessionConfig {
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }

    pub fn relay_drain(&self) -> Duration {
        Duration::from_millis(self.relay_drain_ms)
    }

    pub fn terminate_timeout(&self) -> Duration {
        Duration::from_millis(self.terminate_timeout_ms)
    }
}

/// Log output format
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when RUST_LOG is not set
    pub level: String,

    /// Output format
    pub format: LogFormat,

    /// Write a daily rolling log file here instead of stdout
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            directory: None,
        }
    }
}

impl ProxyConfig {
    /// Grace period as a duration
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.server.shutdown_grace_ms)
    }

    /// Reject configurations that cannot start a working service
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.terminal.shell.is_empty() || self.terminal.shell[0].trim().is_empty() {
            return Err(ConfigError::InvalidStructure(
                "terminal.shell must name a program".to_string(),
            ));
        }
        if self.terminal.rows == 0 || self.terminal.columns == 0 {
            return Err(ConfigError::InvalidStructure(format!(
                "terminal size must be non-zero, got {}x{}",
                self.terminal.columns, self.terminal.rows
            )));
        }
        if self.server.port == 0 {
            return Err(ConfigError::InvalidStructure(
                "server.port must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let config = ProxyConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.shutdown_grace_ms, 3000);
        assert_eq!(config.terminal.shell, vec!["bash", "-c"]);
        assert_eq!((config.terminal.rows, config.terminal.columns), (40, 120));
        assert_eq!(config.terminal.backend, PtyBackend::Native);
        assert_eq!(config.session.idle_timeout(), Some(Duration::from_secs(1800)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_idle_timeout_disables_it() {
        let session = SessionConfig {
            idle_timeout_secs: 0,
            ..SessionConfig::default()
        };
        assert_eq!(session.idle_timeout(), None);
    }

    #[test]
    fn empty_shell_is_rejected() {
        let mut config = ProxyConfig::default();
        config.terminal.shell.clear();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidStructure(_))
        ));
    }

    #[test]
    fn zero_sized_terminal_is_rejected() {
        let mut config = ProxyConfig::default();
        config.terminal.rows = 0;
        assert!(config.validate().is_err());
    }
}
