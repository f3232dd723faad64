/// PTY manager: turns client command lines into pty processes
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use crate::config::TerminalConfig;
use crate::pty::{self, AsyncPty, PtyConfig, PtyError, PtyFactory, TerminalSize};

/// PTY manager responsible for launching commands through the configured shell
pub struct PtyManager {
    factory: Arc<dyn PtyFactory>,
    shell: Vec<String>,
    size: TerminalSize,
    environment: Vec<(String, String)>,
    working_directory: Option<PathBuf>,
}

impl PtyManager {
    /// Create a new PTY manager
    pub fn new(factory: Arc<dyn PtyFactory>, terminal: &TerminalConfig) -> Self {
        // Built-in terminal hints first, configured variables override them
        let mut environment = pty::terminal_environment();
        environment.reserve(terminal.environment.len());
        for (key, value) in &terminal.environment {
            if let Some(index) = environment.iter().position(|(k, _)| k == key) {
                environment[index] = (key.clone(), value.clone());
            } else {
                environment.push((key.clone(), value.clone()));
            }
        }

        Self {
            factory,
            shell: terminal.shell.clone(),
            size: TerminalSize {
                rows: terminal.rows,
                cols: terminal.columns,
            },
            environment,
            working_directory: terminal.working_directory.clone(),
        }
    }

    /// Name of the pty backend in use
    pub fn backend_name(&self) -> &'static str {
        self.factory.name()
    }

    /// Build the pty configuration that runs `command` through the shell
    pub fn pty_config(&self, command: &str) -> Result<PtyConfig, PtyError> {
        let (program, shell_args) = self
            .shell
            .split_first()
            .ok_or_else(|| PtyError::SpawnFailed("no shell configured".to_string()))?;

        let mut args = shell_args.to_vec();
        args.push(command.to_string());

        Ok(PtyConfig {
            command: program.clone(),
            args,
            size: self.size,
            env: self.environment.clone(),
            cwd: self
                .working_directory
                .clone()
                .or_else(|| std::env::current_dir().ok()),
        })
    }

    /// Spawn `command` in a new pty
    pub async fn spawn(&self, command: &str) -> Result<Arc<dyn AsyncPty>, PtyError> {
        let config = self.pty_config(command)?;
        match self.factory.spawn(&config).await {
            Ok(pty) => {
                info!(
                    "Spawned {:?} via {} (pid {:?})",
                    command,
                    self.factory.name(),
                    pty.pid()
                );
                Ok(pty)
            }
            Err(e) => {
                error!("Failed to spawn {:?}: {}", command, e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pty::MemoryPtyFactory;

    fn manager(terminal: &TerminalConfig) -> PtyManager {
        PtyManager::new(Arc::new(MemoryPtyFactory::new()), terminal)
    }

    #[test]
    fn command_is_appended_to_the_shell_prefix() {
        let config = manager(&TerminalConfig::default())
            .pty_config("ls | wc -l")
            .unwrap();
        assert_eq!(config.command, "bash");
        assert_eq!(config.args, vec!["-c", "ls | wc -l"]);
        assert_eq!(config.size, TerminalSize { rows: 40, cols: 120 });
        assert!(config.cwd.is_some());
    }

    #[test]
    fn configured_environment_overrides_the_overlay() {
        let mut terminal = TerminalConfig::default();
        terminal
            .environment
            .insert("TERM".to_string(), "dumb".to_string());
        terminal
            .environment
            .insert("LANG".to_string(), "C.UTF-8".to_string());

        let env = manager(&terminal).pty_config("true").unwrap().env;
        let lookup = |key: &str| {
            env.iter()
                .filter(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
                .collect::<Vec<_>>()
        };
        assert_eq!(lookup("TERM"), vec!["dumb"]);
        assert_eq!(lookup("LANG"), vec!["C.UTF-8"]);
        assert_eq!(lookup("COLORTERM"), vec!["truecolor"]);
    }

    #[test]
    fn empty_shell_cannot_spawn() {
        let terminal = TerminalConfig {
            shell: vec![],
            ..TerminalConfig::default()
        };
        assert!(matches!(
            manager(&terminal).pty_config("true"),
            Err(PtyError::SpawnFailed(_))
        ));
    }

    #[tokio::test]
    async fn spawn_goes_through_the_factory() {
        let pty = manager(&TerminalConfig::default())
            .spawn("exit 3")
            .await
            .unwrap();
        assert_eq!(pty.wait().await.code(), 3);
    }
}
