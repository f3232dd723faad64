/// Configuration file loader for rs_term_proxy
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::{ConfigError, ProxyConfig};

/// Configuration loader responsible for loading and parsing configuration files
pub struct ConfigLoader;

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self
    }

    /// Load configuration.
    ///
    /// An explicit path must exist. Without one, `./config.toml` is read when
    /// present and the built-in defaults are used otherwise.
    pub fn load_config(&self, config_path: Option<&Path>) -> Result<ProxyConfig, ConfigError> {
        let config = match config_path {
            Some(path) => self.load_config_from_file(path)?,
            None => match default_config_path() {
                Some(path) if path.is_file() => {
                    info!("Using default configuration file path: {:?}", path);
                    self.load_config_from_file(&path)?
                }
                _ => {
                    info!("No configuration file found, using built-in defaults");
                    ProxyConfig::default()
                }
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path
    fn load_config_from_file(&self, path: &Path) -> Result<ProxyConfig, ConfigError> {
        info!("Loading configuration from file: {:?}", path);

        let contents = fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ConfigError::FileNotFound(path.display().to_string()),
            _ => ConfigError::FileOpenError(e),
        })?;

        self.parse_config(&contents)
    }

    /// Parse configuration from string content
    pub fn parse_config(&self, content: &str) -> Result<ProxyConfig, ConfigError> {
        let config = toml::from_str::<ProxyConfig>(content)?;
        debug!("Configuration parsed successfully: {:?}", config);
        Ok(config)
    }
}

/// Default configuration path
pub fn default_config_path() -> Option<PathBuf> {
    // 使用当前工作目录作为默认配置文件目录
    std::env::current_dir()
        .ok()
        .map(|dir| dir.join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LogFormat, PtyBackend};
    use std::io::Write;

    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let config = ConfigLoader::new()
            .parse_config(
                r#"
                [server]
                port = 9000

                [terminal]
                shell = ["sh", "-c"]
                backend = "memory"

                [terminal.environment]
                LANG = "C.UTF-8"

                [logging]
                format = "json"
                "#,
            )
            .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.terminal.shell, vec!["sh", "-c"]);
        assert_eq!(config.terminal.backend, PtyBackend::Memory);
        assert_eq!(config.terminal.rows, 40);
        assert_eq!(config.terminal.environment.get("LANG").map(String::as_str), Some("C.UTF-8"));
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.session.relay_drain_ms, 1000);
    }

    #[test]
    fn invalid_toml_is_a_parse_error() {
        let result = ConfigLoader::new().parse_config("[server\nport = ");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn explicit_missing_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        let result = ConfigLoader::new().load_config(Some(&missing));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn explicit_file_is_loaded_and_validated() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[terminal]\nshell = []").unwrap();
        let result = ConfigLoader::new().load_config(Some(file.path()));
        assert!(matches!(result, Err(ConfigError::InvalidStructure(_))));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[session]\nidle_timeout_secs = 5").unwrap();
        let config = ConfigLoader::new().load_config(Some(file.path())).unwrap();
        assert_eq!(config.session.idle_timeout_secs, 5);
    }
}
