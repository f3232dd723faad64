/// Logging bootstrap for rs_term_proxy
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::{ConfigError, LogFormat, LoggingConfig};

const LOG_FILE_PREFIX: &str = "rs_term_proxy.log";

/// Initialize the global subscriber.
///
/// `RUST_LOG` wins over the configured level; `force_debug` forces debug output.
/// Keep the returned guard alive until exit or buffered lines are lost.
pub fn init_logging(config: &LoggingConfig, force_debug: bool) -> Result<WorkerGuard, ConfigError> {
    let (writer, guard) = match &config.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, LOG_FILE_PREFIX);
            tracing_appender::non_blocking(appender)
        }
        None => tracing_appender::non_blocking(std::io::stdout()),
    };

    let filter = if force_debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&config.level))
            .map_err(|e| ConfigError::Logging(e.to_string()))?
    };

    let json = config.format == LogFormat::Json;
    let json_layer = json.then(|| {
        fmt::layer()
            .json()
            .with_current_span(false)
            .with_writer(writer.clone())
    });
    let pretty_layer = (!json).then(|| {
        fmt::layer()
            .with_ansi(config.directory.is_none())
            .with_thread_ids(true)
            .with_target(true)
            .with_writer(writer)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(pretty_layer)
        .try_init()
        .map_err(|e| ConfigError::Logging(e.to_string()))?;

    tracing::info!(format = ?config.format, force_debug, "Logging initialized");
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forced_debug_json_logging_writes_to_the_rolling_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoggingConfig {
            level: "warn".to_string(),
            format: LogFormat::Json,
            directory: Some(dir.path().to_path_buf()),
        };

        let guard = init_logging(&config, true).unwrap();
        tracing::debug!("visible only when debug is forced");
        drop(guard);

        let contents: String = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().starts_with(LOG_FILE_PREFIX))
            .map(|entry| std::fs::read_to_string(entry.path()).unwrap())
            .collect();
        assert!(contents.contains("Logging initialized"));
        assert!(contents.contains("\"force_debug\":true"));
        assert!(contents.contains("visible only when debug is forced"));

        // 全局 subscriber 只能安装一次
        assert!(matches!(
            init_logging(&config, false),
            Err(ConfigError::Logging(_))
        ));
    }
}
