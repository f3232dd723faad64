/// Main entry point for the WebSocket terminal proxy
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use rs_term_proxy::app_state::AppState;
use rs_term_proxy::config::{ConfigLoader, init_logging};
use rs_term_proxy::server::{ShutdownCoordinator, bind, build_router, run_server};

/// Bridge WebSocket clients to shell commands running in pseudo-terminals
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Port to listen on (overrides the config file)
    #[arg(short, long)]
    port: Option<u16>,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, default_value_t = false)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    // Load configuration
    let mut config = match ConfigLoader::new().load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            // 日志尚未初始化，直接写 stderr
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    // 日志 guard 必须活到 main 结束
    let _log_guard = init_logging(&config.logging, cli.debug).context("initializing logging")?;

    info!(
        "Configuration loaded (config file: {:?}, listen {}:{}, {:?} backend)",
        cli.config, config.server.host, config.server.port, config.terminal.backend
    );

    let grace = config.shutdown_grace();
    // 返回错误而不是 process::exit，guard 才会把日志刷出去
    let listener = match bind(&config.server).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(
                "Failed to bind {}:{}: {}",
                config.server.host, config.server.port, e
            );
            return Err(e).with_context(|| {
                format!(
                    "failed to bind {}:{}",
                    config.server.host, config.server.port
                )
            });
        }
    };

    let app_state = AppState::new(config);
    info!("Using {} pty backend", app_state.pty_manager.backend_name());
    let coordinator = ShutdownCoordinator::new(&app_state, grace);

    let app = build_router(app_state);
    run_server(listener, app, coordinator)
        .await
        .context("serving HTTP")?;
    Ok(())
}
