//! mcp-gateway binary.
//!
//! Serves MCP on stdin/stdout and relays tool requests to a WebSocket upstream:
//!
//! ```bash
//! mcp-gateway --url wss://run.example.com/my-workspace/functions/search
//! ```
//!
//! Logs go to stderr so stdout carries only JSON-RPC.

use std::io;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mcp_gateway::cli::{Cli, LogFormat};
use mcp_gateway::{ConnectionSupervisor, GatewayConfig, GatewayServer, RequestDispatcher};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let config = match GatewayConfig::from_cli(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(run(config));
    // The stdin reader sits on a blocking thread; don't wait for it.
    runtime.shutdown_timeout(Duration::from_millis(500));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mcp_gateway=info"));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Text => registry
            .with(fmt::layer().with_writer(io::stderr).with_ansi(false))
            .init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(io::stderr))
            .init(),
    }
}

async fn run(config: GatewayConfig) -> anyhow::Result<()> {
    info!(url = %config.upstream_url, "mcp-gateway starting");

    let supervisor = ConnectionSupervisor::new(config.connector(), config.reconnect.clone());
    let dispatcher = RequestDispatcher::new(supervisor.clone(), config.wait_timeout);
    let server = GatewayServer::new(dispatcher);

    // A failed first connect is retried in the background like any other.
    let initial = supervisor.clone();
    tokio::spawn(async move {
        if initial.connect().await.is_none() {
            warn!("initial upstream connection failed, continuing with reconnection");
        }
    });

    let outcome = tokio::select! {
        result = server.serve_stdio() => result.context("stdio session failed"),
        () = shutdown_signal() => {
            info!("received shutdown signal");
            Ok(())
        }
    };

    supervisor.shutdown().await;
    info!("mcp-gateway stopped");
    outcome
}

async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = interrupt => {}
        () = terminate => {}
    }
}
