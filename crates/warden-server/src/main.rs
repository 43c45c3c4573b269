//! # warden-server
//!
//! Serves the auth endpoints next to an application.

#![deny(unsafe_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use warden_server::AuthServer;
use warden_settings::{load_options, load_options_from_path};

/// Auth endpoint server.
#[derive(Parser, Debug)]
#[command(name = "warden-server", about = "Serve warden auth endpoints")]
struct Cli {
    /// Host to bind.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to bind (0 for auto-assign).
    #[arg(long, default_value = "3001")]
    port: u16,

    /// Auth config file. Defaults to `$WARDEN_CONFIG`, else `./warden.json`.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level when `RUST_LOG` is unset.
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit JSON log lines.
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.json_logs {
        warden_core::logging::init_json_subscriber(&cli.log_level);
    } else {
        warden_core::logging::init_subscriber(&cli.log_level);
    }

    let options = match &cli.config {
        Some(path) => load_options_from_path(path)
            .with_context(|| format!("failed to load auth config from {}", path.display()))?,
        None => load_options().context("failed to load auth config")?,
    };
    let server = Arc::new(AuthServer::new(options).context("invalid auth config")?);

    let addr: SocketAddr = format!("{}:{}", cli.host, cli.port)
        .parse()
        .with_context(|| format!("invalid bind address {}:{}", cli.host, cli.port))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(addr = %listener.local_addr()?, "warden-server listening");

    axum::serve(listener, server.router())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await
        .context("server error")?;
    Ok(())
}
