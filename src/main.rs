//! llm-proxy HTTP server
//!
//! Starts an Axum web server that forwards chat requests to configured backends.

use clap::Parser;
use llm_proxy::{
    cli::{Cli, Command, generate_config_template},
    config::Config,
    handlers::{self, AppState},
    telemetry,
};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Some(Command::Config { output }) = cli.command {
        let template = generate_config_template();
        match output {
            Some(path) => {
                std::fs::write(&path, template)?;
                eprintln!("Wrote configuration template to {}", path);
            }
            None => print!("{}", template),
        }
        return Ok(());
    }

    let config = Config::load(cli.config.as_deref().map(Path::new))?;

    telemetry::init(&config.observability.log_level);

    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        base_url = %config.provider.base_url,
        default_provider = %config.routing.default_provider,
        rate_limit_enabled = config.rate_limit.enabled,
        auth_enabled = config.auth.enabled,
        "Starting llm-proxy"
    );

    let addr = SocketAddr::from((
        config
            .server
            .host
            .parse::<std::net::IpAddr>()
            .unwrap_or_else(|_| std::net::IpAddr::from([0, 0, 0, 0])),
        config.server.port,
    ));

    let state = AppState::new(Arc::new(config))?;
    let shutdown = state.shutdown_token().clone();
    let app = handlers::router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on {}", addr);
    tracing::info!("Health check available at http://{}/healthz", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown))
    .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Resolves on Ctrl-C, cancelling `token` so open streams finish
async fn shutdown_signal(token: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, draining connections");
    token.cancel();
}
