use std::path::PathBuf;

use anyhow::{Context, Result};
use bwlevel_core::{load_config, EngineConfig, Resolver};
use clap::Parser;
use tracing::info;

use bwlevel_server::routes;

#[derive(Parser)]
#[command(name = "bwlevel-server", about = "HTTP API for BedWars player levels")]
struct Cli {
    /// Path to config TOML file
    #[arg(long, default_value = "./config/bwlevel.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    bwlevel_server::init_json_tracing()?;

    let cli = Cli::parse();
    info!(config = %cli.config.display(), "Loading config");
    let file_config = load_config(&cli.config).with_context(|| {
        format!(
            "Config file not usable: {}. Create one or specify --config <path>",
            cli.config.display()
        )
    })?;

    let engine = EngineConfig::from_env()?.build();
    let resolver = Resolver::from_config(engine, &file_config);
    let deadline = file_config.resolver.worst_case();

    let app = routes::build_router(
        resolver.clone(),
        deadline,
        &file_config.server.allowed_origins,
    )
    // Logging layer: method + path only.
    .layer(
        tower_http::trace::TraceLayer::new_for_http().make_span_with(
            |request: &axum::http::Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    path = %request.uri().path(),
                )
            },
        ),
    );

    let addr = format!("{}:{}", file_config.server.host, file_config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("bwlevel server running at http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!(cached_players = resolver.cache().len(), "Shutting down render session");
    resolver.shutdown().await;
    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("Received shutdown signal");
}
