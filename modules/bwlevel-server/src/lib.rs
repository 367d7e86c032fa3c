pub mod routes;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

/// Filter from `RUST_LOG`, falling back to `info`.
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Structured JSON logs for the long-running server.
pub fn init_json_tracing() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .json()
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialise tracing: {e}"))
}

/// Human-readable logs on stderr, keeping stdout for results.
pub fn init_cli_tracing() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialise tracing: {e}"))
}
