use std::path::PathBuf;

use anyhow::{Context, Result};
use bwlevel_core::{load_config, EngineConfig, ResolutionView, Resolver};
use clap::Parser;
use serde::Serialize;

#[derive(Parser)]
#[command(name = "bwlevel-lookup", about = "Look up BedWars levels from the command line")]
struct Cli {
    /// Path to config TOML file
    #[arg(long, default_value = "./config/bwlevel.toml")]
    config: PathBuf,

    /// Print one JSON object per line instead of tab-separated text
    #[arg(long)]
    json: bool,

    /// Player names to resolve
    #[arg(required = true)]
    names: Vec<String>,
}

#[derive(Serialize)]
struct LookupLine<'a> {
    name: &'a str,
    #[serde(flatten)]
    view: ResolutionView,
}

#[tokio::main]
async fn main() -> Result<()> {
    bwlevel_server::init_cli_tracing()?;

    let cli = Cli::parse();
    let file_config = load_config(&cli.config)
        .with_context(|| format!("Config file not usable: {}", cli.config.display()))?;

    let engine = EngineConfig::from_env()?.build();
    let resolver = Resolver::from_config(engine, &file_config);

    let results =
        futures::future::join_all(cli.names.iter().map(|name| resolver.resolve(name))).await;

    for (name, result) in cli.names.iter().zip(results) {
        if cli.json {
            let line = LookupLine {
                name,
                view: result.into(),
            };
            println!("{}", serde_json::to_string(&line)?);
        } else {
            println!("{name}\t{result}");
        }
    }

    resolver.shutdown().await;
    Ok(())
}
