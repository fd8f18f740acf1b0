use std::path::PathBuf;

use clap::Parser;
use quillbin_server::{Config, Server};

#[derive(Debug, Parser)]
#[command(name = "quillbin", version, about = "Versioned text document server")]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, default_value = "quillbin.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = if args.config.exists() {
        Config::load(&args.config)?
    } else {
        let mut config = Config::default();
        config.apply_env();
        config
    };

    let level = if config.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if !args.config.exists() {
        log::warn!("Config file {} not found, using defaults", args.config.display());
    }
    log::info!("Starting {} with config: {config}", quillbin_server::build_version());

    let server = Server::new(config)?;
    server.run().await?;
    Ok(())
}
