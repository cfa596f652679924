//! importd - batch import service

#![allow(missing_docs)]

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tabular_import::Config;
use tabular_import::server::HttpServer;
use tabular_import::utils::logging::init_logging;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "importd", version, about = "Batch import service")]
struct Cli {
    /// YAML configuration file; defaults plus IMPORT_* environment variables when omitted
    #[arg(short, long, env = "IMPORT_CONFIG")]
    config: Option<PathBuf>,
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => Config::from_file(path).await?,
        None => Config::from_env()?,
    };
    init_logging(config.logging());

    info!(
        version = tabular_import::VERSION,
        git_hash = env!("GIT_HASH"),
        "Starting importd"
    );

    HttpServer::new(&config).await?.start().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    // Missing .env is fine
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
