mod analysis;
mod benchmark;
mod classifier;
mod cli;
mod coin_gecko;
mod config;
mod crypto_compare;
mod detector;
mod error;
mod indicators;
mod models;
mod notifier;
mod price_source;
mod scanner;
mod storage_utils;
mod store;
mod symbol_resolver;
mod table;

use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = cli::Cli::parse();
    if let Err(e) = cli::run(cli).await {
        eprintln!("Error: {:#}", e);
        return Err(e);
    }
    Ok(())
}
