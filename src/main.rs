use clap::Parser;
use colored::*;
use tokio::sync::watch;
use tracing::info;

use livefork::cli::Args;
use livefork::config::PluginConfig;
use livefork::{logging, web};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match PluginConfig::resolve(&args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{} {}", "error:".bright_red(), e);
            std::process::exit(2);
        }
    };
    logging::init(&config.log.level)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received Ctrl+C");
            let _ = shutdown_tx.send(true);
        }
    });

    web::serve(&config, shutdown_rx).await?;
    Ok(())
}
