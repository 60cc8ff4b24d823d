use std::{process, sync::Arc};

use clap::Parser;
use log::{error, info};

use storimp::{initialize_logger, App, Cli, Config, FileStore, Result};

async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(store_path) = cli.store {
        config.store_path = store_path;
    }

    let store = Arc::new(FileStore::open(config.store_path.clone())?);
    let app = App::new(store, config, cli.verbose);
    app.run(cli.command).await
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    initialize_logger(cli.verbose);

    info!("Application starting up");

    if let Err(e) = run(cli).await {
        error!("{}", e);
        eprintln!("Error: {}", e);
        process::exit(1);
    }

    info!("Application shutting down");
}
