use anyhow::{Result, bail};
use clap::Parser as _;
use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _};

mod cli;
mod config;
mod pipeline;

use cli::{Cli, Commands};
use config::CliConfig;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "procflow=info,procflow_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            store,
            items,
            no_save,
        } => handle_run(config, store, items, no_save).await,
    }
}

async fn handle_run(
    config: Option<std::path::PathBuf>,
    store: Option<std::path::PathBuf>,
    items: Vec<pipeline::CatalogItem>,
    no_save: bool,
) -> Result<()> {
    let config = CliConfig::load(config.as_deref())?.with_store_path(store);
    let items = if items.is_empty() {
        pipeline::demo_items()
    } else {
        items
    };

    let summary = pipeline::run(config, items, !no_save).await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if !summary.report.is_success() {
        bail!("{} procedure error(s)", summary.report.failures().len());
    }
    Ok(())
}
