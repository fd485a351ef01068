use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::pipeline::CatalogItem;

#[derive(Parser)]
#[command(name = "procflow")]
#[command(about = "Run a store import pipeline on the procedure engine", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Load the store, insert the items it does not hold yet, print a run report")]
    Run {
        #[arg(short, long, help = "JSON config file (queue and store settings)")]
        config: Option<PathBuf>,

        #[arg(short, long, help = "Persist to this JSON document instead of memory")]
        store: Option<PathBuf>,

        #[arg(
            short,
            long = "item",
            value_parser = parse_item,
            help = "Item to import as ID=NAME; repeatable"
        )]
        items: Vec<CatalogItem>,

        #[arg(long, help = "Stage the inserts without committing them")]
        no_save: bool,
    },
}

fn parse_item(raw: &str) -> Result<CatalogItem, String> {
    let (id, name) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected ID=NAME, got `{raw}`"))?;
    if id.is_empty() {
        return Err(format!("empty id in `{raw}`"));
    }
    Ok(CatalogItem {
        id: id.to_string(),
        name: name.to_string(),
    })
}
