use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use helix_search::{Config, StorageType};

mod index;
mod put;
mod search;
mod serve;

#[derive(Parser)]
#[command(name = "helix-search")]
#[command(about = "Elasticsearch-compatible search over local tantivy indices")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Load configuration from this file only")]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, help = "Output as JSON")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Serve the HTTP API")]
    Serve {
        #[arg(long, help = "Address to listen on (overrides server.bind)")]
        bind: Option<std::net::SocketAddr>,
    },

    #[command(about = "Manage indices")]
    Index {
        #[command(subcommand)]
        command: IndexCommands,
    },

    #[command(about = "Run a search request body against one or more indices")]
    Search {
        #[arg(long, help = "Comma-separated index names (default: all indices)")]
        index: Option<String>,

        #[arg(default_value = "{}", help = "Search request body (JSON)")]
        body: String,
    },

    #[command(about = "Add or replace a document")]
    Put {
        #[arg(help = "Target index")]
        index: String,

        #[arg(help = "Document source (JSON object)")]
        source: String,

        #[arg(long, help = "Document id (generated when omitted)")]
        id: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum IndexCommands {
    #[command(about = "Create an index")]
    Create {
        #[arg(help = "Index name")]
        name: String,

        #[arg(long, help = "Storage type: disk or memory")]
        storage: Option<StorageType>,

        #[arg(long, help = "Number of shards")]
        shards: Option<usize>,
    },

    #[command(about = "List indices")]
    List,

    #[command(about = "Delete an index and its data")]
    Delete {
        #[arg(help = "Index name")]
        name: String,
    },
}

pub async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::load().context("failed to load config")?,
    };
    match cli.command {
        Commands::Serve { bind } => serve::run(config, bind).await,
        Commands::Index { command } => index::run(&config, command, cli.json),
        Commands::Search { index, body } => search::run(config, index.as_deref(), &body, cli.json).await,
        Commands::Put { index, source, id } => put::run(&config, &index, &source, id, cli.json),
    }
}
