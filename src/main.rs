pub mod types;
pub mod config;
pub mod data;
pub mod options;
pub mod filter;
pub mod view;
pub mod cluster;
pub mod style;
pub mod redraw;
pub mod popup;
pub mod map;
pub mod confirm;
pub mod options_form;
pub mod association_form;
pub mod import;
pub mod error;
pub mod server;
pub mod admin;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the association map
    Map {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Serve the administration forms
    Form {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Bulk import associations from a CSV, JSON or GeoJSON file
    Import {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        file: PathBuf,
        /// Only parse and validate, write nothing
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Map { config } => {
            info!("Serving map with config: {:?}", config);
            let app_config = config::AppConfig::load_from_file(config)?;
            let service = Arc::new(data::HttpDataService::new(app_config.data_service.clone()));
            server::start_map_server(app_config, service).await?;
        }
        Commands::Form { config } => {
            info!("Serving forms with config: {:?}", config);
            let app_config = config::AppConfig::load_from_file(config)?;
            let service = Arc::new(data::HttpDataService::new(app_config.data_service.clone()));
            server::start_form_server(app_config, service).await?;
        }
        Commands::Import {
            config,
            file,
            dry_run,
        } => {
            let app_config = config::AppConfig::load_from_file(config)?;
            let batch = import::ImportBatch::from_file(file)?;
            for error in &batch.errors {
                tracing::error!("Row {}: {}", error.row, error.message);
            }
            if !batch.is_valid() {
                anyhow::bail!("{} invalid rows in {:?}", batch.errors.len(), file);
            }
            if *dry_run {
                info!("{} associations parsed, nothing written", batch.associations.len());
                return Ok(());
            }
            let service = data::HttpDataService::new(app_config.data_service.clone());
            let count = batch.submit(&service).await?;
            info!("Import complete: {} associations", count);
        }
    }

    Ok(())
}
