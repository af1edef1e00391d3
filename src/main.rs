pub mod types;
pub mod config;
pub mod data;
pub mod geocode;
pub mod processing;
pub mod selection;
pub mod render;
pub mod server;

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, Level};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the facilities (geocoding them on first run) and serve the interactive map
    Serve {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        /// Verbose logging; the browser is not opened
        #[arg(short, long)]
        debug: bool,
    },
    /// Geocode the raw table again and rewrite the geocoded table
    Geocode {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        #[arg(short, long)]
        debug: bool,
    },
}

impl Commands {
    fn debug(&self) -> bool {
        match self {
            Commands::Serve { debug, .. } | Commands::Geocode { debug, .. } => *debug,
        }
    }
}

/// Loads the record set on the blocking pool: geocoding sleeps between requests and
/// may run for minutes. `refresh` re-geocodes the raw table regardless of the cache.
async fn load_records(app_config: &config::AppConfig, refresh: bool) -> anyhow::Result<data::LoadedDataset> {
    let store = data::RecordStore::from_config(&app_config.input, &app_config.geocoding.country);
    let mut geocoder = geocode::GeocodeCache::nominatim(&app_config.geocoding);

    let dataset = tokio::task::spawn_blocking(move || {
        if refresh {
            store.refresh(&mut geocoder)
        } else {
            store.load(&mut geocoder)
        }
    })
    .await
    .context("Record loading task failed")??;
    Ok(dataset)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.command.debug() { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).init();

    match &cli.command {
        Commands::Serve { config, debug } => {
            let app_config = config::AppConfig::load_or_default(config)?;

            let dataset = load_records(&app_config, false).await?;
            dataset.summary.log();

            let open_browser = app_config.server.open_browser && !debug;
            server::start_server(&app_config, dataset.records, open_browser).await?;
        }
        Commands::Geocode { config, .. } => {
            let app_config = config::AppConfig::load_or_default(config)?;

            let dataset = load_records(&app_config, true).await?;
            dataset.summary.log();

            info!("Geocoded table written to {:?}", app_config.input.geocoded_file);
        }
    }

    Ok(())
}
