use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use school_density_map::config::AppConfig;
use school_density_map::data::SchoolTable;
use school_density_map::geocode::{self, GoogleGeocoder, NominatimGeocoder};
use school_density_map::{mapper, server};
use std::path::PathBuf;
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
    /// Geocode every school by search name through the Google Geocoding API
    GeocodeGoogle {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        #[arg(long, env = "GOOGLE_MAPS_API_KEY", hide_env_values = true)]
        api_key: String,
    },
    /// Fill in missing coordinates through Nominatim
    GeocodeMissing {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Join the teacher roster and render the density map and summary
    Map {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Serve the rendered map with a small query API
    Serve {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::GeocodeGoogle { config, api_key } => {
            let app_config = AppConfig::load_from_file(config)?;
            let settings = &app_config.geocode;

            let mut table = SchoolTable::load(&settings.google.input, &app_config.columns)?;
            let geocoder = GoogleGeocoder::new(&settings.google.endpoint, api_key)
                .context("Failed to build HTTP client")?;
            geocode::geocode_all(&mut table, &geocoder, settings, &mut geocode::sleep_for)?;
            table.save(&settings.google.output)?;

            info!("Done! File saved as {:?}", settings.google.output);
        }
        Commands::GeocodeMissing { config } => {
            let app_config = AppConfig::load_from_file(config)?;
            let settings = &app_config.geocode;

            let mut table = SchoolTable::load(&settings.nominatim.input, &app_config.columns)?;
            let geocoder = NominatimGeocoder::new(&settings.nominatim.endpoint, &settings.nominatim.user_agent)
                .context("Failed to build HTTP client")?;
            geocode::fill_missing(&mut table, &geocoder, settings, &mut geocode::sleep_for)?;
            table.save(&settings.nominatim.output)?;

            info!("Done! File saved as {:?}", settings.nominatim.output);
        }
        Commands::Map { config } => {
            let app_config = AppConfig::load_from_file(config)?;
            let outputs = mapper::run(&app_config)?;

            info!("Map saved as {:?}", outputs.map_html);
            info!("Summary statistics saved as {:?}", outputs.summary);
        }
        Commands::Serve { config } => {
            let app_config = AppConfig::load_from_file(config)?;
            let density = mapper::prepare(&app_config)?;

            // Only this command needs an async runtime; the geocoders use blocking HTTP.
            let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
            runtime.block_on(server::start_server(app_config, density.styled))?;
        }
    }

    Ok(())
}
