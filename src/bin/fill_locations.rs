// src/bin/fill_locations.rs
//
// Fill missing city, coordinates and postcode on an existing directory from
// the postcode service, without reconciling any new source.
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use directory_lib::geocoding::{GeocodingResolver, PostcodesIoClient};
use directory_lib::models::stats_models::GapFillStats;
use directory_lib::pipeline::enrich::{fill_from_postcodes, fill_gaps};
use directory_lib::utils::env::load_env;
use directory_lib::utils::get_memory_usage;
use directory_lib::utils::pipeline_config::GeocodingConfig;
use directory_lib::utils::progress_bars::logging::{ReconcileLogger, StageKind};
use directory_lib::utils::store::{load_directory, replace_directory};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct FillArgs {
    /// Directory file to fill
    #[arg(long, default_value = "data/mosques.json")]
    directory: PathBuf,

    /// Where to write the result (defaults to --directory)
    #[arg(long)]
    output: Option<PathBuf>,

    /// Postcode service base URL (overrides GEOCODER_BASE_URL)
    #[arg(long)]
    base_url: Option<String>,

    /// Items per service call, at most 100
    #[arg(long)]
    batch_size: Option<usize>,

    /// Pause between service calls in milliseconds
    #[arg(long)]
    delay_ms: Option<u64>,

    /// Only look up postcodes; skip reverse geocoding of coordinates
    #[arg(long)]
    forward_only: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    load_env();
    let args = FillArgs::parse();

    let mut config = GeocodingConfig::from_env();
    if let Some(base_url) = args.base_url {
        config.base_url = base_url;
    }
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(delay_ms) = args.delay_ms {
        config.batch_delay_ms = delay_ms;
    }
    config.log_config();

    let client = PostcodesIoClient::new(&config.base_url).context("Failed to build postcode service client")?;
    let mut resolver = GeocodingResolver::from_config(Arc::new(client), &config);

    let mut records = load_directory(&args.directory)?;
    let logger = ReconcileLogger::new(StageKind::GapFill);
    logger.log_start("standalone", records.len(), "records");

    let stats = if args.forward_only {
        let mut stats = GapFillStats::default();
        fill_from_postcodes(&mut records, &mut resolver, &mut stats).await;
        stats
    } else {
        fill_gaps(&mut records, &mut resolver).await
    };
    logger.log_gap_fill(&stats);
    logger.log_geocode_stats(resolver.stats());
    if resolver.stats().is_degraded() {
        logger.log_warning("Some lookups failed; re-run later to fill the remaining gaps");
    }

    let output = args.output.unwrap_or(args.directory);
    replace_directory(&output, &records)?;
    logger.log_completion(Some(get_memory_usage().await));
    Ok(())
}
