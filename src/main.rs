use anyhow::{Context, Result};
use directory_lib::geocoding::{GeocodingResolver, PostcodesIoClient};
use directory_lib::pipeline::{run_reconciliation, RunOptions};
use directory_lib::sources::{flat_listing::load_flat_listing, osm::load_snapshots, SourceBatch};
use directory_lib::utils::env::load_env;
use directory_lib::utils::get_memory_usage;
use directory_lib::utils::pipeline_config::{GeocodingConfig, PipelineConfig};
use directory_lib::utils::progress_bars::progress_config::ProgressConfig;
use directory_lib::utils::store::{load_directory, replace_directory, write_json_atomic};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use std::sync::Arc;
use std::time::Instant;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging and environment
    env_logger::init();
    info!("Starting mosque directory reconciliation");
    load_env();

    let pipeline_config = PipelineConfig::from_env();
    pipeline_config.log_config();
    let geocoding_config = GeocodingConfig::from_env();
    geocoding_config.log_config();

    let progress_config = ProgressConfig::from_env();
    info!(
        "Progress tracking: enabled={}, detailed={}",
        progress_config.enabled, progress_config.detailed
    );
    let multi_progress = progress_config.create_multi_progress();

    let main_pb = multi_progress.as_ref().map(|mp| {
        let pb = mp.add(ProgressBar::new(3));
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▉▊▋▌▍▎▏  "),
        );
        pb.set_message("Loading sources...");
        pb
    });

    let start_time = Instant::now();

    // Phase 1: load the directory and every configured source
    let existing = load_directory(&pipeline_config.directory_path)?;
    let mut batches: Vec<SourceBatch> = Vec::new();
    if !pipeline_config.osm_snapshot_paths.is_empty() {
        batches.push(load_snapshots(&pipeline_config.osm_snapshot_paths));
    }
    if let Some(path) = &pipeline_config.flat_listing_path {
        match load_flat_listing(path) {
            Ok(batch) => batches.push(batch),
            // An unreadable source degrades the run instead of aborting it.
            Err(e) => warn!("📋 Skipping community listing: {:#}", e),
        }
    }
    let phase1_duration = start_time.elapsed();
    if let Some(pb) = &main_pb {
        pb.inc(1);
        pb.set_message("Reconciling...");
    }

    // Phase 2: reconcile, fill gaps, refine
    let phase2_start = Instant::now();
    let mut resolver = if geocoding_config.enabled {
        let client = PostcodesIoClient::new(&geocoding_config.base_url)
            .context("Failed to build postcode service client")?;
        Some(GeocodingResolver::from_config(Arc::new(client), &geocoding_config))
    } else {
        None
    };
    let options = RunOptions {
        refine_coordinates: pipeline_config.refine_coordinates,
        progress: progress_config.clone(),
    };
    let output = run_reconciliation(existing, batches, resolver.as_mut(), &options).await?;
    let phase2_duration = phase2_start.elapsed();
    if let Some(pb) = &main_pb {
        pb.inc(1);
        pb.set_message("Writing directory...");
    }

    // Phase 3: replace the directory and write the audit report
    replace_directory(&pipeline_config.output_path, &output.records)?;
    write_json_atomic(&pipeline_config.report_path, &output.report)
        .context("Failed to write run report")?;
    info!("📝 Run report written to {}", pipeline_config.report_path.display());
    if let Some(pb) = &main_pb {
        pb.inc(1);
        pb.finish_with_message("Reconciliation complete");
    }

    info!("=== Timing Breakdown ===");
    info!("Phase 1 (Load sources): {:.2?}", phase1_duration);
    info!("Phase 2 (Reconcile): {:.2?}", phase2_duration);
    info!("Total execution time: {:.2?}", start_time.elapsed());
    if progress_config.should_show_memory() {
        let final_memory_mb = get_memory_usage().await;
        info!("Final memory usage: {} MB", final_memory_mb);
    }
    info!("Reconciliation completed successfully!");
    Ok(())
}
