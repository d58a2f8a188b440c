// src/bin/refine_coordinates.rs
//
// Standalone coordinate refinement over an already reconciled directory.
// Safe to re-run: records already on their building are left as they are.
use anyhow::{bail, Result};
use clap::Parser;
use log::{info, warn};
use std::path::PathBuf;

use directory_lib::pipeline::{refine_coordinates, snapshot_buildings};
use directory_lib::sources::osm::load_snapshots;
use directory_lib::utils::env::load_env;
use directory_lib::utils::progress_bars::logging::{ReconcileLogger, StageKind};
use directory_lib::utils::store::{directory_signature, load_directory, replace_directory};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct RefineArgs {
    /// Directory file to refine
    #[arg(long, default_value = "data/mosques.json")]
    directory: PathBuf,

    /// OSM snapshot files holding building positions (repeatable)
    #[arg(long = "snapshot", required = true)]
    snapshots: Vec<PathBuf>,

    /// Where to write the refined directory (defaults to --directory)
    #[arg(long)]
    output: Option<PathBuf>,

    /// Report what would change without writing anything
    #[arg(long)]
    dry_run: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    load_env();
    let args = RefineArgs::parse();

    let mut records = load_directory(&args.directory)?;
    let batch = load_snapshots(&args.snapshots);
    let buildings = snapshot_buildings([&batch]);
    if buildings.is_empty() {
        bail!("No building positions found in {} snapshot files", args.snapshots.len());
    }

    let logger = ReconcileLogger::new(StageKind::Refinement);
    logger.log_start("standalone", records.len(), "records");
    logger.log_phase("Index", Some(&format!("{} building positions", buildings.len())));

    let before = directory_signature(&records)?;
    let stats = refine_coordinates(&mut records, &buildings);
    logger.log_refinement(&stats);

    if args.dry_run {
        warn!("🧪 Dry run: {} records would move, nothing written", stats.total_updated());
    } else if directory_signature(&records)? == before {
        info!("📌 Directory unchanged, nothing to write");
    } else {
        let output = args.output.unwrap_or(args.directory);
        replace_directory(&output, &records)?;
    }
    logger.log_completion(None);
    Ok(())
}
