// src/utils/pipeline_config.rs - Run configuration read from the environment
use log::{info, warn};
use std::env;
use std::path::PathBuf;

use crate::geocoding::postcodes_io::DEFAULT_BASE_URL;
use crate::geocoding::resolver::MAX_BATCH_SIZE;

fn env_flag(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<bool>().ok())
        .unwrap_or(default)
}

fn env_number<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// Where the directory and the source snapshots live.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub directory_path: PathBuf,
    /// Defaults to `directory_path`, i.e. the directory is replaced in place.
    pub output_path: PathBuf,
    pub report_path: PathBuf,
    pub osm_snapshot_paths: Vec<PathBuf>,
    pub flat_listing_path: Option<PathBuf>,
    pub refine_coordinates: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let directory_path = PathBuf::from("data/mosques.json");
        Self {
            output_path: directory_path.clone(),
            directory_path,
            report_path: PathBuf::from("data/reconcile_report.json"),
            osm_snapshot_paths: Vec::new(),
            flat_listing_path: None,
            refine_coordinates: true,
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let directory_path = env_path("DIRECTORY_PATH").unwrap_or(defaults.directory_path);
        let output_path = env_path("OUTPUT_PATH").unwrap_or_else(|| directory_path.clone());
        let osm_snapshot_paths = env::var("OSM_SNAPSHOT_PATHS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .collect();

        Self {
            directory_path,
            output_path,
            report_path: env_path("REPORT_PATH").unwrap_or(defaults.report_path),
            osm_snapshot_paths,
            flat_listing_path: env_path("FLAT_LISTING_PATH"),
            refine_coordinates: env_flag("REFINE_COORDINATES", defaults.refine_coordinates),
        }
    }

    pub fn log_config(&self) {
        info!("📁 Directory: {}", self.directory_path.display());
        info!("   Output: {}", self.output_path.display());
        info!("   Report: {}", self.report_path.display());
        if self.osm_snapshot_paths.is_empty() {
            warn!("🗺️  No OSM snapshot files configured (OSM_SNAPSHOT_PATHS)");
        } else {
            info!("🗺️  OSM snapshots: {:?}", self.osm_snapshot_paths);
        }
        match &self.flat_listing_path {
            Some(path) => info!("📋 Community listing: {}", path.display()),
            None => info!("📋 Community listing: not configured"),
        }
        info!(
            "📌 Coordinate refinement: {}",
            if self.refine_coordinates { "enabled" } else { "disabled" }
        );
    }
}

#[derive(Debug, Clone)]
pub struct GeocodingConfig {
    pub enabled: bool,
    pub base_url: String,
    pub batch_size: usize,
    pub batch_delay_ms: u64,
    pub timeout_secs: u64,
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: DEFAULT_BASE_URL.to_string(),
            batch_size: MAX_BATCH_SIZE,
            batch_delay_ms: 500,
            timeout_secs: 30,
        }
    }
}

impl GeocodingConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let batch_size: usize = env_number("GEOCODE_BATCH_SIZE", defaults.batch_size);
        Self {
            enabled: env_flag("GEOCODING_ENABLED", defaults.enabled),
            base_url: env::var("GEOCODER_BASE_URL")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.base_url),
            batch_size: batch_size.clamp(1, MAX_BATCH_SIZE),
            batch_delay_ms: env_number("GEOCODE_BATCH_DELAY_MS", defaults.batch_delay_ms),
            timeout_secs: env_number("GEOCODE_TIMEOUT_SECS", defaults.timeout_secs).max(1),
        }
    }

    pub fn log_config(&self) {
        if self.enabled {
            info!("🌍 Geocoding ENABLED");
            info!("   Service: {}", self.base_url);
            info!(
                "   Batches of {} with {}ms between calls, {}s timeout per call",
                self.batch_size, self.batch_delay_ms, self.timeout_secs
            );
        } else {
            info!("🌍 Geocoding DISABLED - gaps in postcode/city/coordinates stay unfilled");
        }
    }
}
