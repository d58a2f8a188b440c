// src/utils/progress_bars/logging.rs - Logging helpers for reconciliation stages
use log::{debug, info, warn};
use std::time::{Duration, Instant};

use crate::models::stats_models::{GapFillStats, GeocodeStats, RefinementStats, RunReport, SourceSummary};
use crate::models::SourceTag;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    Source(SourceTag),
    GapFill,
    Refinement,
}

#[derive(Clone)]
pub struct ReconcileLogger {
    stage_name: &'static str,
    stage_emoji: &'static str,
    start_time: Instant,
}

impl ReconcileLogger {
    pub fn new(stage: StageKind) -> Self {
        let (stage_name, stage_emoji) = match stage {
            StageKind::Source(SourceTag::ExistingDirectory) => ("DIRECTORY", "📚"),
            StageKind::Source(SourceTag::OpenStreetMap) => ("OSM", "🗺️"),
            StageKind::Source(SourceTag::CommunityListing) => ("LISTING", "📋"),
            StageKind::GapFill => ("GAP-FILL", "🧩"),
            StageKind::Refinement => ("REFINE", "📌"),
        };
        Self {
            stage_name,
            stage_emoji,
            start_time: Instant::now(),
        }
    }

    pub fn log_start(&self, run_id: &str, item_count: usize, item_kind: &str) {
        info!(
            "[{}] {} 🚀 Starting {} stage with {} {} (run ID: {})",
            self.stage_name,
            self.stage_emoji,
            self.stage_name.to_lowercase(),
            item_count,
            item_kind,
            run_id
        );
    }

    pub fn log_phase(&self, phase: &str, details: Option<&str>) {
        let elapsed = self.start_time.elapsed();
        match details {
            Some(details) => info!(
                "[{}] {} 🔄 Phase: {} - {} [+{:.1}s]",
                self.stage_name,
                self.stage_emoji,
                phase,
                details,
                elapsed.as_secs_f32()
            ),
            None => info!(
                "[{}] {} 🔄 Phase: {} [+{:.1}s]",
                self.stage_name,
                self.stage_emoji,
                phase,
                elapsed.as_secs_f32()
            ),
        }
    }

    pub fn log_source_summary(&self, summary: &SourceSummary) {
        info!(
            "[{}] {} 📊 {} received → {} merged, {} appended, {} excluded, {} skipped",
            self.stage_name,
            self.stage_emoji,
            summary.received,
            summary.total_merged(),
            summary.appended,
            summary.total_excluded(),
            summary.skipped_malformed
        );
        for (method, count) in &summary.merged {
            debug!("[{}] {}    • {}: {}", self.stage_name, self.stage_emoji, method, count);
        }
        for (reason, count) in &summary.excluded {
            debug!("[{}] {}    • excluded {}: {}", self.stage_name, self.stage_emoji, reason, count);
        }
        if summary.ambiguous > 0 {
            warn!(
                "[{}] {} ⚠️  {} ambiguous matches merged into the first candidate (see review list)",
                self.stage_name, self.stage_emoji, summary.ambiguous
            );
        }
        self.log_data_quality_issue("invalid postcodes cleared", summary.invalid_postcodes_cleared);
    }

    pub fn log_geocode_stats(&self, stats: &GeocodeStats) {
        info!(
            "[{}] {} 🌍 Geocoding: {}/{} postcodes, {}/{} points resolved over {} batches",
            self.stage_name,
            self.stage_emoji,
            stats.postcodes_resolved,
            stats.postcodes_requested,
            stats.points_resolved,
            stats.points_requested,
            stats.batches
        );
        if stats.is_degraded() {
            warn!(
                "[{}] {} ⚠️  {} geocoding batches failed; affected records keep their gaps",
                self.stage_name, self.stage_emoji, stats.failed_batches
            );
        }
    }

    pub fn log_gap_fill(&self, stats: &GapFillStats) {
        info!(
            "[{}] {} 🧩 Filled: {} postcodes from coordinates, {} cities from postcode, {} coordinates from postcode, {} cities from coordinates",
            self.stage_name,
            self.stage_emoji,
            stats.postcodes_from_coordinates,
            stats.cities_from_postcode,
            stats.coordinates_from_postcode,
            stats.cities_from_coordinates
        );
        self.log_data_quality_issue("records still missing a city", stats.still_missing_city);
        self.log_data_quality_issue("records still missing a postcode", stats.still_missing_postcode);
        self.log_data_quality_issue("records still missing coordinates", stats.still_missing_coordinates);
    }

    pub fn log_refinement(&self, stats: &RefinementStats) {
        info!(
            "[{}] {} 📌 Refined {} coordinates ({} unchanged, {} without a match)",
            self.stage_name,
            self.stage_emoji,
            stats.total_updated(),
            stats.unchanged,
            stats.kept_centroid
        );
        for (method, count) in &stats.updated {
            debug!("[{}] {}    • {}: {}", self.stage_name, self.stage_emoji, method, count);
        }
        if stats.rejected_far > 0 {
            warn!(
                "[{}] {} 🚫 Rejected {} matches more than 10 km from the expected location",
                self.stage_name, self.stage_emoji, stats.rejected_far
            );
        }
        if stats.ambiguous > 0 {
            warn!(
                "[{}] {} ⚠️  {} records share a postcode with several buildings; the first was used",
                self.stage_name, self.stage_emoji, stats.ambiguous
            );
        }
    }

    pub fn log_completion(&self, memory_mb: Option<u64>) {
        let duration = self.start_time.elapsed();
        match memory_mb {
            Some(mb) => info!(
                "[{}] {} 🎉 COMPLETED in {:.2?} ({} MB in use)",
                self.stage_name, self.stage_emoji, duration, mb
            ),
            None => info!("[{}] {} 🎉 COMPLETED in {:.2?}", self.stage_name, self.stage_emoji, duration),
        }
    }

    pub fn log_warning(&self, message: &str) {
        warn!("[{}] {} ⚠️  {}", self.stage_name, self.stage_emoji, message);
    }

    pub fn log_data_quality_issue(&self, issue_type: &str, count: usize) {
        if count > 0 {
            warn!(
                "[{}] {} ⚠️  Data quality: {} {}",
                self.stage_name, self.stage_emoji, count, issue_type
            );
        }
    }

    pub fn get_elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}

// Pipeline-level logging functions
pub fn log_pipeline_start(run_id: &str, existing_records: usize, source_count: usize) {
    info!("🚀 ===== DIRECTORY RECONCILIATION STARTING =====");
    info!("📅 Run ID: {}", run_id);
    info!("📚 Existing directory records: {}", existing_records);
    info!("📥 Source batches to reconcile: {}", source_count);
    info!("================================================");
}

pub fn log_pipeline_completion(report: &RunReport, duration: Duration) {
    info!("🎉 ===== DIRECTORY RECONCILIATION COMPLETED =====");
    info!("📅 Run ID: {}", report.run_id);
    info!("⏱️  Total Duration: {:.2?}", duration);
    info!(
        "📚 Records: {} existing → {} total",
        report.existing_records, report.total_records
    );
    for summary in &report.sources {
        info!(
            "  • {}: {} merged, {} appended, {} excluded",
            summary.source.as_str(),
            summary.total_merged(),
            summary.appended,
            summary.total_excluded()
        );
    }
    for (category, count) in &report.category_totals {
        info!("  • {}: {}", category.as_str(), count);
    }
    if !report.review.is_empty() {
        warn!("🔎 {} merge decisions queued for review", report.review.len());
    }
    if report.geocoding.is_degraded() {
        warn!(
            "🌍 Geocoding was degraded: {} of {} batches failed",
            report.geocoding.failed_batches, report.geocoding.batches
        );
    }
    info!("🔏 Directory signature: {}", report.signature);
    info!("===============================================");
}
