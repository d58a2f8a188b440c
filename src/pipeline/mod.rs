// src/pipeline/mod.rs - One full reconciliation run
pub mod context;
pub mod enrich;
pub mod reconcile;
pub mod refine;

pub use context::{category_totals, ReconciliationContext};
pub use enrich::{fill_gaps, prefill_postcodes};
pub use reconcile::{merge_record, reconcile_batch, CandidateState};
pub use refine::{building_index, refine_coordinates, snapshot_buildings};

use anyhow::Result;
use chrono::Utc;
use log::{info, warn};
use std::time::Instant;
use uuid::Uuid;

use crate::geocoding::GeocodingResolver;
use crate::models::stats_models::{GapFillStats, GeocodeStats, RunReport};
use crate::models::DirectoryRecord;
use crate::sources::SourceBatch;
use crate::utils::progress_bars::logging::{log_pipeline_completion, log_pipeline_start, ReconcileLogger, StageKind};
use crate::utils::progress_bars::progress_config::ProgressConfig;
use crate::utils::get_memory_usage;
use crate::utils::store::directory_signature;

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub refine_coordinates: bool,
    pub progress: ProgressConfig,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            refine_coordinates: true,
            progress: ProgressConfig::default(),
        }
    }
}

/// The reconciled directory and the audit report describing how it was built.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub records: Vec<DirectoryRecord>,
    pub report: RunReport,
}

/// Reconcile `batches`, in order, into `existing`.
///
/// Batches are processed one at a time so that each candidate sees every
/// merge and append made before it. Geocoding is optional; without a
/// resolver the pre-match postcode fill and the gap fill are skipped. No
/// source or service failure aborts the run.
pub async fn run_reconciliation(
    existing: Vec<DirectoryRecord>,
    batches: Vec<SourceBatch>,
    mut resolver: Option<&mut GeocodingResolver>,
    options: &RunOptions,
) -> Result<RunOutput> {
    let start_time = Instant::now();
    let run_id = Uuid::new_v4().to_string();
    log_pipeline_start(&run_id, existing.len(), batches.len());

    let multi = options.progress.create_multi_progress();
    let buildings = snapshot_buildings(&batches);

    let mut ctx = ReconciliationContext::new(run_id.clone(), existing);
    for mut batch in batches {
        if let Some(resolver) = resolver.as_deref_mut() {
            prefill_postcodes(&mut batch, resolver).await;
        }
        let bar = options.progress.stage_bar(
            multi.as_ref(),
            batch.len() as u64,
            "📥",
            batch.source.as_str(),
        );
        reconcile_batch(&mut ctx, batch, &bar);
    }

    let existing_records = ctx.existing_records();
    let (mut records, sources, review) = ctx.into_parts();

    let gap_fill = match resolver.as_deref_mut() {
        Some(resolver) => {
            let logger = ReconcileLogger::new(StageKind::GapFill);
            logger.log_start(&run_id, records.len(), "records");
            let stats = fill_gaps(&mut records, resolver).await;
            logger.log_gap_fill(&stats);
            logger.log_completion(stage_memory(&options.progress).await);
            stats
        }
        None => {
            info!("🧩 Geocoding disabled, skipping gap fill");
            GapFillStats::default()
        }
    };

    let refinement = if !options.refine_coordinates {
        None
    } else if buildings.is_empty() {
        warn!("📌 Coordinate refinement requested but no building positions were loaded");
        None
    } else {
        let logger = ReconcileLogger::new(StageKind::Refinement);
        logger.log_start(&run_id, records.len(), "records");
        logger.log_phase("Index", Some(&format!("{} building positions", buildings.len())));
        let stats = refine_coordinates(&mut records, &buildings);
        logger.log_refinement(&stats);
        logger.log_completion(stage_memory(&options.progress).await);
        Some(stats)
    };

    let geocoding = resolver
        .as_deref()
        .map(|r| r.stats().clone())
        .unwrap_or_else(GeocodeStats::default);
    if geocoding.batches > 0 {
        ReconcileLogger::new(StageKind::GapFill).log_geocode_stats(&geocoding);
    }

    let report = RunReport {
        run_id,
        run_timestamp: Utc::now().naive_utc(),
        existing_records,
        total_records: records.len(),
        sources,
        geocoding,
        gap_fill,
        refinement,
        review,
        category_totals: category_totals(&records),
        signature: directory_signature(&records)?,
    };
    log_pipeline_completion(&report, start_time.elapsed());
    Ok(RunOutput { records, report })
}

async fn stage_memory(progress: &ProgressConfig) -> Option<u64> {
    if progress.should_show_memory() {
        Some(get_memory_usage().await)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geocoding::fake::FakeGeocoder;
    use crate::models::stats_models::MatchMethod;
    use crate::models::{CandidateRecord, Category, GeoPoint, LocationPrecision, SourceTag};
    use serde_json::Value;
    use std::sync::Arc;
    use std::time::Duration;

    fn options() -> RunOptions {
        RunOptions {
            refine_coordinates: true,
            progress: ProgressConfig::quiet(),
        }
    }

    fn record(
        name: &str,
        postcode: Option<&str>,
        source: SourceTag,
        at: Option<(f64, f64, LocationPrecision)>,
    ) -> DirectoryRecord {
        let mut r = DirectoryRecord::new(name, source);
        r.postcode = postcode.map(str::to_string);
        if let Some((lat, lon, precision)) = at {
            r.set_coordinates(GeoPoint::new(lat, lon), precision);
        }
        r
    }

    fn batch(source: SourceTag, records: Vec<DirectoryRecord>) -> SourceBatch {
        let mut batch = SourceBatch::new(source);
        batch.candidates = records.into_iter().map(CandidateRecord::new).collect();
        batch
    }

    fn existing_directory() -> Vec<DirectoryRecord> {
        vec![
            record(
                "Masjid Noor",
                Some("BD3 0DT"),
                SourceTag::ExistingDirectory,
                Some((53.795, -1.73, LocationPrecision::PostcodeCentroid)),
            ),
            record("Makki Masjid", Some("M1 3TA"), SourceTag::ExistingDirectory, None),
            record("Victoria Park Mosque", Some("M1 3TA"), SourceTag::ExistingDirectory, None),
        ]
    }

    fn incoming_batches() -> Vec<SourceBatch> {
        let mut noor = record(
            "masjid noor",
            Some("bd3 0dt"),
            SourceTag::OpenStreetMap,
            Some((53.7961, -1.7312, LocationPrecision::Building)),
        );
        noor.phone = Some("01274 000000".to_string());
        vec![
            batch(
                SourceTag::OpenStreetMap,
                vec![
                    noor,
                    record(
                        "Hussainiya",
                        None,
                        SourceTag::OpenStreetMap,
                        Some((53.48, -2.24, LocationPrecision::Building)),
                    ),
                    record("Makki Masjid", Some("M1 3TA"), SourceTag::OpenStreetMap, None),
                ],
            ),
            batch(
                SourceTag::CommunityListing,
                vec![record(
                    "University Prayer Room",
                    None,
                    SourceTag::CommunityListing,
                    Some((53.4668, -2.2339, LocationPrecision::Approximate)),
                )],
            ),
        ]
    }

    #[tokio::test]
    async fn test_full_run_without_geocoding() {
        let output = run_reconciliation(existing_directory(), incoming_batches(), None, &options())
            .await
            .unwrap();
        let report = &output.report;

        let osm = &report.sources[0];
        assert_eq!(osm.received, 3);
        assert_eq!(osm.merged.get(&MatchMethod::PostcodeExact), Some(&1));
        assert_eq!(osm.merged.get(&MatchMethod::PostcodeName), Some(&1));
        assert_eq!(osm.excluded.get("shia_keyword"), Some(&1));
        assert_eq!(osm.appended, 0);

        let listing = &report.sources[1];
        assert_eq!(listing.appended, 1);
        assert_eq!(listing.appended_by_category.get(&Category::PrayerRoom), Some(&1));

        assert_eq!(output.records.len(), 4);
        let noor = &output.records[0];
        assert_eq!(noor.phone.as_deref(), Some("01274 000000"));
        assert_eq!(noor.coordinates(), Some(GeoPoint::new(53.7961, -1.7312)));
        assert_eq!(noor.location_precision, Some(LocationPrecision::Building));

        let room = &output.records[3];
        assert_eq!(room.category, Category::PrayerRoom);
        assert_eq!(room.extra.get("slug"), Some(&Value::Null));

        assert_eq!(report.category_totals.get(&Category::Mosque), Some(&3));
        assert_eq!(report.category_totals.get(&Category::PrayerRoom), Some(&1));
        assert!(report.review.is_empty());
        assert_eq!(report.signature.len(), 64);
        assert!(report.refinement.is_some());
    }

    #[tokio::test]
    async fn test_rerun_is_stable() {
        let first = run_reconciliation(existing_directory(), incoming_batches(), None, &options())
            .await
            .unwrap();
        let second = run_reconciliation(first.records.clone(), incoming_batches(), None, &options())
            .await
            .unwrap();

        assert_eq!(second.records, first.records);
        assert_eq!(second.report.signature, first.report.signature);
        assert_eq!(second.report.sources[1].appended, 0);
        assert_ne!(second.report.run_id, first.report.run_id);
    }

    #[tokio::test]
    async fn test_distant_building_never_moves_record() {
        let centroid = (53.0, -1.8, LocationPrecision::PostcodeCentroid);
        let existing = vec![record("Jamia Ghausia", Some("ST4 1AA"), SourceTag::ExistingDirectory, Some(centroid))];
        let batches = vec![batch(
            SourceTag::OpenStreetMap,
            vec![record(
                "Jamia Ghausia",
                None,
                SourceTag::OpenStreetMap,
                Some((53.108, -1.8, LocationPrecision::Building)),
            )],
        )];

        let output = run_reconciliation(existing, batches, None, &options()).await.unwrap();

        assert_eq!(output.records.len(), 1);
        assert_eq!(output.records[0].coordinates(), Some(GeoPoint::new(53.0, -1.8)));
        let refinement = output.report.refinement.unwrap();
        assert_eq!(refinement.rejected_far, 1);
        assert_eq!(refinement.total_updated(), 0);
    }

    #[tokio::test]
    async fn test_geocoding_outage_does_not_abort_run() {
        let mut resolver = GeocodingResolver::new(Arc::new(FakeGeocoder::new().failing()))
            .with_batch_delay(Duration::ZERO);

        let output = run_reconciliation(existing_directory(), incoming_batches(), Some(&mut resolver), &options())
            .await
            .unwrap();

        assert_eq!(output.records.len(), 4);
        assert!(output.report.geocoding.is_degraded());
        assert_eq!(output.report.gap_fill.still_missing_coordinates, 2);
    }

    #[tokio::test]
    async fn test_geocoding_fills_listing_postcode_before_matching() {
        let fake = FakeGeocoder::new()
            .with_area(53.4668, -2.2339, "M13 9PL", "Manchester")
            .with_postcode("M1 3TA", 53.474, -2.236, "Manchester");
        let mut resolver = GeocodingResolver::new(Arc::new(fake)).with_batch_delay(Duration::ZERO);

        let output = run_reconciliation(existing_directory(), incoming_batches(), Some(&mut resolver), &options())
            .await
            .unwrap();

        let room = &output.records[3];
        assert_eq!(room.postcode.as_deref(), Some("M13 9PL"));
        assert_eq!(room.city.as_deref(), Some("Manchester"));
        let makki = &output.records[1];
        assert_eq!(makki.city.as_deref(), Some("Manchester"));
        assert_eq!(makki.location_precision, Some(LocationPrecision::PostcodeCentroid));
        assert_eq!(output.report.gap_fill.coordinates_from_postcode, 2);
    }
}
