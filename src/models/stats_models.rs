// src/models/stats_models.rs
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::record::{Category, SourceTag};

/// Which cascade tier produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    PostcodeExact,
    PostcodeName,
    /// Several references share the postcode and none shares the name.
    PostcodeFirst,
    NameUnique,
    NameNearest,
    OutwardFuzzy,
    CoordProximity,
}

impl MatchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchMethod::PostcodeExact => "postcode_exact",
            MatchMethod::PostcodeName => "postcode_name",
            MatchMethod::PostcodeFirst => "postcode_first",
            MatchMethod::NameUnique => "name_unique",
            MatchMethod::NameNearest => "name_nearest",
            MatchMethod::OutwardFuzzy => "outward_fuzzy",
            MatchMethod::CoordProximity => "coord_proximity",
        }
    }

    pub fn is_ambiguous(&self) -> bool {
        matches!(self, MatchMethod::PostcodeFirst)
    }
}

impl std::fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    MissingName,
}

/// Per-source counts for one reconciliation batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSummary {
    pub source: SourceTag,
    pub received: usize,
    pub skipped_malformed: usize,
    pub invalid_postcodes_cleared: usize,
    pub excluded: BTreeMap<String, usize>,
    pub merged: BTreeMap<MatchMethod, usize>,
    pub ambiguous: usize,
    pub appended: usize,
    pub appended_by_category: BTreeMap<Category, usize>,
}

impl SourceSummary {
    pub fn new(source: SourceTag) -> Self {
        Self {
            source,
            received: 0,
            skipped_malformed: 0,
            invalid_postcodes_cleared: 0,
            excluded: BTreeMap::new(),
            merged: BTreeMap::new(),
            ambiguous: 0,
            appended: 0,
            appended_by_category: BTreeMap::new(),
        }
    }

    pub fn total_excluded(&self) -> usize {
        self.excluded.values().sum()
    }

    pub fn total_merged(&self) -> usize {
        self.merged.values().sum()
    }
}

/// A merge decision an operator should look at.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewItem {
    pub source: SourceTag,
    pub candidate_name: String,
    pub candidate_postcode: Option<String>,
    pub chosen_name: String,
    pub alternatives: Vec<String>,
    /// Jaro-Winkler similarity of the normalized names.
    pub name_similarity: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeocodeStats {
    pub batches: usize,
    pub failed_batches: usize,
    pub postcodes_requested: usize,
    pub postcodes_resolved: usize,
    pub points_requested: usize,
    pub points_resolved: usize,
}

impl GeocodeStats {
    pub fn is_degraded(&self) -> bool {
        self.failed_batches > 0
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GapFillStats {
    pub postcodes_from_coordinates: usize,
    pub cities_from_postcode: usize,
    pub coordinates_from_postcode: usize,
    pub cities_from_coordinates: usize,
    pub still_missing_city: usize,
    pub still_missing_postcode: usize,
    pub still_missing_coordinates: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RefinementStats {
    pub updated: BTreeMap<MatchMethod, usize>,
    pub unchanged: usize,
    pub ambiguous: usize,
    pub rejected_far: usize,
    pub kept_centroid: usize,
    pub no_coords: usize,
}

impl RefinementStats {
    pub fn total_updated(&self) -> usize {
        self.updated.values().sum()
    }
}

/// Everything a run emits for audit, written next to the output directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub run_timestamp: NaiveDateTime,
    pub existing_records: usize,
    pub total_records: usize,
    pub sources: Vec<SourceSummary>,
    pub geocoding: GeocodeStats,
    pub gap_fill: GapFillStats,
    pub refinement: Option<RefinementStats>,
    pub review: Vec<ReviewItem>,
    pub category_totals: BTreeMap<Category, usize>,
    pub signature: String,
}
