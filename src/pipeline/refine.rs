// src/pipeline/refine.rs - Replace coarse coordinates with building positions
use log::debug;
use std::collections::HashMap;

use crate::matching::distance::{accept_refinement, distance_km};
use crate::matching::engine::{find_match, MatchTiers, ReferenceSet};
use crate::matching::exclusion::classify;
use crate::models::stats_models::{MatchMethod, RefinementStats};
use crate::models::{DirectoryRecord, GeoPoint, LocationPrecision, SourceTag};
use crate::sources::SourceBatch;

/// Index of building-level positions from the geographic snapshot. Only named
/// records with a building-precision coordinate are kept.
pub fn building_index<'a, I>(records: I) -> ReferenceSet
where
    I: IntoIterator<Item = &'a DirectoryRecord>,
{
    ReferenceSet::from_records(
        records
            .into_iter()
            .filter(|r| r.has_name() && r.effective_precision() == Some(LocationPrecision::Building))
            .cloned()
            .collect(),
    )
}

/// Building index over the OpenStreetMap batches, leaving out candidates the
/// exclusion filter drops so nothing is moved onto an excluded place.
pub fn snapshot_buildings<'a, I>(batches: I) -> ReferenceSet
where
    I: IntoIterator<Item = &'a SourceBatch>,
{
    building_index(
        batches
            .into_iter()
            .filter(|b| b.source == SourceTag::OpenStreetMap)
            .flat_map(|b| b.candidates.iter())
            .filter(|c| !classify(c).excluded)
            .map(|c| &c.record),
    )
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Step {
    Updated(MatchMethod),
    Unchanged,
    RejectedFar,
    Unmatched,
}

#[derive(Debug, Clone, Copy)]
struct Attempt {
    step: Step,
    ambiguous: bool,
}

/// Move each record onto its matched building, unless the building is
/// implausibly far from where the record is expected to be.
///
/// Records with their own coordinates go first. A record without one borrows
/// the position of the first record sharing its postcode, read after those
/// moves, and the borrowing repeats until no more records move. Running this
/// on its own output changes nothing.
pub fn refine_coordinates(records: &mut [DirectoryRecord], buildings: &ReferenceSet) -> RefinementStats {
    let mut stats = RefinementStats::default();
    let mut pending = Vec::new();

    for (i, record) in records.iter_mut().enumerate() {
        match record.coordinates() {
            Some(own) => {
                let attempt = refine_one(record, buildings, Some(own));
                tally(&mut stats, attempt, true);
            }
            None => pending.push(i),
        }
    }

    let mut last: HashMap<usize, Attempt> = HashMap::new();
    loop {
        let postcode_centroids = first_coordinate_per_postcode(records);
        let mut moved = false;
        pending.retain(|&i| {
            let record = &mut records[i];
            let expected = record
                .normalized_postcode()
                .and_then(|pc| postcode_centroids.get(&pc).copied());
            let attempt = refine_one(record, buildings, expected);
            if matches!(attempt.step, Step::Updated(_)) {
                moved = true;
                tally(&mut stats, attempt, false);
                last.remove(&i);
                false
            } else {
                last.insert(i, attempt);
                true
            }
        });
        if !moved {
            break;
        }
    }
    for attempt in last.into_values() {
        tally(&mut stats, attempt, false);
    }
    stats
}

fn refine_one(record: &mut DirectoryRecord, buildings: &ReferenceSet, expected: Option<GeoPoint>) -> Attempt {
    let outcome = find_match(record, buildings, expected, MatchTiers::IDENTITY);
    let (Some(index), Some(method)) = (outcome.resolved_index(), outcome.method()) else {
        return Attempt { step: Step::Unmatched, ambiguous: false };
    };
    // Several buildings on one postcode with no name to pick between them:
    // take the first and keep it on the review count.
    let ambiguous = method.is_ambiguous();
    let step = match buildings.get(index).and_then(DirectoryRecord::coordinates) {
        None => Step::Unmatched,
        Some(building) => move_onto(record, building.rounded(), expected, method),
    };
    Attempt { step, ambiguous }
}

fn move_onto(record: &mut DirectoryRecord, building: GeoPoint, expected: Option<GeoPoint>, method: MatchMethod) -> Step {
    if !accept_refinement(expected, building) {
        if let Some(centroid) = expected {
            debug!(
                "📌 Rejected {} for '{}': {:.1} km from expected location",
                method,
                record.name,
                distance_km(centroid, building)
            );
        }
        return Step::RejectedFar;
    }
    let already_there = record.coordinates() == Some(building)
        && record.effective_precision() == Some(LocationPrecision::Building);
    if already_there {
        return Step::Unchanged;
    }
    record.set_coordinates(building, LocationPrecision::Building);
    Step::Updated(method)
}

fn tally(stats: &mut RefinementStats, attempt: Attempt, had_coords: bool) {
    if attempt.ambiguous {
        stats.ambiguous += 1;
    }
    match attempt.step {
        Step::Updated(method) => *stats.updated.entry(method).or_insert(0) += 1,
        Step::Unchanged => stats.unchanged += 1,
        Step::RejectedFar => stats.rejected_far += 1,
        Step::Unmatched if had_coords => stats.kept_centroid += 1,
        Step::Unmatched => stats.no_coords += 1,
    }
}

/// The first record per normalized postcode that has a coordinate.
fn first_coordinate_per_postcode(records: &[DirectoryRecord]) -> HashMap<String, GeoPoint> {
    let mut centroids = HashMap::new();
    for record in records {
        if let (Some(pc), Some(point)) = (record.normalized_postcode(), record.coordinates()) {
            centroids.entry(pc).or_insert(point);
        }
    }
    centroids
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CandidateRecord;

    fn north_of(origin: GeoPoint, km: f64) -> GeoPoint {
        GeoPoint::new(origin.lat + (km / 6371.0_f64).to_degrees(), origin.lon)
    }

    fn directory(name: &str, postcode: Option<&str>, coords: Option<GeoPoint>) -> DirectoryRecord {
        let mut r = DirectoryRecord::new(name, SourceTag::ExistingDirectory);
        r.postcode = postcode.map(str::to_string);
        if let Some(p) = coords {
            r.set_coordinates(p, LocationPrecision::PostcodeCentroid);
        }
        r
    }

    fn building(name: &str, postcode: Option<&str>, at: GeoPoint) -> DirectoryRecord {
        let mut r = DirectoryRecord::new(name, SourceTag::OpenStreetMap);
        r.postcode = postcode.map(str::to_string);
        r.set_coordinates(at, LocationPrecision::Building);
        r
    }

    #[test]
    fn test_postcode_match_moves_onto_building() {
        let centroid = GeoPoint::new(53.795, -1.73);
        let at = GeoPoint::new(53.7961234567, -1.7312345678);
        let buildings = building_index(&[building("Masjid Noor", Some("BD3 0DT"), at)]);
        let mut records = vec![directory("Noor Mosque", Some("BD3 0DT"), Some(centroid))];

        let stats = refine_coordinates(&mut records, &buildings);

        assert_eq!(stats.updated.get(&MatchMethod::PostcodeExact), Some(&1));
        assert_eq!(records[0].latitude, Some(53.796123));
        assert_eq!(records[0].longitude, Some(-1.731235));
        assert_eq!(records[0].location_precision, Some(LocationPrecision::Building));
    }

    #[test]
    fn test_far_match_is_rejected_and_original_kept() {
        let centroid = GeoPoint::new(53.0, -1.8);
        let buildings = building_index(&[building("Jamia Ghausia", None, north_of(centroid, 12.0))]);
        let mut records = vec![directory("Jamia Ghausia", Some("ST1 1AA"), Some(centroid))];

        let stats = refine_coordinates(&mut records, &buildings);

        assert_eq!(stats.rejected_far, 1);
        assert_eq!(stats.total_updated(), 0);
        assert_eq!(records[0].coordinates(), Some(centroid.rounded()));
        assert_eq!(records[0].location_precision, Some(LocationPrecision::PostcodeCentroid));
    }

    #[test]
    fn test_record_without_coordinates_uses_postcode_neighbour() {
        let neighbour = GeoPoint::new(53.0, -1.8);
        let buildings = building_index(&[building("Faizan e Madina", None, north_of(neighbour, 30.0))]);
        let mut records = vec![
            directory("Other Place", Some("ST1 1AA"), Some(neighbour)),
            directory("Faizan e Madina", Some("ST1 1AA"), None),
        ];

        let stats = refine_coordinates(&mut records, &buildings);
        assert_eq!(stats.rejected_far, 1);
        assert_eq!(records[1].coordinates(), None);
    }

    #[test]
    fn test_no_centroid_accepts_match() {
        let at = GeoPoint::new(52.48, -1.89);
        let buildings = building_index(&[building("Ghamkol Sharif", None, at)]);
        let mut records = vec![directory("Ghamkol Sharif Masjid", None, None)];

        let stats = refine_coordinates(&mut records, &buildings);
        assert_eq!(stats.updated.get(&MatchMethod::NameUnique), Some(&1));
        assert_eq!(records[0].coordinates(), Some(at));
    }

    #[test]
    fn test_refinement_is_idempotent() {
        let centroid = GeoPoint::new(53.795, -1.73);
        let buildings = building_index(&[
            building("Masjid Noor", Some("BD3 0DT"), GeoPoint::new(53.7961, -1.7312)),
            building("Makki Masjid", Some("M13 0TA"), GeoPoint::new(53.4601, -2.2102)),
            building("Jamia Ghausia", None, north_of(centroid, 40.0)),
        ]);
        let mut records = vec![
            directory("Noor Mosque", Some("BD3 0DT"), Some(centroid)),
            directory("Makki Masjid", None, None),
            directory("Jamia Ghausia", Some("BD5 7AA"), Some(centroid)),
            directory("Not In Snapshot", Some("LS1 1AA"), Some(GeoPoint::new(53.8, -1.55))),
        ];

        let first = refine_coordinates(&mut records, &buildings);
        assert_eq!(first.total_updated(), 2);
        let after_first = records.clone();

        let second = refine_coordinates(&mut records, &buildings);
        assert_eq!(records, after_first);
        assert_eq!(second.total_updated(), 0);
        assert_eq!(second.unchanged, 2);
    }

    #[test]
    fn test_neighbour_centroid_is_stable_across_runs() {
        let centroid = GeoPoint::new(53.0, -1.8);
        let buildings = building_index(&[
            building("Alpha Masjid", None, north_of(centroid, 9.0)),
            building("Beta Masjid", None, north_of(centroid, 15.0)),
            building("Gamma Masjid", None, north_of(centroid, 24.0)),
        ]);
        let mut records = vec![
            directory("Beta Masjid", Some("ST1 1AA"), None),
            directory("Alpha Masjid", Some("ST1 1AA"), Some(centroid)),
            directory("Gamma Masjid", Some("ST1 1AA"), None),
        ];

        let first = refine_coordinates(&mut records, &buildings);
        assert_eq!(first.total_updated(), 3);
        assert_eq!(first.rejected_far, 0);
        assert_eq!(records[0].coordinates(), Some(north_of(centroid, 15.0).rounded()));
        assert_eq!(records[2].coordinates(), Some(north_of(centroid, 24.0).rounded()));
        let after_first = records.clone();

        let second = refine_coordinates(&mut records, &buildings);
        assert_eq!(records, after_first);
        assert_eq!(second.total_updated(), 0);
        assert_eq!(second.unchanged, 3);
    }

    #[test]
    fn test_neighbour_rejection_is_counted_once() {
        let centroid = GeoPoint::new(53.0, -1.8);
        let buildings = building_index(&[
            building("Alpha Masjid", None, north_of(centroid, 9.0)),
            building("Beta Masjid", None, north_of(centroid, 40.0)),
        ]);
        let mut records = vec![
            directory("Alpha Masjid", Some("ST1 1AA"), Some(centroid)),
            directory("Beta Masjid", Some("ST1 1AA"), None),
        ];

        let stats = refine_coordinates(&mut records, &buildings);
        assert_eq!(stats.total_updated(), 1);
        assert_eq!(stats.rejected_far, 1);
        assert_eq!(records[1].coordinates(), None);
    }

    #[test]
    fn test_shared_postcode_falls_back_to_first_building() {
        let first = GeoPoint::new(53.4705, -2.2305);
        let buildings = building_index(&[
            building("Makki Masjid", Some("M1 3TA"), first),
            building("Victoria Park Mosque", Some("M1 3TA"), GeoPoint::new(53.4712, -2.2291)),
        ]);
        let mut records = vec![directory("Darul Ihsan", Some("M1 3TA"), Some(GeoPoint::new(53.47, -2.23)))];

        let stats = refine_coordinates(&mut records, &buildings);

        assert_eq!(stats.updated.get(&MatchMethod::PostcodeFirst), Some(&1));
        assert_eq!(stats.ambiguous, 1);
        assert_eq!(records[0].coordinates(), Some(first));
        assert_eq!(records[0].location_precision, Some(LocationPrecision::Building));
    }

    #[test]
    fn test_shared_postcode_fallback_still_checks_distance() {
        let centroid = GeoPoint::new(53.47, -2.23);
        let buildings = building_index(&[
            building("Makki Masjid", Some("M1 3TA"), north_of(centroid, 11.0)),
            building("Victoria Park Mosque", Some("M1 3TA"), centroid),
        ]);
        let mut records = vec![directory("Darul Ihsan", Some("M1 3TA"), Some(centroid))];

        let stats = refine_coordinates(&mut records, &buildings);

        assert_eq!(stats.ambiguous, 1);
        assert_eq!(stats.rejected_far, 1);
        assert_eq!(records[0].coordinates(), Some(centroid));
    }

    #[test]
    fn test_snapshot_buildings_leave_out_excluded_places() {
        let at = GeoPoint::new(53.48, -2.24);
        let mut osm = SourceBatch::new(SourceTag::OpenStreetMap);
        osm.candidates = vec![
            CandidateRecord::new(building("Hussainiya", None, at)),
            CandidateRecord::new(building("Masjid Noor", None, at)),
        ];
        let mut listing = SourceBatch::new(SourceTag::CommunityListing);
        listing.candidates = vec![CandidateRecord::new(building("Prayer Hall", None, at))];

        let index = snapshot_buildings(&[osm, listing]);
        assert_eq!(index.len(), 1);

        let mut records = vec![directory("Hussainiya", None, Some(GeoPoint::new(53.47, -2.23)))];
        let stats = refine_coordinates(&mut records, &index);
        assert_eq!(stats.kept_centroid, 1);
        assert_eq!(records[0].coordinates(), Some(GeoPoint::new(53.47, -2.23)));
    }

    #[test]
    fn test_building_index_skips_imprecise_and_unnamed() {
        let mut approximate = building("Listing Only", None, GeoPoint::new(52.0, -1.0));
        approximate.location_precision = Some(LocationPrecision::Approximate);
        let unnamed = building("  ", None, GeoPoint::new(52.0, -1.0));
        let index = building_index(&[approximate, unnamed, building("Kept", None, GeoPoint::new(52.0, -1.0))]);
        assert_eq!(index.len(), 1);
    }
}
