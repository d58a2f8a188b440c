// src/pipeline/enrich.rs - Geocoding before and after matching
use log::debug;
use std::collections::BTreeSet;

use crate::geocoding::GeocodingResolver;
use crate::matching::normalize::format_postcode;
use crate::models::stats_models::GapFillStats;
use crate::models::{DirectoryRecord, GeoPoint, LocationPrecision};
use crate::sources::SourceBatch;

/// Reverse geocode candidates that carry a coordinate but no usable postcode,
/// so the postcode tier can fire for them. Returns how many gained a postcode.
pub async fn prefill_postcodes(batch: &mut SourceBatch, resolver: &mut GeocodingResolver) -> usize {
    let targets: Vec<(usize, GeoPoint)> = batch
        .candidates
        .iter()
        .enumerate()
        .filter(|(_, c)| c.record.has_name() && !has_valid_postcode(&c.record))
        .filter_map(|(i, c)| c.record.coordinates().map(|p| (i, p)))
        .collect();
    if targets.is_empty() {
        return 0;
    }

    let points: Vec<GeoPoint> = targets.iter().map(|(_, p)| *p).collect();
    let areas = resolver.resolve_addresses(&points).await;

    let mut filled = 0;
    for ((i, _), area) in targets.into_iter().zip(areas) {
        let Some(area) = area else { continue };
        let record = &mut batch.candidates[i].record;
        if let Some(postcode) = area.postcode {
            record.postcode = Some(postcode);
            filled += 1;
        }
        if record.city.is_none() {
            record.city = area.city;
        }
    }
    debug!("📮 Pre-match reverse geocoding gave {} candidates a postcode", filled);
    filled
}

/// Fill missing city, coordinates and postcode on every record. Only empty
/// fields are written; nothing present is overwritten.
pub async fn fill_gaps(records: &mut [DirectoryRecord], resolver: &mut GeocodingResolver) -> GapFillStats {
    let mut stats = GapFillStats::default();
    fill_from_postcodes(records, resolver, &mut stats).await;
    fill_from_coordinates(records, resolver, &mut stats).await;

    for record in records.iter() {
        stats.still_missing_city += usize::from(record.city.is_none());
        stats.still_missing_postcode += usize::from(record.postcode.is_none());
        stats.still_missing_coordinates += usize::from(record.coordinates().is_none());
    }
    stats
}

/// Forward lookup only: city and centroid coordinates from the postcode.
pub async fn fill_from_postcodes(
    records: &mut [DirectoryRecord],
    resolver: &mut GeocodingResolver,
    stats: &mut GapFillStats,
) {
    let wanted: BTreeSet<String> = records
        .iter()
        .filter(|r| r.city.is_none() || r.coordinates().is_none())
        .filter(|r| has_valid_postcode(r))
        .filter_map(|r| r.normalized_postcode())
        .collect();
    if wanted.is_empty() {
        return;
    }
    let locations = resolver.resolve_coordinates(&wanted).await;

    for record in records.iter_mut() {
        let Some(location) = record
            .normalized_postcode()
            .and_then(|pc| locations.get(&pc))
        else {
            continue;
        };
        if record.city.is_none() {
            if let Some(district) = &location.district {
                record.city = Some(district.clone());
                stats.cities_from_postcode += 1;
            }
        }
        if record.coordinates().is_none() {
            record.set_coordinates(location.point, LocationPrecision::PostcodeCentroid);
            stats.coordinates_from_postcode += 1;
        }
    }
}

/// Reverse lookup for records that have a coordinate but still lack a city
/// or postcode.
async fn fill_from_coordinates(
    records: &mut [DirectoryRecord],
    resolver: &mut GeocodingResolver,
    stats: &mut GapFillStats,
) {
    let targets: Vec<(usize, GeoPoint)> = records
        .iter()
        .enumerate()
        .filter(|(_, r)| r.city.is_none() || r.postcode.is_none())
        .filter_map(|(i, r)| r.coordinates().map(|p| (i, p)))
        .collect();
    if targets.is_empty() {
        return;
    }
    let points: Vec<GeoPoint> = targets.iter().map(|(_, p)| *p).collect();
    let areas = resolver.resolve_addresses(&points).await;

    for ((i, _), area) in targets.into_iter().zip(areas) {
        let Some(area) = area else { continue };
        let record = &mut records[i];
        if record.postcode.is_none() {
            if let Some(postcode) = area.postcode {
                record.postcode = Some(postcode);
                stats.postcodes_from_coordinates += 1;
            }
        }
        if record.city.is_none() {
            if let Some(city) = area.city {
                record.city = Some(city);
                stats.cities_from_coordinates += 1;
            }
        }
    }
}

fn has_valid_postcode(record: &DirectoryRecord) -> bool {
    record
        .postcode
        .as_deref()
        .map(|pc| format_postcode(pc).is_some())
        .unwrap_or(false)
}
