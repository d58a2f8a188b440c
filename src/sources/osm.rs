// src/sources/osm.rs - Overpass snapshot ingestion
use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;

use super::SourceBatch;
use crate::matching::normalize::extract_postcode;
use crate::models::{
    CandidateRecord, DirectoryRecord, GeoPoint, LocationPrecision, SourceAttributes, SourceTag,
};

#[derive(Debug, Default, Deserialize)]
struct OverpassSnapshot {
    #[serde(default)]
    elements: Vec<OverpassElement>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct Center {
    lat: f64,
    lon: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OverpassElement {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: i64,
    lat: Option<f64>,
    lon: Option<f64>,
    center: Option<Center>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

impl OverpassElement {
    /// Node position, or the centre Overpass computed for a way/relation.
    pub fn position(&self) -> Option<GeoPoint> {
        match (self.lat, self.lon, self.center) {
            (Some(lat), Some(lon), _) => Some(GeoPoint::new(lat, lon)),
            (_, _, Some(c)) => Some(GeoPoint::new(c.lat, c.lon)),
            _ => None,
        }
    }

    fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

/// Read every snapshot file and merge them, keeping the first occurrence of
/// each `(type, id)`. A region whose snapshot cannot be read contributes
/// nothing; the remaining regions are still used.
pub fn load_snapshots<P: AsRef<Path>>(paths: &[P]) -> SourceBatch {
    let mut snapshots = Vec::with_capacity(paths.len());
    for path in paths {
        match read_snapshot(path.as_ref()) {
            Ok(elements) => snapshots.push(elements),
            Err(e) => warn!("🗺️  Skipping snapshot: {:#}", e),
        }
    }
    let elements = merge_elements(snapshots);
    info!("🗺️  {} unique OSM elements across {} snapshots", elements.len(), paths.len());

    let mut batch = SourceBatch::new(SourceTag::OpenStreetMap);
    batch.candidates = elements.iter().map(to_candidate).collect();
    batch
}

fn read_snapshot(path: &Path) -> Result<Vec<OverpassElement>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read OSM snapshot {}", path.display()))?;
    let elements = parse_snapshot(&raw)
        .with_context(|| format!("Failed to parse OSM snapshot {}", path.display()))?;
    debug!("🗺️  {} elements in {}", elements.len(), path.display());
    Ok(elements)
}

pub fn parse_snapshot(raw: &str) -> Result<Vec<OverpassElement>> {
    let snapshot: OverpassSnapshot = serde_json::from_str(raw).context("Invalid Overpass JSON")?;
    Ok(snapshot.elements)
}

pub fn merge_elements(snapshots: Vec<Vec<OverpassElement>>) -> Vec<OverpassElement> {
    let mut seen: HashSet<(String, i64)> = HashSet::new();
    snapshots
        .into_iter()
        .flatten()
        .filter(|el| seen.insert((el.kind.clone(), el.id)))
        .collect()
}

pub fn to_candidate(el: &OverpassElement) -> CandidateRecord {
    let mut record = DirectoryRecord::new(el.tag("name").unwrap_or_default(), SourceTag::OpenStreetMap);
    record.postcode = postcode_from_tags(el);
    record.address = address_from_tags(el);
    record.city = ["addr:city", "addr:town", "addr:suburb"]
        .iter()
        .find_map(|key| el.tag(key))
        .map(str::to_string);
    record.phone = el.tag("phone").map(str::to_string);
    record.website = el.tag("website").map(str::to_string);
    if let Some(point) = el.position() {
        record.set_coordinates(point, LocationPrecision::Building);
    }

    let attributes = SourceAttributes {
        alt_name: el.tag("name:en").map(str::to_string),
        denomination: el.tag("denomination").map(str::to_string),
        description: el.tag("description").map(str::to_string),
        operator: el.tag("operator").map(str::to_string),
        ..SourceAttributes::default()
    };
    CandidateRecord::with_attributes(record, attributes)
}

fn postcode_from_tags(el: &OverpassElement) -> Option<String> {
    if let Some(pc) = el.tag("addr:postcode") {
        return Some(pc.to_uppercase());
    }
    let free_text = format!(
        "{} {}",
        el.tag("addr:full").unwrap_or_default(),
        el.tag("name").unwrap_or_default()
    );
    extract_postcode(&free_text)
}

fn address_from_tags(el: &OverpassElement) -> Option<String> {
    let mut parts = Vec::new();
    match (el.tag("addr:housenumber"), el.tag("addr:street")) {
        (Some(number), Some(street)) => parts.push(format!("{} {}", number, street)),
        (None, Some(street)) => parts.push(street.to_string()),
        (Some(number), None) => parts.push(number.to_string()),
        (None, None) => {}
    }
    if let Some(city) = el.tag("addr:city") {
        parts.push(city.to_string());
    }
    (!parts.is_empty()).then(|| parts.join(", "))
}
