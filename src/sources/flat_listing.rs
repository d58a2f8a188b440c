// src/sources/flat_listing.rs - Community flat-listing ingestion
//
// One record per line: lon,lat,"<precision>[<codes>]Name. Address. Phone"
// The file is Latin-1 encoded.
use anyhow::{Context, Result};
use csv::{ByteRecord, ReaderBuilder, Trim};
use log::{debug, info};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::path::Path;

use super::SourceBatch;
use crate::models::{
    CandidateRecord, DirectoryRecord, GeoPoint, LocationPrecision, SourceAttributes, SourceTag,
};

static DESCRIPTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^([*?]?)\[(.+?)\](.*)$").expect("listing description regex")
});

static CAPACITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)").expect("listing capacity regex"));

/// A trailing segment with at least this many digits is a phone number.
const MIN_PHONE_DIGITS: usize = 5;

/// Denomination codes, checked in order; the first present wins.
const DENOMINATION_CODES: [(&str, &str); 7] = [
    ("Shia", "shia"),
    ("Brel", "barelvi"),
    ("Deob", "deobandi"),
    ("Salf", "salafi"),
    ("Maud", "maudoodi"),
    ("Sufi", "sufi"),
    ("Arab", "arab"),
];

/// Decoded bracketed code block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingCodes {
    pub capacity: Option<u32>,
    pub women_facilities: bool,
    pub denomination: Option<&'static str>,
    pub multi_faith: bool,
    pub jumuah_only: bool,
}

pub fn decode_codes(codes: &str) -> ListingCodes {
    ListingCodes {
        capacity: CAPACITY_RE
            .captures(codes)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok()),
        women_facilities: codes.contains('W') && !codes.contains("NoW"),
        denomination: DENOMINATION_CODES
            .iter()
            .find(|(code, _)| codes.contains(code))
            .map(|(_, denomination)| *denomination),
        multi_faith: codes.to_lowercase().contains("multi"),
        jumuah_only: codes.contains('J') && !codes.contains("NJ"),
    }
}

pub fn load_flat_listing(path: &Path) -> Result<SourceBatch> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read community listing {}", path.display()))?;
    let batch = parse_flat_listing(&bytes);
    info!(
        "📋 Parsed {} listing entries from {} ({} lines rejected)",
        batch.len(),
        path.display(),
        batch.rejected
    );
    Ok(batch)
}

pub fn parse_flat_listing(bytes: &[u8]) -> SourceBatch {
    let mut batch = SourceBatch::new(SourceTag::CommunityListing);
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(bytes);

    for (line_no, row) in reader.byte_records().enumerate() {
        match row.ok().and_then(|r| parse_row(&r)) {
            Some(candidate) => batch.candidates.push(candidate),
            None => {
                debug!("📋 Rejected listing row {}", line_no + 1);
                batch.rejected += 1;
            }
        }
    }
    batch
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

fn parse_row(row: &ByteRecord) -> Option<CandidateRecord> {
    if row.len() < 3 {
        return None;
    }
    let lon: f64 = latin1(row.get(0)?).trim().parse().ok()?;
    let lat: f64 = latin1(row.get(1)?).trim().parse().ok()?;
    if !lat.is_finite() || !lon.is_finite() {
        return None;
    }
    // An unquoted description may itself contain commas.
    let description = row
        .iter()
        .skip(2)
        .map(latin1)
        .collect::<Vec<_>>()
        .join(",");
    let description = description.trim().trim_matches('"').trim();

    let caps = DESCRIPTION_RE.captures(description)?;
    let precision_marker = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
    let codes = decode_codes(caps.get(2)?.as_str());
    let (name, address, phone) = split_description(caps.get(3)?.as_str().trim());

    let mut record = DirectoryRecord::new(name, SourceTag::CommunityListing);
    record.address = address;
    record.phone = phone;
    let precision = if precision_marker == "?" {
        LocationPrecision::Approximate
    } else {
        LocationPrecision::Building
    };
    record.set_coordinates(GeoPoint::new(lat, lon), precision);
    // Carried on the record so an appended listing entry keeps them.
    if let Some(capacity) = codes.capacity {
        record.extra.insert("capacity".to_string(), Value::from(capacity));
    }
    record
        .extra
        .insert("women_facilities".to_string(), Value::from(codes.women_facilities));

    let attributes = SourceAttributes {
        denomination: codes.denomination.map(str::to_string),
        multi_faith: codes.multi_faith,
        jumuah_only: codes.jumuah_only,
        ..SourceAttributes::default()
    };
    Some(CandidateRecord::with_attributes(record, attributes))
}

/// `Name. Address. Phone`, where the address may itself contain ". ".
fn split_description(rest: &str) -> (String, Option<String>, Option<String>) {
    let segments: Vec<&str> = rest
        .split(". ")
        .map(|s| s.trim().trim_end_matches('.').trim())
        .collect();
    let name = segments.first().copied().unwrap_or_default().to_string();
    let tail = segments.get(1..).unwrap_or_default();

    let (address_parts, phone) = match tail {
        [] => (&[][..], None),
        [address] => (std::slice::from_ref(address), None),
        [address, phone] => (std::slice::from_ref(address), Some(*phone)),
        [init @ .., last] if looks_like_phone(last) => (init, Some(*last)),
        all => (all, None),
    };
    let address = address_parts
        .iter()
        .filter(|s| !s.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(", ");
    (
        name,
        (!address.is_empty()).then_some(address),
        phone.filter(|p| !p.is_empty()).map(str::to_string),
    )
}

fn looks_like_phone(segment: &str) -> bool {
    segment.chars().filter(char::is_ascii_digit).count() >= MIN_PHONE_DIGITS
}
