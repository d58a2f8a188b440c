// src/models/record.rs
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::matching::normalize::normalize_postcode;

/// Category assigned by the exclusion filter. Existing records without a
/// `type` key are mosques.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    #[default]
    Mosque,
    PrayerRoom,
    CommunityCentre,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Mosque => "mosque",
            Category::PrayerRoom => "prayer_room",
            Category::CommunityCentre => "community_centre",
        }
    }
}

/// Which ingestion source produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SourceTag {
    #[default]
    ExistingDirectory,
    OpenStreetMap,
    CommunityListing,
}

impl SourceTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceTag::ExistingDirectory => "existing_directory",
            SourceTag::OpenStreetMap => "open_street_map",
            SourceTag::CommunityListing => "community_listing",
        }
    }
}

/// How precise a stored coordinate is. Ordered from worst to best so that
/// "never degrade" is a plain comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationPrecision {
    Approximate,
    PostcodeCentroid,
    Building,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Rounded to 6 decimal places, the precision the directory stores.
    pub fn rounded(&self) -> Self {
        Self {
            lat: round_coord(self.lat),
            lon: round_coord(self.lon),
        }
    }
}

pub fn round_coord(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

/// One physical place of worship.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryRecord {
    pub name: String,
    #[serde(default, deserialize_with = "empty_as_none", skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none", skip_serializing_if = "Option::is_none")]
    pub postcode: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none", skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(rename = "lat", default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(rename = "lon", default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(rename = "type", default)]
    pub category: Category,
    #[serde(rename = "has_timetable", alias = "has_canonical_page", default)]
    pub has_canonical_page: bool,
    #[serde(rename = "source", default)]
    pub source_tag: SourceTag,
    #[serde(default, deserialize_with = "empty_as_none", skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none", skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_precision: Option<LocationPrecision>,
    /// Presentation keys (slug, colours, tags, ...) carried through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DirectoryRecord {
    pub fn new(name: impl Into<String>, source_tag: SourceTag) -> Self {
        Self {
            name: name.into(),
            address: None,
            postcode: None,
            city: None,
            latitude: None,
            longitude: None,
            category: Category::Mosque,
            has_canonical_page: false,
            source_tag,
            phone: None,
            website: None,
            location_precision: None,
            extra: Map::new(),
        }
    }

    pub fn coordinates(&self) -> Option<GeoPoint> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some(GeoPoint::new(lat, lon)),
            _ => None,
        }
    }

    pub fn set_coordinates(&mut self, point: GeoPoint, precision: LocationPrecision) {
        let rounded = point.rounded();
        self.latitude = Some(rounded.lat);
        self.longitude = Some(rounded.lon);
        self.location_precision = Some(precision);
    }

    /// Precision of the stored coordinate. A coordinate with no recorded
    /// precision came from an earlier postcode lookup.
    pub fn effective_precision(&self) -> Option<LocationPrecision> {
        self.coordinates()
            .map(|_| self.location_precision.unwrap_or(LocationPrecision::PostcodeCentroid))
    }

    pub fn normalized_postcode(&self) -> Option<String> {
        self.postcode
            .as_deref()
            .map(normalize_postcode)
            .filter(|pc| !pc.is_empty())
    }

    pub fn has_name(&self) -> bool {
        !self.name.trim().is_empty()
    }
}

/// On-disk shape of the canonical directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectoryFile {
    #[serde(rename = "mosques", default)]
    pub records: Vec<DirectoryRecord>,
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty()))
}
