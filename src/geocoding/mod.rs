// src/geocoding/mod.rs - Postcode <-> coordinate lookups
use anyhow::Result;
use async_trait::async_trait;

use crate::models::GeoPoint;

#[cfg(test)]
pub(crate) mod fake;
pub mod postcodes_io;
pub mod resolver;

pub use postcodes_io::PostcodesIoClient;
pub use resolver::GeocodingResolver;

/// Forward lookup result for one postcode.
#[derive(Debug, Clone, PartialEq)]
pub struct PostcodeLocation {
    pub point: GeoPoint,
    /// Administrative district, e.g. "Bradford" or "City of Edinburgh".
    pub district: Option<String>,
}

/// Reverse lookup result for one point.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AreaLookup {
    pub postcode: Option<String>,
    pub city: Option<String>,
}

/// The external postcode service. One call is one batch; batching, pacing,
/// timeouts and failure accounting live in [`GeocodingResolver`].
#[async_trait]
pub trait GeocodingService: Send + Sync {
    /// Forward lookup. Returns `(postcode as queried, location)` for every
    /// postcode the service knows; unknown postcodes are simply absent.
    async fn lookup_postcodes(&self, postcodes: &[String]) -> Result<Vec<(String, PostcodeLocation)>>;

    /// Reverse lookup, positional: one entry per input point.
    async fn reverse_geocode(&self, points: &[GeoPoint]) -> Result<Vec<Option<AreaLookup>>>;
}
