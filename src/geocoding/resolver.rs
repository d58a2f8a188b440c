// src/geocoding/resolver.rs - Batched, paced, fault-tolerant geocoding
use anyhow::Result;
use log::{debug, info, warn};
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};

use super::{AreaLookup, GeocodingService, PostcodeLocation};
use crate::matching::normalize::{clean_city, format_postcode, normalize_postcode};
use crate::models::stats_models::GeocodeStats;
use crate::models::GeoPoint;
use crate::utils::pipeline_config::GeocodingConfig;

/// Hard ceiling the postcode service accepts per bulk call.
pub const MAX_BATCH_SIZE: usize = 100;
pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_millis(500);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct GeocodingResolver {
    service: Arc<dyn GeocodingService>,
    batch_size: usize,
    batch_delay: Duration,
    request_timeout: Duration,
    stats: GeocodeStats,
}

impl GeocodingResolver {
    pub fn new(service: Arc<dyn GeocodingService>) -> Self {
        Self {
            service,
            batch_size: MAX_BATCH_SIZE,
            batch_delay: DEFAULT_BATCH_DELAY,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            stats: GeocodeStats::default(),
        }
    }

    pub fn from_config(service: Arc<dyn GeocodingService>, config: &GeocodingConfig) -> Self {
        Self::new(service)
            .with_batch_size(config.batch_size)
            .with_batch_delay(Duration::from_millis(config.batch_delay_ms))
            .with_request_timeout(Duration::from_secs(config.timeout_secs))
    }

    /// Clamped to `1..=MAX_BATCH_SIZE`.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.clamp(1, MAX_BATCH_SIZE);
        self
    }

    pub fn with_batch_delay(mut self, delay: Duration) -> Self {
        self.batch_delay = delay;
        self
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn stats(&self) -> &GeocodeStats {
        &self.stats
    }

    /// Forward lookup. Keys of the returned map are normalized postcodes;
    /// postcodes the service does not know (or whose batch failed) are absent.
    pub async fn resolve_coordinates(
        &mut self,
        postcodes: &BTreeSet<String>,
    ) -> HashMap<String, PostcodeLocation> {
        let unique: BTreeSet<String> = postcodes
            .iter()
            .map(|pc| normalize_postcode(pc))
            .filter(|pc| !pc.is_empty())
            .collect();
        let queries: Vec<String> = unique
            .iter()
            .map(|pc| format_postcode(pc).unwrap_or_else(|| pc.clone()))
            .collect();

        let mut resolved = HashMap::with_capacity(queries.len());
        if queries.is_empty() {
            return resolved;
        }
        let total_batches = queries.len().div_ceil(self.batch_size);
        info!(
            "🌍 Forward geocoding {} postcodes in {} batches (batch size: {})",
            queries.len(),
            total_batches,
            self.batch_size
        );

        for (batch_idx, chunk) in queries.chunks(self.batch_size).enumerate() {
            if batch_idx > 0 {
                self.pace().await;
            }
            self.stats.postcodes_requested += chunk.len();
            let service = Arc::clone(&self.service);
            let label = format!("postcode batch {}/{}", batch_idx + 1, total_batches);
            let Some(found) = self.guarded(&label, service.lookup_postcodes(chunk)).await else {
                continue;
            };
            for (query, mut location) in found {
                location.district = location
                    .district
                    .as_deref()
                    .map(clean_city)
                    .filter(|c| !c.is_empty());
                if resolved.insert(normalize_postcode(&query), location).is_none() {
                    self.stats.postcodes_resolved += 1;
                }
            }
        }
        debug!("🌍 Resolved {}/{} postcodes", resolved.len(), queries.len());
        resolved
    }

    /// Reverse lookup, positional. A point in a failed batch yields `None`.
    pub async fn resolve_addresses(&mut self, points: &[GeoPoint]) -> Vec<Option<AreaLookup>> {
        let mut resolved: Vec<Option<AreaLookup>> = vec![None; points.len()];
        if points.is_empty() {
            return resolved;
        }
        let total_batches = points.len().div_ceil(self.batch_size);
        info!(
            "🌍 Reverse geocoding {} points in {} batches (batch size: {})",
            points.len(),
            total_batches,
            self.batch_size
        );

        for (batch_idx, chunk) in points.chunks(self.batch_size).enumerate() {
            if batch_idx > 0 {
                self.pace().await;
            }
            self.stats.points_requested += chunk.len();
            let service = Arc::clone(&self.service);
            let label = format!("reverse batch {}/{}", batch_idx + 1, total_batches);
            let Some(found) = self.guarded(&label, service.reverse_geocode(chunk)).await else {
                continue;
            };
            let offset = batch_idx * self.batch_size;
            for (i, area) in found.into_iter().take(chunk.len()).enumerate() {
                let area = area.map(|a| AreaLookup {
                    postcode: a.postcode.as_deref().and_then(format_postcode),
                    city: a.city.as_deref().map(clean_city).filter(|c| !c.is_empty()),
                });
                if let Some(area) = area.filter(|a| a.postcode.is_some() || a.city.is_some()) {
                    self.stats.points_resolved += 1;
                    resolved[offset + i] = Some(area);
                }
            }
        }
        resolved
    }

    pub async fn resolve_address(&mut self, lat: f64, lon: f64) -> Option<AreaLookup> {
        self.resolve_addresses(&[GeoPoint::new(lat, lon)])
            .await
            .pop()
            .flatten()
    }

    async fn pace(&self) {
        if !self.batch_delay.is_zero() {
            sleep(self.batch_delay).await;
        }
    }

    /// Runs one service call under the request timeout. Failures degrade to
    /// `None` and are counted; they never abort the run.
    async fn guarded<T, F>(&mut self, label: &str, call: F) -> Option<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.stats.batches += 1;
        match timeout(self.request_timeout, call).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                self.stats.failed_batches += 1;
                warn!("🌍 ⚠️  Geocoding {} failed, continuing without it: {}", label, e);
                None
            }
            Err(_) => {
                self.stats.failed_batches += 1;
                warn!(
                    "🌍 ⏰ Geocoding {} timed out after {:?}, continuing without it",
                    label, self.request_timeout
                );
                None
            }
        }
    }
}
