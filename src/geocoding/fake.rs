// src/geocoding/fake.rs - In-memory geocoder for tests
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::{AreaLookup, GeocodingService, PostcodeLocation};
use crate::matching::distance::within_proximity_box;
use crate::matching::normalize::normalize_postcode;
use crate::models::GeoPoint;

#[derive(Default)]
pub struct FakeGeocoder {
    postcodes: HashMap<String, PostcodeLocation>,
    areas: Vec<(GeoPoint, AreaLookup)>,
    fail: bool,
    stall: Option<Duration>,
    pub forward_calls: AtomicUsize,
    pub reverse_calls: AtomicUsize,
    pub batch_sizes: Mutex<Vec<usize>>,
}

impl FakeGeocoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_postcode(mut self, postcode: &str, lat: f64, lon: f64, district: &str) -> Self {
        self.postcodes.insert(
            normalize_postcode(postcode),
            PostcodeLocation {
                point: GeoPoint::new(lat, lon),
                district: Some(district.to_string()),
            },
        );
        self
    }

    pub fn with_area(mut self, lat: f64, lon: f64, postcode: &str, city: &str) -> Self {
        self.areas.push((
            GeoPoint::new(lat, lon),
            AreaLookup {
                postcode: Some(postcode.to_string()),
                city: Some(city.to_string()),
            },
        ));
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn stalling(mut self, delay: Duration) -> Self {
        self.stall = Some(delay);
        self
    }

    async fn behave(&self, size: usize) -> Result<()> {
        if let Ok(mut sizes) = self.batch_sizes.lock() {
            sizes.push(size);
        }
        if let Some(delay) = self.stall {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(anyhow!("service unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl GeocodingService for FakeGeocoder {
    async fn lookup_postcodes(&self, postcodes: &[String]) -> Result<Vec<(String, PostcodeLocation)>> {
        self.forward_calls.fetch_add(1, Ordering::SeqCst);
        self.behave(postcodes.len()).await?;
        Ok(postcodes
            .iter()
            .filter_map(|pc| {
                self.postcodes
                    .get(&normalize_postcode(pc))
                    .map(|loc| (pc.clone(), loc.clone()))
            })
            .collect())
    }

    async fn reverse_geocode(&self, points: &[GeoPoint]) -> Result<Vec<Option<AreaLookup>>> {
        self.reverse_calls.fetch_add(1, Ordering::SeqCst);
        self.behave(points.len()).await?;
        Ok(points
            .iter()
            .map(|p| {
                self.areas
                    .iter()
                    .find(|(at, _)| within_proximity_box(*at, *p))
                    .map(|(_, area)| area.clone())
            })
            .collect())
    }
}
