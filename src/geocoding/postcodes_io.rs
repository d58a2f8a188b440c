// src/geocoding/postcodes_io.rs - HTTP client for a postcodes.io style bulk API
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use super::{AreaLookup, GeocodingService, PostcodeLocation};
use crate::models::GeoPoint;

pub const DEFAULT_BASE_URL: &str = "https://api.postcodes.io";

pub struct PostcodesIoClient {
    http: Client,
    endpoint: Url,
}

#[derive(Serialize)]
struct BulkPostcodeRequest<'a> {
    postcodes: &'a [String],
}

#[derive(Serialize)]
struct Geolocation {
    longitude: f64,
    latitude: f64,
    limit: u32,
}

#[derive(Serialize)]
struct BulkReverseRequest {
    geolocations: Vec<Geolocation>,
}

#[derive(Deserialize)]
struct BulkResponse<T> {
    status: u16,
    #[serde(default = "Vec::new")]
    result: Vec<T>,
}

#[derive(Deserialize)]
struct PostcodeQueryResult {
    query: String,
    result: Option<PostcodeData>,
}

#[derive(Deserialize)]
struct ReverseQueryResult {
    result: Option<Vec<PostcodeData>>,
}

#[derive(Deserialize)]
struct PostcodeData {
    postcode: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    admin_district: Option<String>,
}

impl PostcodesIoClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let mut base = Url::parse(base_url)
            .with_context(|| format!("Invalid geocoder base URL: {}", base_url))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let endpoint = base
            .join("postcodes")
            .context("Failed to build postcode endpoint URL")?;
        let http = Client::builder()
            .user_agent(concat!("mosque-directory/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { http, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, body: &B) -> Result<BulkResponse<T>> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .json(body)
            .send()
            .await
            .context("Failed to send request to postcode service")?;
        if !response.status().is_success() {
            return Err(anyhow!("Postcode service returned status: {}", response.status()));
        }
        let parsed: BulkResponse<T> = response
            .json()
            .await
            .context("Failed to parse postcode service response")?;
        if parsed.status != 200 {
            return Err(anyhow!("Postcode service reported status {}", parsed.status));
        }
        Ok(parsed)
    }
}

#[async_trait]
impl GeocodingService for PostcodesIoClient {
    async fn lookup_postcodes(&self, postcodes: &[String]) -> Result<Vec<(String, PostcodeLocation)>> {
        let response = self.post(&BulkPostcodeRequest { postcodes }).await?;
        Ok(forward_results(response))
    }

    async fn reverse_geocode(&self, points: &[GeoPoint]) -> Result<Vec<Option<AreaLookup>>> {
        let request = BulkReverseRequest {
            geolocations: points
                .iter()
                .map(|p| Geolocation {
                    longitude: p.lon,
                    latitude: p.lat,
                    limit: 1,
                })
                .collect(),
        };
        let response = self.post(&request).await?;
        let mut areas = reverse_results(response);
        areas.resize(points.len(), None);
        Ok(areas)
    }
}

fn forward_results(response: BulkResponse<PostcodeQueryResult>) -> Vec<(String, PostcodeLocation)> {
    response
        .result
        .into_iter()
        .filter_map(|item| {
            let data = item.result?;
            let point = GeoPoint::new(data.latitude?, data.longitude?);
            Some((
                item.query,
                PostcodeLocation {
                    point,
                    district: data.admin_district,
                },
            ))
        })
        .collect()
}

fn reverse_results(response: BulkResponse<ReverseQueryResult>) -> Vec<Option<AreaLookup>> {
    response
        .result
        .into_iter()
        .map(|item| {
            let nearest = item.result?.into_iter().next()?;
            Some(AreaLookup {
                postcode: nearest.postcode,
                city: nearest.admin_district,
            })
        })
        .collect()
}
