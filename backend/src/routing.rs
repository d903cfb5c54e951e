//! Two-point routing against an OpenRouteService-compatible directions API.
//!
//! The provider speaks GeoJSON, so coordinates cross this boundary as
//! `[lon, lat]` pairs and are swapped back into [`Coordinate`] order here.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::config::Config;
use crate::geocoding::retry_after;
use crate::models::Coordinate;

const EARTH_RADIUS_KM: f64 = 6_371.0;

#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("no routing API key configured")]
    MissingApiKey,
    #[error("routing connection failed: {0}")]
    ConnectionFailed(String),
    #[error("routing request failed: {0}")]
    RequestFailed(String),
    #[error("routing rate limit exceeded")]
    RateLimited { retry_after_secs: Option<u64> },
    #[error("routing request timed out")]
    Timeout,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Route {
    /// Empty when the provider found nothing usable.
    pub path: Vec<Coordinate>,
    pub distance_km: f64,
}

#[async_trait]
pub trait Router: Send + Sync {
    async fn route(&self, from: Coordinate, to: Coordinate) -> Result<Route, RoutingError>;
}

pub struct OpenRouteServiceRouter {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DirectionsBody {
    pub coordinates: [[f64; 2]; 2],
}

impl DirectionsBody {
    pub fn new(from: Coordinate, to: Coordinate) -> Self {
        Self {
            coordinates: [from.to_lon_lat(), to.to_lon_lat()],
        }
    }
}

impl OpenRouteServiceRouter {
    pub fn new(config: &Config) -> Result<Self, RoutingError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| RoutingError::ConnectionFailed(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/v2/directions/{}/geojson",
                config.ors_url.trim_end_matches('/'),
                config.ors_profile.trim()
            ),
            api_key: config.api_key(),
        })
    }
}

#[async_trait]
impl Router for OpenRouteServiceRouter {
    #[tracing::instrument(skip(self))]
    async fn route(&self, from: Coordinate, to: Coordinate) -> Result<Route, RoutingError> {
        let api_key = self.api_key.as_deref().ok_or(RoutingError::MissingApiKey)?;

        let response = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::AUTHORIZATION, api_key)
            .json(&DirectionsBody::new(from, to))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(RoutingError::RateLimited {
                retry_after_secs: retry_after(&response),
            });
        }
        if !status.is_success() {
            return Err(RoutingError::RequestFailed(format!("HTTP {status}")));
        }

        let body = response.text().await.map_err(transport_error)?;
        let route = parse_directions(&body);
        tracing::debug!(
            points = route.path.len(),
            distance_km = route.distance_km,
            "routing result"
        );
        Ok(route)
    }
}

fn transport_error(err: reqwest::Error) -> RoutingError {
    if err.is_timeout() {
        RoutingError::Timeout
    } else {
        RoutingError::ConnectionFailed(err.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    geometry: Option<Geometry>,
    properties: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    #[serde(default)]
    coordinates: Vec<Value>,
}

/// Parse a GeoJSON directions reply. Anything unusable yields an empty route.
pub fn parse_directions(body: &str) -> Route {
    let collection: FeatureCollection = match serde_json::from_str(body) {
        Ok(collection) => collection,
        Err(err) => {
            tracing::warn!("routing reply is malformed ({err}), treating as empty");
            return Route::default();
        }
    };

    let Some(feature) = collection.features.into_iter().next() else {
        return Route::default();
    };

    let path: Vec<Coordinate> = feature
        .geometry
        .map(|g| g.coordinates)
        .unwrap_or_default()
        .iter()
        .filter_map(lon_lat_pair)
        .filter(|c| c.is_valid())
        .collect();

    if path.is_empty() {
        return Route::default();
    }

    let distance_km = feature
        .properties
        .as_ref()
        .and_then(|p| p.pointer("/summary/distance"))
        .and_then(Value::as_f64)
        .filter(|metres| metres.is_finite() && *metres >= 0.0)
        .map(|metres| metres / 1_000.0)
        .unwrap_or_else(|| approximate_distance_km(&path));

    Route { path, distance_km }
}

/// GeoJSON positions may carry a third (elevation) value; only the first two matter.
fn lon_lat_pair(value: &Value) -> Option<Coordinate> {
    let items = value.as_array()?;
    let lon = items.first()?.as_f64()?;
    let lat = items.get(1)?.as_f64()?;
    Some(Coordinate::from_lon_lat([lon, lat]))
}

pub fn approximate_distance_km(path: &[Coordinate]) -> f64 {
    path.windows(2).map(|w| haversine_km(w[0], w[1])).sum()
}

pub fn haversine_km(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();

    let sin_dlat = (dlat / 2.0).sin();
    let sin_dlon = (dlon / 2.0).sin();

    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon;
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}
