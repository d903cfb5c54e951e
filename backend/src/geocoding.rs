//! Free-text place search against a Nominatim-compatible API.
//!
//! Records in the upstream answer with missing or
//! unparsable fields are dropped and a body that is not a JSON array is an
//! empty result. Only transport failures and non-2xx replies are errors.

use std::{num::NonZeroUsize, sync::Mutex, time::Duration};

use async_trait::async_trait;
use lru::LruCache;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio::time::Instant;

use crate::config::Config;
use crate::models::{BoundingBox, Coordinate, MIN_QUERY_LEN, Place};

#[derive(Debug, Error)]
pub enum GeocodingError {
    #[error("geocoding connection failed: {0}")]
    ConnectionFailed(String),
    #[error("geocoding request failed: {0}")]
    RequestFailed(String),
    #[error("geocoding rate limit exceeded")]
    RateLimited { retry_after_secs: Option<u64> },
    #[error("geocoding request timed out")]
    Timeout,
}

impl GeocodingError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, GeocodingError::RequestFailed(_))
    }
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Ranked candidates for `query`, at most `limit` of them.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Place>, GeocodingError>;
}

pub struct NominatimGeocoder {
    client: Client,
    base_url: String,
    cache: Option<Mutex<LruCache<String, Vec<Place>>>>,
    min_interval: Duration,
    last_request: tokio::sync::Mutex<Option<Instant>>,
}

impl NominatimGeocoder {
    pub fn new(config: &Config) -> Result<Self, GeocodingError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| GeocodingError::ConnectionFailed(e.to_string()))?;

        let cache = NonZeroUsize::new(config.geocode_cache_capacity)
            .map(|capacity| Mutex::new(LruCache::new(capacity)));

        Ok(Self {
            client,
            base_url: config.nominatim_url.trim_end_matches('/').to_string(),
            cache,
            min_interval: Duration::from_millis(config.geocode_min_interval_ms),
            last_request: tokio::sync::Mutex::new(None),
        })
    }

    /// Keep at most one upstream request per `min_interval`.
    async fn throttle(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                tracing::debug!(?wait, "throttling geocoding request");
                tokio::time::sleep(wait).await;
            }
        }
        *last = Some(Instant::now());
    }

    fn cached(&self, key: &str) -> Option<Vec<Place>> {
        let cache = self.cache.as_ref()?;
        let mut cache = cache.lock().ok()?;
        cache.get(key).cloned()
    }

    fn remember(&self, key: String, places: &[Place]) {
        if let Some(Ok(mut cache)) = self.cache.as_ref().map(Mutex::lock) {
            cache.put(key, places.to_vec());
        }
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    #[tracing::instrument(skip(self))]
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Place>, GeocodingError> {
        let query = query.trim();
        if query.chars().count() < MIN_QUERY_LEN || limit == 0 {
            return Ok(Vec::new());
        }

        let key = format!("{}#{limit}", query.to_lowercase());
        if let Some(places) = self.cached(&key) {
            tracing::debug!("geocoding cache hit");
            return Ok(places);
        }

        self.throttle().await;

        let url = format!("{}/search", self.base_url);
        let limit_param = limit.to_string();
        let response = self
            .client
            .get(&url)
            .query(&[("format", "json"), ("q", query), ("limit", limit_param.as_str())])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GeocodingError::Timeout
                } else {
                    GeocodingError::ConnectionFailed(e.to_string())
                }
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(GeocodingError::RateLimited {
                retry_after_secs: retry_after(&response),
            });
        }
        if !status.is_success() {
            return Err(GeocodingError::RequestFailed(format!("HTTP {status}")));
        }

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                GeocodingError::Timeout
            } else {
                GeocodingError::ConnectionFailed(e.to_string())
            }
        })?;

        let places = parse_search_results(&body, limit);
        tracing::debug!(count = places.len(), "geocoding results");
        self.remember(key, &places);
        Ok(places)
    }
}

pub(crate) fn retry_after(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

#[derive(Debug, Deserialize)]
struct RawPlace {
    display_name: Option<String>,
    lat: Option<Value>,
    lon: Option<Value>,
    boundingbox: Option<Value>,
}

/// Parse a search reply, keeping provider order and dropping unusable records.
pub fn parse_search_results(body: &str, limit: usize) -> Vec<Place> {
    let records = match serde_json::from_str::<Value>(body) {
        Ok(Value::Array(records)) => records,
        Ok(_) => {
            tracing::warn!("geocoding reply is not an array, treating as empty");
            return Vec::new();
        }
        Err(err) => {
            tracing::warn!("geocoding reply is not JSON ({err}), treating as empty");
            return Vec::new();
        }
    };

    let total = records.len();
    let places: Vec<Place> = records
        .into_iter()
        .filter_map(|record| serde_json::from_value::<RawPlace>(record).ok())
        .filter_map(to_place)
        .take(limit)
        .collect();

    if places.len() < total.min(limit) {
        tracing::warn!(
            "dropped {} malformed geocoding record(s)",
            total.min(limit) - places.len()
        );
    }
    places
}

fn to_place(raw: RawPlace) -> Option<Place> {
    let name = raw.display_name?.trim().to_string();
    if name.is_empty() {
        return None;
    }
    let coordinate = Coordinate {
        lat: loose_f64(raw.lat.as_ref()?)?,
        lon: loose_f64(raw.lon.as_ref()?)?,
    };
    if !coordinate.is_valid() {
        return None;
    }
    let bbox = raw.boundingbox.as_ref().and_then(parse_bbox);
    Some(Place::new(name, coordinate).with_bbox(bbox))
}

/// Nominatim orders the box as `[south, north, west, east]`.
fn parse_bbox(value: &Value) -> Option<BoundingBox> {
    let items = value.as_array()?;
    let [south, north, west, east] = items.as_slice() else {
        return None;
    };
    BoundingBox::new(
        loose_f64(south)?,
        loose_f64(west)?,
        loose_f64(north)?,
        loose_f64(east)?,
    )
}

/// The provider encodes numbers as strings; accept both.
fn loose_f64(value: &Value) -> Option<f64> {
    let number = match value {
        Value::String(text) => text.trim().parse().ok()?,
        Value::Number(number) => number.as_f64()?,
        _ => return None,
    };
    number.is_finite().then_some(number)
}
