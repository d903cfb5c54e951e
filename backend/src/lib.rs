pub mod config;
pub mod error;
pub mod geocoding;
pub mod models;
pub mod routing;

use std::sync::Arc;

use axum::{
    Json, Router as HttpRouter,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::Config;
use crate::error::{ApiFailure, api_error};
use crate::geocoding::{Geocoder, GeocodingError, NominatimGeocoder};
use crate::models::{
    ApiError, BoundingBox, Coordinate, GeocodeResponse, RouteRequest, RouteResponse,
    SUGGESTION_LIMIT,
};
use crate::routing::{OpenRouteServiceRouter, Router, RoutingError};

#[derive(Clone)]
pub struct AppState {
    pub geocoder: Arc<dyn Geocoder>,
    pub router: Arc<dyn Router>,
}

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("invalid configuration: {0}")]
    Config(#[from] config::ConfigError),
    #[error(transparent)]
    Geocoding(#[from] GeocodingError),
    #[error(transparent)]
    Routing(#[from] RoutingError),
}

impl AppState {
    /// Build the production clients from configuration.
    pub fn from_config(config: &Config) -> Result<Self, StartupError> {
        config.validate()?;
        if config.api_key().is_none() {
            tracing::warn!("ORS_API_KEY is not set, /api/route will answer 503");
        }
        Ok(Self {
            geocoder: Arc::new(NominatimGeocoder::new(config)?),
            router: Arc::new(OpenRouteServiceRouter::new(config)?),
        })
    }
}

pub fn create_router(state: AppState) -> HttpRouter {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    HttpRouter::new()
        .route("/api/health", get(health_handler))
        .route("/api/geocode", get(geocode_handler))
        .route("/api/route", post(route_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
pub struct GeocodeParams {
    #[serde(default)]
    pub q: String,
    pub limit: Option<usize>,
}

async fn geocode_handler(
    State(state): State<AppState>,
    Query(params): Query<GeocodeParams>,
) -> Result<impl IntoResponse, (StatusCode, Json<ApiError>)> {
    let limit = params
        .limit
        .unwrap_or(SUGGESTION_LIMIT)
        .clamp(1, SUGGESTION_LIMIT);
    tracing::info!("geocode request q={:?} limit={limit}", params.q);

    let places = state
        .geocoder
        .search(&params.q, limit)
        .await
        .map_err(|err| api_error(err.into()))?;

    Ok(Json(GeocodeResponse { places }))
}

async fn route_handler(
    State(state): State<AppState>,
    Json(req): Json<RouteRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<ApiError>)> {
    tracing::info!("route request: {:?} -> {:?}", req.from, req.to);
    check_coordinate("from", req.from).map_err(api_error)?;
    check_coordinate("to", req.to).map_err(api_error)?;

    let route = state
        .router
        .route(req.from, req.to)
        .await
        .map_err(|err| api_error(err.into()))?;

    if route.path.len() < 2 {
        tracing::warn!("routing provider returned no usable path");
    }
    let bounds = BoundingBox::from_points(&route.path);

    Ok(Json(RouteResponse {
        path: route.path,
        distance_km: route.distance_km,
        bounds,
    }))
}

fn check_coordinate(role: &'static str, coord: Coordinate) -> Result<(), ApiFailure> {
    if coord.is_valid() {
        Ok(())
    } else {
        Err(ApiFailure::InvalidCoordinate {
            role,
            lat: coord.lat,
            lon: coord.lon,
        })
    }
}
