use axum::{Json, http::StatusCode};
use thiserror::Error;

use crate::geocoding::GeocodingError;
use crate::models::ApiError;
use crate::routing::RoutingError;

#[derive(Debug, Error)]
pub enum ApiFailure {
    #[error("geocoding failed: {0}")]
    Geocoding(#[from] GeocodingError),
    #[error("routing failed: {0}")]
    Routing(#[from] RoutingError),
    #[error("invalid {role} coordinate ({lat}, {lon})")]
    InvalidCoordinate { role: &'static str, lat: f64, lon: f64 },
}

impl ApiFailure {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiFailure::InvalidCoordinate { .. } => StatusCode::BAD_REQUEST,
            ApiFailure::Routing(RoutingError::MissingApiKey) => StatusCode::SERVICE_UNAVAILABLE,
            ApiFailure::Geocoding(GeocodingError::Timeout)
            | ApiFailure::Routing(RoutingError::Timeout) => StatusCode::GATEWAY_TIMEOUT,
            ApiFailure::Geocoding(_) | ApiFailure::Routing(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

/// Convert a failure into the JSON error reply every handler uses.
pub fn api_error(err: ApiFailure) -> (StatusCode, Json<ApiError>) {
    let status = err.status();
    if status.is_server_error() {
        tracing::warn!("request failed with {status}: {err}");
    } else {
        tracing::debug!("request rejected with {status}: {err}");
    }
    (
        status,
        Json(ApiError {
            message: err.to_string(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let invalid = ApiFailure::InvalidCoordinate {
            role: "from",
            lat: 91.0,
            lon: 0.0,
        };
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiFailure::from(RoutingError::MissingApiKey).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiFailure::from(GeocodingError::Timeout).status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            ApiFailure::from(GeocodingError::RateLimited {
                retry_after_secs: Some(1)
            })
            .status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_api_error_carries_message() {
        let (status, Json(body)) = api_error(ApiFailure::InvalidCoordinate {
            role: "to",
            lat: 0.0,
            lon: 200.0,
        });
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.message.contains("to"));
        assert!(body.message.contains("200"));
    }
}
