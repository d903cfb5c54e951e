use seed::prelude::*;
use shared::{GeocodeResponse, Place, RouteRequest, RouteResponse, SUGGESTION_LIMIT};

use crate::console_debug;

pub fn api_root() -> String {
    if let Some(url) = option_env!("FRONTEND_API_ROOT") {
        return url.trim_end_matches('/').to_string();
    }
    "http://localhost:8080/api".to_string()
}

pub fn geocode_url(root: &str, query: &str) -> String {
    let encoded: String = js_sys::encode_uri_component(query.trim()).into();
    format!("{root}/geocode?q={encoded}&limit={SUGGESTION_LIMIT}")
}

/// Suggestions for `query`. A reply that does not decode is an empty list,
/// transport and status failures are errors.
pub async fn geocode(query: String) -> Result<Vec<Place>, String> {
    console_debug(&format!("[frontend] geocode q={query:?}"));
    let response = Request::new(geocode_url(&api_root(), &query))
        .fetch()
        .await
        .map_err(|err| format!("{err:?}"))?
        .check_status()
        .map_err(|err| format!("{err:?}"))?;

    match response.json::<GeocodeResponse>().await {
        Ok(body) => Ok(body.places),
        Err(err) => {
            console_debug(&format!("[frontend] discarding malformed geocode reply: {err:?}"));
            Ok(Vec::new())
        }
    }
}

pub async fn route(payload: RouteRequest) -> Result<RouteResponse, String> {
    console_debug(&format!(
        "[frontend] sending route request from=({:.5},{:.5}) to=({:.5},{:.5})",
        payload.from.lat, payload.from.lon, payload.to.lat, payload.to.lon
    ));
    let request = Request::new(format!("{}/route", api_root()))
        .method(Method::Post)
        .json(&payload)
        .map_err(|err| format!("{err:?}"))?;

    let response = request
        .fetch()
        .await
        .map_err(|err| format!("{err:?}"))?
        .check_status()
        .map_err(|err| format!("{err:?}"))?;

    match response.json::<RouteResponse>().await {
        Ok(route) => Ok(route),
        Err(err) => {
            console_debug(&format!("[frontend] discarding malformed route reply: {err:?}"));
            Ok(RouteResponse::default())
        }
    }
}
