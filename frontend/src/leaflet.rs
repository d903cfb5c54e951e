//! Leaflet-backed [`MapSurface`] and the browser positioning capability.
//!
//! Every map created through `createMap` is its own handle; the JS side keeps
//! no module-level map, so several surfaces can coexist.

use std::collections::HashMap;

use serde::Deserialize;
use serde_wasm_bindgen::to_value;
use shared::{BoundingBox, Coordinate};
use wasm_bindgen::prelude::{JsValue, wasm_bindgen};
use wasm_bindgen_futures::JsFuture;

use crate::map::{
    LayerId, MapSurface, MapView, MarkerIcon, PolylineStyle, TILE_ATTRIBUTION, TILE_URL,
};

#[wasm_bindgen(module = "/leaflet_map.js")]
extern "C" {
    #[wasm_bindgen(js_name = createMap)]
    fn create_map(
        container_id: &str,
        lat: f64,
        lon: f64,
        zoom: f64,
        tile_url: &str,
        attribution: &str,
    ) -> JsValue;
    #[wasm_bindgen(js_name = setView)]
    fn set_view_js(map: &JsValue, lat: f64, lon: f64, zoom: f64);
    #[wasm_bindgen(js_name = getZoom)]
    fn get_zoom_js(map: &JsValue) -> f64;
    #[wasm_bindgen(js_name = addMarker)]
    fn add_marker_js(
        map: &JsValue,
        lat: f64,
        lon: f64,
        label: Option<String>,
        icon: JsValue,
    ) -> JsValue;
    #[wasm_bindgen(js_name = addPolyline)]
    fn add_polyline_js(map: &JsValue, lat_lngs: JsValue, style: JsValue) -> JsValue;
    #[wasm_bindgen(js_name = removeLayer)]
    fn remove_layer_js(map: &JsValue, layer: &JsValue);
    #[wasm_bindgen(js_name = fitBounds)]
    fn fit_bounds_js(map: &JsValue, south: f64, west: f64, north: f64, east: f64, padding: u32);
    #[wasm_bindgen(js_name = releaseMap)]
    fn release_map_js(map: &JsValue);
    #[wasm_bindgen(js_name = requestPosition)]
    fn request_position_js() -> js_sys::Promise;
}

pub struct LeafletSurface {
    map: JsValue,
    layers: HashMap<LayerId, JsValue>,
    next_layer: u32,
}

impl LeafletSurface {
    pub fn create(container_id: &str, view: MapView) -> Self {
        let map = create_map(
            container_id,
            view.center.lat,
            view.center.lon,
            view.zoom,
            TILE_URL,
            TILE_ATTRIBUTION,
        );
        Self {
            map,
            layers: HashMap::new(),
            next_layer: 0,
        }
    }

    fn track(&mut self, layer: JsValue) -> LayerId {
        self.next_layer += 1;
        let id = LayerId(self.next_layer);
        self.layers.insert(id, layer);
        id
    }
}

impl MapSurface for LeafletSurface {
    fn set_view(&mut self, center: Coordinate, zoom: f64) {
        set_view_js(&self.map, center.lat, center.lon, zoom);
    }

    fn zoom(&self) -> f64 {
        get_zoom_js(&self.map)
    }

    fn add_marker(&mut self, at: Coordinate, label: Option<&str>, icon: &MarkerIcon) -> LayerId {
        let icon = to_value(icon).unwrap_or(JsValue::NULL);
        let layer = add_marker_js(&self.map, at.lat, at.lon, label.map(str::to_owned), icon);
        self.track(layer)
    }

    fn add_polyline(&mut self, path: &[Coordinate], style: &PolylineStyle) -> LayerId {
        let lat_lngs: Vec<[f64; 2]> = path.iter().map(|c| [c.lat, c.lon]).collect();
        let layer = add_polyline_js(
            &self.map,
            to_value(&lat_lngs).unwrap_or(JsValue::NULL),
            to_value(style).unwrap_or(JsValue::NULL),
        );
        self.track(layer)
    }

    fn remove_layer(&mut self, layer: LayerId) {
        if let Some(handle) = self.layers.remove(&layer) {
            remove_layer_js(&self.map, &handle);
        }
    }

    fn fit_bounds(&mut self, bounds: BoundingBox, padding_px: u32) {
        fit_bounds_js(
            &self.map,
            bounds.min_lat,
            bounds.min_lon,
            bounds.max_lat,
            bounds.max_lon,
            padding_px,
        );
    }

    fn release(&mut self) {
        for (_, handle) in self.layers.drain() {
            remove_layer_js(&self.map, &handle);
        }
        release_map_js(&self.map);
    }
}

#[derive(Deserialize)]
struct PositionPayload {
    lat: f64,
    lon: f64,
}

/// One-shot device position. Denial, timeout and missing capability all
/// come back as `Err` with the browser's message.
pub async fn current_position() -> Result<Coordinate, String> {
    let value = JsFuture::from(request_position_js())
        .await
        .map_err(|err| err.as_string().unwrap_or_else(|| format!("{err:?}")))?;
    let payload: PositionPayload =
        serde_wasm_bindgen::from_value(value).map_err(|err| err.to_string())?;
    let position = Coordinate::new(payload.lat, payload.lon);
    if position.is_valid() {
        Ok(position)
    } else {
        Err(format!("invalid position {}, {}", payload.lat, payload.lon))
    }
}
