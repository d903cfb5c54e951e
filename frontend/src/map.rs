//! Keeps one map surface in step with the selected marker and route.
//!
//! [`MapRenderer`] owns the surface and every layer it draws. It never
//! originates location data: callers hand it the marker, the endpoints and
//! the routing replies, and it decides what to draw, what to remove and
//! which replies are still relevant.

use serde::Serialize;
use shared::{BoundingBox, Coordinate, Place, RouteRequest};

pub const DEFAULT_CENTER: Coordinate = Coordinate {
    lat: 20.5937,
    lon: 78.9629,
};
pub const DEFAULT_ZOOM: f64 = 5.0;
/// Zoom used when a marker is placed, unless the map is already closer.
pub const MARKER_ZOOM: f64 = 13.0;
pub const ROUTE_PADDING_PX: u32 = 20;
pub const TILE_URL: &str = "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png";
pub const TILE_ATTRIBUTION: &str = "&copy; OpenStreetMap contributors";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayerId(pub u32);

/// Icon configuration passed explicitly with every marker.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerIcon {
    pub icon_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shadow_url: Option<String>,
    pub icon_size: [u32; 2],
    pub icon_anchor: [u32; 2],
    pub popup_anchor: [i32; 2],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
}

const LEAFLET_IMAGES: &str = "https://unpkg.com/leaflet@1.9.4/dist/images";
/// Styled by the host page (`index.html`).
pub const DEVICE_MARKER_CLASS: &str = "device-marker";

impl MarkerIcon {
    pub fn selection() -> Self {
        Self {
            icon_url: format!("{LEAFLET_IMAGES}/marker-icon.png"),
            shadow_url: Some(format!("{LEAFLET_IMAGES}/marker-shadow.png")),
            icon_size: [25, 41],
            icon_anchor: [12, 41],
            popup_anchor: [1, -34],
            class_name: None,
        }
    }

    /// Smaller, shadowless and recoloured through the `device-marker` class.
    pub fn device() -> Self {
        Self {
            icon_url: format!("{LEAFLET_IMAGES}/marker-icon.png"),
            shadow_url: None,
            icon_size: [18, 30],
            icon_anchor: [9, 30],
            popup_anchor: [0, -26],
            class_name: Some(DEVICE_MARKER_CLASS.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolylineStyle {
    pub color: String,
    pub weight: f64,
    pub opacity: f64,
}

impl Default for PolylineStyle {
    fn default() -> Self {
        Self {
            color: "blue".into(),
            weight: 4.0,
            opacity: 0.8,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarkerSpec {
    pub coordinate: Coordinate,
    pub label: Option<String>,
}

impl From<&Place> for MarkerSpec {
    fn from(place: &Place) -> Self {
        Self {
            coordinate: place.coordinate,
            label: Some(place.name.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapView {
    pub center: Coordinate,
    pub zoom: f64,
}

impl Default for MapView {
    fn default() -> Self {
        Self {
            center: DEFAULT_CENTER,
            zoom: DEFAULT_ZOOM,
        }
    }
}

/// The mapping library as seen by the renderer.
pub trait MapSurface {
    fn set_view(&mut self, center: Coordinate, zoom: f64);
    fn zoom(&self) -> f64;
    fn add_marker(&mut self, at: Coordinate, label: Option<&str>, icon: &MarkerIcon) -> LayerId;
    fn add_polyline(&mut self, path: &[Coordinate], style: &PolylineStyle) -> LayerId;
    fn remove_layer(&mut self, layer: LayerId);
    fn fit_bounds(&mut self, bounds: BoundingBox, padding_px: u32);
    /// Tear the surface down. No other call follows.
    fn release(&mut self);
}

/// Identifies one routing request issued for an endpoint pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteTicket {
    pub generation: u64,
    pub request: RouteRequest,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    Applied,
    /// A newer endpoint pair was set after this request went out.
    Stale,
    /// The previous route stays on the map.
    Failed(String),
}

#[derive(Debug)]
pub struct MapRenderer<S: MapSurface> {
    surface: Option<S>,
    view: MapView,
    marker: Option<MarkerSpec>,
    marker_layer: Option<LayerId>,
    device: Option<Coordinate>,
    device_layer: Option<LayerId>,
    route: Vec<Coordinate>,
    route_layer: Option<LayerId>,
    polyline_style: PolylineStyle,
    endpoints: Option<(Coordinate, Coordinate)>,
    route_generation: u64,
    pending_route: Option<u64>,
}

impl<S: MapSurface> Default for MapRenderer<S> {
    fn default() -> Self {
        Self::new(MapView::default())
    }
}

impl<S: MapSurface> MapRenderer<S> {
    pub fn new(view: MapView) -> Self {
        Self {
            surface: None,
            view,
            marker: None,
            marker_layer: None,
            device: None,
            device_layer: None,
            route: Vec::new(),
            route_layer: None,
            polyline_style: PolylineStyle::default(),
            endpoints: None,
            route_generation: 0,
            pending_route: None,
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.surface.is_some()
    }

    pub fn surface(&self) -> Option<&S> {
        self.surface.as_ref()
    }

    pub fn marker(&self) -> Option<&MarkerSpec> {
        self.marker.as_ref()
    }

    pub fn route(&self) -> &[Coordinate] {
        &self.route
    }

    pub fn has_pending_route(&self) -> bool {
        self.pending_route.is_some()
    }

    /// Mount a surface built by `create`. Returns `false` (and never calls
    /// `create`) when a surface is already mounted. A fresh mount is the
    /// moment to ask for the device position.
    pub fn mount_with(&mut self, create: impl FnOnce(MapView) -> S) -> bool {
        if self.surface.is_some() {
            return false;
        }
        let mut surface = create(self.view);
        surface.set_view(self.view.center, self.view.zoom);
        self.surface = Some(surface);

        self.draw_device();
        let recenter = self.route.len() < 2;
        self.draw_marker(recenter);
        self.draw_route();
        true
    }

    /// Remove every owned layer and release the surface. Routing replies
    /// still in flight are orphaned.
    pub fn unmount(&mut self) {
        let Some(mut surface) = self.surface.take() else {
            return;
        };
        for layer in [
            self.marker_layer.take(),
            self.device_layer.take(),
            self.route_layer.take(),
        ]
        .into_iter()
        .flatten()
        {
            surface.remove_layer(layer);
        }
        surface.release();
        self.endpoints = None;
        self.route_generation += 1;
        self.pending_route = None;
    }

    pub fn set_marker(&mut self, marker: Option<MarkerSpec>) {
        if self.marker == marker {
            return;
        }
        self.marker = marker;
        self.draw_marker(true);
    }

    pub fn set_route(&mut self, path: Vec<Coordinate>) {
        if self.route == path {
            return;
        }
        self.route = path;
        self.draw_route();
    }

    /// Record the endpoint pair. Returns a ticket when a routing request
    /// must be issued; clearing either endpoint removes the route and
    /// orphans any pending request.
    pub fn set_endpoints(
        &mut self,
        from: Option<Coordinate>,
        to: Option<Coordinate>,
    ) -> Option<RouteTicket> {
        match (from, to) {
            (Some(from), Some(to)) => {
                if self.endpoints == Some((from, to)) {
                    return None;
                }
                self.endpoints = Some((from, to));
                self.route_generation += 1;
                self.pending_route = Some(self.route_generation);
                Some(RouteTicket {
                    generation: self.route_generation,
                    request: RouteRequest { from, to },
                })
            }
            _ => {
                self.endpoints = None;
                self.route_generation += 1;
                self.pending_route = None;
                self.set_route(Vec::new());
                None
            }
        }
    }

    pub fn route_resolved(
        &mut self,
        generation: u64,
        result: Result<Vec<Coordinate>, String>,
    ) -> RouteOutcome {
        if self.pending_route != Some(generation) {
            return RouteOutcome::Stale;
        }
        self.pending_route = None;
        match result {
            Ok(path) => {
                self.set_route(path);
                RouteOutcome::Applied
            }
            Err(err) => {
                // Forget the pair so committing it again retries.
                self.endpoints = None;
                RouteOutcome::Failed(err)
            }
        }
    }

    /// Apply the one-shot device position asked for at mount. A failure
    /// leaves the default view untouched.
    pub fn device_location(&mut self, result: Result<Coordinate, String>) -> bool {
        match result {
            Ok(position) if self.surface.is_some() => {
                self.device = Some(position);
                self.draw_device();
                let zoom = self.raised_zoom();
                if let Some(surface) = self.surface.as_mut() {
                    surface.set_view(position, zoom);
                }
                true
            }
            _ => false,
        }
    }

    fn raised_zoom(&self) -> f64 {
        self.surface
            .as_ref()
            .map_or(MARKER_ZOOM, |surface| surface.zoom().max(MARKER_ZOOM))
    }

    fn draw_marker(&mut self, recenter: bool) {
        let zoom = self.raised_zoom();
        let Some(surface) = self.surface.as_mut() else {
            return;
        };
        if let Some(layer) = self.marker_layer.take() {
            surface.remove_layer(layer);
        }
        if let Some(marker) = &self.marker {
            let icon = MarkerIcon::selection();
            self.marker_layer =
                Some(surface.add_marker(marker.coordinate, marker.label.as_deref(), &icon));
            if recenter {
                surface.set_view(marker.coordinate, zoom);
            }
        }
    }

    fn draw_device(&mut self) {
        let Some(surface) = self.surface.as_mut() else {
            return;
        };
        if let Some(layer) = self.device_layer.take() {
            surface.remove_layer(layer);
        }
        if let Some(position) = self.device {
            self.device_layer =
                Some(surface.add_marker(position, Some("You are here"), &MarkerIcon::device()));
        }
    }

    fn draw_route(&mut self) {
        let Some(surface) = self.surface.as_mut() else {
            return;
        };
        if let Some(layer) = self.route_layer.take() {
            surface.remove_layer(layer);
        }
        if self.route.len() < 2 {
            return;
        }
        self.route_layer = Some(surface.add_polyline(&self.route, &self.polyline_style));
        if let Some(bounds) = BoundingBox::from_points(&self.route) {
            surface.fit_bounds(bounds, ROUTE_PADDING_PX);
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::{cell::Cell, collections::HashMap, rc::Rc};

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    pub enum Layer {
        Marker {
            at: Coordinate,
            label: Option<String>,
            icon: MarkerIcon,
        },
        Polyline(Vec<Coordinate>),
    }

    /// In-memory surface recording what is drawn.
    #[derive(Debug, Default)]
    pub struct RecordingSurface {
        pub view: Option<(Coordinate, f64)>,
        pub layers: HashMap<LayerId, Layer>,
        pub fitted: Vec<(BoundingBox, u32)>,
        /// Shared so a test can observe release after the renderer dropped the surface.
        pub released: Rc<Cell<bool>>,
        next: u32,
    }

    impl RecordingSurface {
        pub fn with_release_flag(released: Rc<Cell<bool>>) -> Self {
            Self {
                released,
                ..Self::default()
            }
        }

        pub fn markers(&self) -> Vec<&Layer> {
            self.layers
                .values()
                .filter(|l| matches!(l, Layer::Marker { .. }))
                .collect()
        }

        pub fn polylines(&self) -> Vec<&Vec<Coordinate>> {
            self.layers
                .values()
                .filter_map(|l| match l {
                    Layer::Polyline(path) => Some(path),
                    Layer::Marker { .. } => None,
                })
                .collect()
        }

        fn insert(&mut self, layer: Layer) -> LayerId {
            self.next += 1;
            let id = LayerId(self.next);
            self.layers.insert(id, layer);
            id
        }
    }

    impl MapSurface for RecordingSurface {
        fn set_view(&mut self, center: Coordinate, zoom: f64) {
            self.view = Some((center, zoom));
        }

        fn zoom(&self) -> f64 {
            self.view.map_or(DEFAULT_ZOOM, |(_, zoom)| zoom)
        }

        fn add_marker(
            &mut self,
            at: Coordinate,
            label: Option<&str>,
            icon: &MarkerIcon,
        ) -> LayerId {
            self.insert(Layer::Marker {
                at,
                label: label.map(str::to_owned),
                icon: icon.clone(),
            })
        }

        fn add_polyline(&mut self, path: &[Coordinate], _style: &PolylineStyle) -> LayerId {
            self.insert(Layer::Polyline(path.to_vec()))
        }

        fn remove_layer(&mut self, layer: LayerId) {
            assert!(self.layers.remove(&layer).is_some(), "unknown layer {layer:?}");
        }

        fn fit_bounds(&mut self, bounds: BoundingBox, padding_px: u32) {
            self.fitted.push((bounds, padding_px));
        }

        fn release(&mut self) {
            assert!(self.layers.is_empty(), "released with live layers");
            self.released.set(true);
        }
    }
}
