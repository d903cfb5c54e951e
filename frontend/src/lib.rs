use seed::{prelude::*, *};
use shared::{Coordinate, Place, RouteResponse};

pub mod api;
pub mod journey;
pub mod leaflet;
pub mod map;
pub mod search;

use crate::journey::Journey;
use crate::leaflet::LeafletSurface;
use crate::map::{MapRenderer, MapView, RouteOutcome, RouteTicket};
use crate::search::{Effect, Field, RequestId, SearchSession, SuggestionView, TimerTicket};

const ROOT_ID: &str = "app";
const MAP_CONTAINER_ID: &str = "map";

pub struct Model {
    search: SearchSession,
    journey: Journey,
    renderer: MapRenderer<LeafletSurface>,
    /// One live debounce command per field; dropping the handle aborts it.
    timers: [Option<CmdHandle>; 2],
}

pub enum Msg {
    MapContainerReady,
    QueryChanged(Field, String),
    Focus(Field),
    DebounceElapsed(Field, TimerTicket),
    GeocodeFetched(Field, RequestId, Result<Vec<Place>, String>),
    SelectSuggestion(Field, usize),
    UseCurrentLocation(Field),
    FieldLocated(Field, RequestId, Result<Coordinate, String>),
    DeviceLocated(Result<Coordinate, String>),
    Swap,
    Clear(Field),
    DismissNotice(Field),
    RouteFetched(u64, Result<RouteResponse, String>),
    Teardown,
}

pub fn init(_: Url, orders: &mut impl Orders<Msg>) -> Model {
    orders.after_next_render(|_| Msg::MapContainerReady);
    orders.stream(streams::window_event(Ev::from("beforeunload"), |_| {
        Msg::Teardown
    }));

    Model {
        search: SearchSession::default(),
        journey: Journey::default(),
        renderer: MapRenderer::new(MapView::default()),
        timers: [None, None],
    }
}

pub fn update(msg: Msg, model: &mut Model, orders: &mut impl Orders<Msg>) {
    match msg {
        Msg::MapContainerReady => {
            let fresh = model
                .renderer
                .mount_with(|view| LeafletSurface::create(MAP_CONTAINER_ID, view));
            if fresh {
                orders.perform_cmd(async {
                    Msg::DeviceLocated(leaflet::current_position().await)
                });
            }
        }
        Msg::QueryChanged(field, text) => {
            let effects = model.search.input(field, text);
            run_effects(effects, model, orders);
        }
        Msg::Focus(field) => {
            let effects = model.search.focus(field);
            run_effects(effects, model, orders);
        }
        Msg::DebounceElapsed(field, ticket) => {
            model.timers[field.index()] = None;
            let effects = model.search.timer_fired(field, ticket);
            run_effects(effects, model, orders);
        }
        Msg::GeocodeFetched(field, request, result) => {
            if let Err(err) = &result {
                console_error(&format!("[frontend] geocode failed for {field:?}: {err}"));
            }
            if !model.search.geocode_resolved(field, request, result) {
                console_debug(&format!("[frontend] dropped stale geocode reply for {field:?}"));
            }
        }
        Msg::SelectSuggestion(field, index) => {
            let effects = model.search.select(field, index);
            run_effects(effects, model, orders);
        }
        Msg::UseCurrentLocation(field) => {
            let effects = model.search.use_current_location(field);
            run_effects(effects, model, orders);
        }
        Msg::FieldLocated(field, request, result) => {
            if let Err(err) = &result {
                console_error(&format!("[frontend] positioning failed: {err}"));
            }
            let effects = model.search.location_resolved(field, request, result);
            run_effects(effects, model, orders);
        }
        Msg::DeviceLocated(result) => {
            if let Err(err) = &result {
                console_debug(&format!("[frontend] device location unavailable: {err}"));
            }
            model.renderer.device_location(result);
        }
        Msg::Swap => {
            let effects = model.search.swap();
            run_effects(effects, model, orders);
        }
        Msg::Clear(field) => {
            let effects = model.search.clear(field);
            run_effects(effects, model, orders);
        }
        Msg::DismissNotice(field) => model.search.dismiss_notice(field),
        Msg::RouteFetched(generation, result) => route_fetched(model, generation, result),
        Msg::Teardown => {
            let effects = model.search.teardown();
            run_effects(effects, model, orders);
            model.timers = [None, None];
            model.renderer.unmount();
        }
    }
}

fn run_effects(effects: Vec<Effect>, model: &mut Model, orders: &mut impl Orders<Msg>) {
    for effect in effects {
        match effect {
            Effect::ArmTimer {
                field,
                ticket,
                delay_ms,
            } => {
                let handle = orders.perform_cmd_with_handle(cmds::timeout(delay_ms, move || {
                    Msg::DebounceElapsed(field, ticket)
                }));
                model.timers[field.index()] = Some(handle);
            }
            Effect::CancelTimer { field } => model.timers[field.index()] = None,
            Effect::Geocode {
                field,
                request,
                query,
            } => {
                orders.perform_cmd(async move {
                    Msg::GeocodeFetched(field, request, api::geocode(query).await)
                });
            }
            Effect::RequestDeviceLocation { field, request } => {
                orders.perform_cmd(async move {
                    Msg::FieldLocated(field, request, leaflet::current_position().await)
                });
            }
            Effect::Commit { field, place } => {
                let ticket = model.journey.set(field, Some(place), &mut model.renderer);
                request_route(ticket, orders);
            }
            Effect::Uncommit { field } => {
                let ticket = model.journey.set(field, None, &mut model.renderer);
                request_route(ticket, orders);
            }
            Effect::SwapEndpoints => {
                let ticket = model.journey.swap(&mut model.renderer);
                request_route(ticket, orders);
            }
        }
    }
}

fn request_route(ticket: Option<RouteTicket>, orders: &mut impl Orders<Msg>) {
    if let Some(ticket) = ticket {
        orders.perform_cmd(async move {
            Msg::RouteFetched(ticket.generation, api::route(ticket.request).await)
        });
    }
}

fn route_fetched(model: &mut Model, generation: u64, result: Result<RouteResponse, String>) {
    match model.journey.route_fetched(generation, result, &mut model.renderer) {
        RouteOutcome::Applied => {}
        RouteOutcome::Stale => console_debug("[frontend] dropped stale route reply"),
        RouteOutcome::Failed(err) => {
            console_error(&format!("[frontend] route request failed: {err}"));
        }
    }
}

pub fn view(model: &Model) -> Node<Msg> {
    div![
        C!["search-panel"],
        view_field(model, Field::From),
        button![
            C!["swap-btn"],
            attrs! { At::Title => "Swap from and to" },
            "⇅",
            ev(Ev::Click, |event| {
                event.prevent_default();
                Msg::Swap
            }),
        ],
        view_field(model, Field::To),
        view_route_summary(model),
    ]
}

fn view_field(model: &Model, field: Field) -> Node<Msg> {
    let placeholder = match field {
        Field::From => "Search start...",
        Field::To => "Search destination...",
    };

    div![
        C!["search-field"],
        label![field.label()],
        div![
            C!["input-row"],
            input![
                attrs! {
                    At::Type => "text",
                    At::Value => model.search.query(field),
                    At::Placeholder => placeholder,
                    At::from("autocomplete") => "off",
                },
                input_ev(Ev::Input, move |text| Msg::QueryChanged(field, text)),
                ev(Ev::Focus, move |_| Msg::Focus(field)),
            ],
            IF!(!model.search.query(field).is_empty() => button![
                C!["clear-btn"],
                "×",
                ev(Ev::Click, move |event| {
                    event.prevent_default();
                    Msg::Clear(field)
                }),
            ]),
        ],
        view_suggestions(model, field),
        model.search.notice(field).map(|notice| {
            p![
                C!["notice"],
                notice,
                ev(Ev::Click, move |_| Msg::DismissNotice(field)),
            ]
        }),
    ]
}

fn view_suggestions(model: &Model, field: Field) -> Node<Msg> {
    let current_location = if model.search.offers_current_location(field) {
        li![
            C!["suggestion", "current-location"],
            "📍 Use current location",
            ev(Ev::MouseDown, move |_| Msg::UseCurrentLocation(field)),
        ]
    } else if model.search.is_locating(field) {
        li![C!["suggestion", "status"], "Locating..."]
    } else {
        empty![]
    };

    let body: Vec<Node<Msg>> = match model.search.view(field) {
        SuggestionView::Hidden => Vec::new(),
        SuggestionView::Loading => vec![li![C!["suggestion", "status"], "Searching..."]],
        SuggestionView::NoResults => vec![li![C!["suggestion", "status"], "No results found"]],
        SuggestionView::Results(places) => places
            .iter()
            .enumerate()
            .map(|(index, place)| {
                li![
                    C!["suggestion"],
                    place.name.as_str(),
                    ev(Ev::MouseDown, move |_| Msg::SelectSuggestion(field, index)),
                ]
            })
            .collect(),
    };

    let idle = !model.search.offers_current_location(field) && !model.search.is_locating(field);
    if body.is_empty() && idle {
        return empty![];
    }
    ul![C!["suggestions"], current_location, body]
}

fn view_route_summary(model: &Model) -> Node<Msg> {
    if let Some(err) = model.journey.route_error() {
        return p![C!["error"], format!("Route unavailable: {err}")];
    }
    match model.journey.route() {
        Some(route) if route.path.len() > 1 => {
            p![C!["route-summary"], format!("{:.2} km", route.distance_km)]
        }
        Some(_) => p![C!["route-summary"], "No route found between these places"],
        None if model.renderer.has_pending_route() => p![C!["route-summary"], "Computing route..."],
        None => empty![],
    }
}

pub(crate) fn console_debug(message: &str) {
    web_sys::console::debug_1(&message.into());
}

fn console_error(message: &str) {
    web_sys::console::error_1(&message.into());
}

#[wasm_bindgen(start)]
pub fn start() {
    if document().get_element_by_id(ROOT_ID).is_none() {
        wasm_bindgen::throw_str("root element #app not found, cannot render");
    }
    App::start(ROOT_ID, init, update, view);
}
