//! The two committed endpoints and the route between them.

use shared::{Place, RouteResponse};

use crate::map::{MapRenderer, MapSurface, MarkerSpec, RouteOutcome, RouteTicket};
use crate::search::Field;

#[derive(Debug, Default)]
pub struct Journey {
    from: Option<Place>,
    to: Option<Place>,
    route: Option<RouteResponse>,
    route_error: Option<String>,
}

impl Journey {
    pub fn endpoint(&self, field: Field) -> Option<&Place> {
        match field {
            Field::From => self.from.as_ref(),
            Field::To => self.to.as_ref(),
        }
    }

    pub fn route(&self) -> Option<&RouteResponse> {
        self.route.as_ref()
    }

    pub fn route_error(&self) -> Option<&str> {
        self.route_error.as_deref()
    }

    /// Commit (`Some`) or uncommit (`None`) one endpoint. The marker shows the
    /// committed place; uncommitting falls back to the other endpoint.
    /// Returns the routing request to issue, if any.
    pub fn set<S: MapSurface>(
        &mut self,
        field: Field,
        place: Option<Place>,
        renderer: &mut MapRenderer<S>,
    ) -> Option<RouteTicket> {
        let marker = match &place {
            Some(place) => Some(MarkerSpec::from(place)),
            None => self.endpoint(field.other()).map(MarkerSpec::from),
        };
        match field {
            Field::From => self.from = place,
            Field::To => self.to = place,
        }
        renderer.set_marker(marker);
        self.sync(renderer)
    }

    pub fn swap<S: MapSurface>(&mut self, renderer: &mut MapRenderer<S>) -> Option<RouteTicket> {
        std::mem::swap(&mut self.from, &mut self.to);
        self.sync(renderer)
    }

    pub fn route_fetched<S: MapSurface>(
        &mut self,
        generation: u64,
        result: Result<RouteResponse, String>,
        renderer: &mut MapRenderer<S>,
    ) -> RouteOutcome {
        match result {
            Ok(route) => {
                let outcome = renderer.route_resolved(generation, Ok(route.path.clone()));
                if outcome == RouteOutcome::Applied {
                    self.route = Some(route);
                    self.route_error = None;
                }
                outcome
            }
            Err(err) => {
                let outcome = renderer.route_resolved(generation, Err(err));
                if let RouteOutcome::Failed(err) = &outcome {
                    self.route_error = Some(err.clone());
                }
                outcome
            }
        }
    }

    fn sync<S: MapSurface>(&mut self, renderer: &mut MapRenderer<S>) -> Option<RouteTicket> {
        let from = self.from.as_ref().map(|p| p.coordinate);
        let to = self.to.as_ref().map(|p| p.coordinate);
        if from.is_none() || to.is_none() {
            self.route = None;
            self.route_error = None;
        }
        let ticket = renderer.set_endpoints(from, to);
        if ticket.is_some() {
            self.route_error = None;
        }
        ticket
    }
}

#[cfg(test)]
mod tests {
    use shared::{Coordinate, RouteRequest};

    use super::*;
    use crate::map::testing::RecordingSurface;
    use crate::search::{Effect, SearchSession};

    fn mounted() -> MapRenderer<RecordingSurface> {
        let mut renderer = MapRenderer::default();
        assert!(renderer.mount_with(|_| RecordingSurface::default()));
        renderer
    }

    fn bangalore() -> Place {
        Place::new("Bangalore, India", Coordinate::new(12.9716, 77.5946))
    }

    fn mysore() -> Place {
        Place::new("Mysore, India", Coordinate::new(12.2958, 76.6394))
    }

    /// Run the endpoint effects the way the app does and collect the
    /// routing requests they produce.
    fn apply(
        journey: &mut Journey,
        effects: Vec<Effect>,
        renderer: &mut MapRenderer<RecordingSurface>,
    ) -> Vec<RouteTicket> {
        effects
            .into_iter()
            .filter_map(|effect| match effect {
                Effect::Commit { field, place } => journey.set(field, Some(place), renderer),
                Effect::Uncommit { field } => journey.set(field, None, renderer),
                Effect::SwapEndpoints => journey.swap(renderer),
                _ => None,
            })
            .collect()
    }

    fn route_response(path: Vec<Coordinate>) -> RouteResponse {
        RouteResponse {
            path,
            distance_km: 42.0,
            bounds: None,
        }
    }

    fn both_committed() -> (Journey, MapRenderer<RecordingSurface>, RouteTicket) {
        let mut journey = Journey::default();
        let mut renderer = mounted();
        assert!(journey.set(Field::From, Some(mysore()), &mut renderer).is_none());
        let ticket = journey
            .set(Field::To, Some(bangalore()), &mut renderer)
            .expect("both endpoints set");
        (journey, renderer, ticket)
    }

    #[test]
    fn test_selecting_suggestion_places_marker() {
        let mut session = SearchSession::default();
        let mut journey = Journey::default();
        let mut renderer = mounted();

        let ticket = session
            .input(Field::To, "Bangalore")
            .into_iter()
            .find_map(|e| match e {
                Effect::ArmTimer { ticket, .. } => Some(ticket),
                _ => None,
            })
            .expect("a timer was armed");
        let request = match session.timer_fired(Field::To, ticket).as_slice() {
            [Effect::Geocode { request, .. }] => *request,
            other => panic!("expected a geocode, got {other:?}"),
        };
        session.geocode_resolved(Field::To, request, Ok(vec![bangalore()]));

        let tickets = apply(&mut journey, session.select(Field::To, 0), &mut renderer);
        assert!(tickets.is_empty());
        let expected = Coordinate::new(12.9716, 77.5946);
        assert_eq!(renderer.marker().map(|m| m.coordinate), Some(expected));
        let (center, _) = renderer.surface().and_then(|s| s.view).expect("view set");
        assert_eq!(center, expected);
        assert_eq!(journey.endpoint(Field::To), Some(&bangalore()));
    }

    #[test]
    fn test_second_endpoint_requests_route() {
        let (mut journey, mut renderer, ticket) = both_committed();
        assert_eq!(
            ticket.request,
            RouteRequest {
                from: mysore().coordinate,
                to: bangalore().coordinate
            }
        );

        let path = vec![mysore().coordinate, bangalore().coordinate];
        let outcome = journey.route_fetched(
            ticket.generation,
            Ok(route_response(path.clone())),
            &mut renderer,
        );
        assert_eq!(outcome, RouteOutcome::Applied);
        assert_eq!(journey.route().map(|r| r.path.clone()), Some(path));
        assert_eq!(renderer.surface().map(|s| s.polylines().len()), Some(1));
    }

    #[test]
    fn test_uncommit_falls_back_to_other_marker_and_drops_route() {
        let (mut journey, mut renderer, ticket) = both_committed();
        let path = vec![mysore().coordinate, bangalore().coordinate];
        journey.route_fetched(ticket.generation, Ok(route_response(path)), &mut renderer);

        let mut session = SearchSession::default();
        let tickets = apply(&mut journey, session.clear(Field::To), &mut renderer);

        assert!(tickets.is_empty());
        assert_eq!(
            renderer.marker().map(|m| m.coordinate),
            Some(mysore().coordinate)
        );
        assert!(journey.route().is_none());
        assert!(journey.route_error().is_none());
        assert_eq!(renderer.surface().map(|s| s.polylines().len()), Some(0));

        apply(&mut journey, session.clear(Field::From), &mut renderer);
        assert!(renderer.marker().is_none());
    }

    #[test]
    fn test_failed_route_is_retried_and_error_cleared() {
        let (mut journey, mut renderer, ticket) = both_committed();
        let outcome =
            journey.route_fetched(ticket.generation, Err("HTTP 502".into()), &mut renderer);
        assert_eq!(outcome, RouteOutcome::Failed("HTTP 502".into()));
        assert_eq!(journey.route_error(), Some("HTTP 502"));

        let retry = journey
            .set(Field::To, Some(bangalore()), &mut renderer)
            .expect("retry after failure");
        assert!(retry.generation > ticket.generation);
        assert!(journey.route_error().is_none());
    }

    #[test]
    fn test_swap_requests_reversed_route() {
        let (mut journey, mut renderer, _) = both_committed();
        let mut session = SearchSession::default();

        let tickets = apply(&mut journey, session.swap(), &mut renderer);
        assert_eq!(tickets.len(), 1);
        assert_eq!(
            tickets[0].request,
            RouteRequest {
                from: bangalore().coordinate,
                to: mysore().coordinate
            }
        );
        assert_eq!(journey.endpoint(Field::From), Some(&bangalore()));
        assert_eq!(journey.endpoint(Field::To), Some(&mysore()));
    }

    #[test]
    fn test_stale_route_reply_leaves_state_alone() {
        let (mut journey, mut renderer, old) = both_committed();
        journey.swap(&mut renderer);

        let outcome = journey.route_fetched(
            old.generation,
            Ok(route_response(vec![mysore().coordinate, bangalore().coordinate])),
            &mut renderer,
        );
        assert_eq!(outcome, RouteOutcome::Stale);
        assert!(journey.route().is_none());
        assert!(renderer.has_pending_route());
    }
}
