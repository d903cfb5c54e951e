//! Autocomplete state for the "from" and "to" fields.
//!
//! The session never performs IO itself. Every operation returns the
//! [`Effect`]s the host has to execute (arm a timer, fetch suggestions, ask
//! for the device position, commit a place); results come back through
//! [`SearchSession::timer_fired`], [`SearchSession::geocode_resolved`] and
//! [`SearchSession::location_resolved`] carrying the ticket they were issued
//! with, so anything superseded in the meantime is recognised and dropped.

use shared::{Coordinate, MIN_QUERY_LEN, Place, SUGGESTION_LIMIT};

pub const CURRENT_LOCATION_LABEL: &str = "Current location";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    From,
    To,
}

impl Field {
    pub const ALL: [Field; 2] = [Field::From, Field::To];

    pub fn other(self) -> Self {
        match self {
            Field::From => Field::To,
            Field::To => Field::From,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Field::From => 0,
            Field::To => 1,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Field::From => "From",
            Field::To => "To",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchConfig {
    pub min_query_len: usize,
    pub debounce_ms: u32,
    pub suggestion_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            min_query_len: MIN_QUERY_LEN,
            debounce_ms: 250,
            suggestion_limit: SUGGESTION_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerTicket(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestId(u64);

/// Cancellable timer identity: arming always invalidates the previous ticket.
#[derive(Debug, Default)]
pub struct Debouncer {
    next: u64,
    armed: Option<TimerTicket>,
}

impl Debouncer {
    /// Arm a fresh ticket, returning the one it replaced (if any was still armed).
    pub fn arm(&mut self) -> (Option<TimerTicket>, TimerTicket) {
        self.next += 1;
        let ticket = TimerTicket(self.next);
        (self.armed.replace(ticket), ticket)
    }

    pub fn cancel(&mut self) -> Option<TimerTicket> {
        self.armed.take()
    }

    /// True exactly once, for the currently armed ticket.
    pub fn fire(&mut self, ticket: TimerTicket) -> bool {
        if self.armed == Some(ticket) {
            self.armed = None;
            true
        } else {
            false
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    ArmTimer {
        field: Field,
        ticket: TimerTicket,
        delay_ms: u32,
    },
    CancelTimer {
        field: Field,
    },
    Geocode {
        field: Field,
        request: RequestId,
        query: String,
    },
    RequestDeviceLocation {
        field: Field,
        request: RequestId,
    },
    Commit {
        field: Field,
        place: Place,
    },
    Uncommit {
        field: Field,
    },
    SwapEndpoints,
}

/// What the suggestion dropdown of one field should render.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SuggestionView<'a> {
    Hidden,
    Loading,
    NoResults,
    Results(&'a [Place]),
}

#[derive(Debug, Clone, PartialEq)]
enum Phase {
    Idle,
    PendingFetch(TimerTicket),
    Loading(RequestId),
    Showing(Vec<Place>),
}

#[derive(Debug)]
struct FieldState {
    query: String,
    phase: Phase,
    debouncer: Debouncer,
    locating: Option<RequestId>,
    notice: Option<String>,
}

impl FieldState {
    fn new() -> Self {
        Self {
            query: String::new(),
            phase: Phase::Idle,
            debouncer: Debouncer::default(),
            locating: None,
            notice: None,
        }
    }

    /// Drop timer, in-flight request and suggestions; keep the text.
    fn discard_session(&mut self, field: Field, effects: &mut Vec<Effect>) {
        if self.debouncer.cancel().is_some() {
            effects.push(Effect::CancelTimer { field });
        }
        self.phase = Phase::Idle;
        self.locating = None;
    }
}

#[derive(Debug)]
pub struct SearchSession {
    config: SearchConfig,
    fields: [FieldState; 2],
    active: Option<Field>,
    next_request: u64,
}

impl Default for SearchSession {
    fn default() -> Self {
        Self::new(SearchConfig::default())
    }
}

impl SearchSession {
    pub fn new(config: SearchConfig) -> Self {
        Self {
            config,
            fields: [FieldState::new(), FieldState::new()],
            active: None,
            next_request: 0,
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn active(&self) -> Option<Field> {
        self.active
    }

    pub fn query(&self, field: Field) -> &str {
        &self.fields[field.index()].query
    }

    pub fn notice(&self, field: Field) -> Option<&str> {
        self.fields[field.index()].notice.as_deref()
    }

    pub fn is_locating(&self, field: Field) -> bool {
        self.fields[field.index()].locating.is_some()
    }

    pub fn view(&self, field: Field) -> SuggestionView<'_> {
        if self.active != Some(field) {
            return SuggestionView::Hidden;
        }
        match &self.fields[field.index()].phase {
            Phase::Idle => SuggestionView::Hidden,
            Phase::PendingFetch(_) | Phase::Loading(_) => SuggestionView::Loading,
            Phase::Showing(places) if places.is_empty() => SuggestionView::NoResults,
            Phase::Showing(places) => SuggestionView::Results(places),
        }
    }

    /// The synthetic "use current location" entry is offered on the active
    /// field whenever no search is pending for it.
    pub fn offers_current_location(&self, field: Field) -> bool {
        let state = &self.fields[field.index()];
        self.active == Some(field)
            && state.locating.is_none()
            && matches!(state.phase, Phase::Idle | Phase::Showing(_))
    }

    fn issue_request(&mut self) -> RequestId {
        self.next_request += 1;
        RequestId(self.next_request)
    }

    /// Make `field` the active one, discarding the other field's session.
    pub fn focus(&mut self, field: Field) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.active == Some(field) {
            return effects;
        }
        let other = field.other();
        self.fields[other.index()].discard_session(other, &mut effects);
        self.active = Some(field);
        effects
    }

    pub fn input(&mut self, field: Field, text: impl Into<String>) -> Vec<Effect> {
        let mut effects = self.focus(field);
        let min_len = self.config.min_query_len;
        let delay_ms = self.config.debounce_ms;

        let state = &mut self.fields[field.index()];
        state.query = text.into();
        state.notice = None;
        state.locating = None;

        if state.query.trim().chars().count() < min_len {
            state.discard_session(field, &mut effects);
            return effects;
        }

        let (replaced, ticket) = state.debouncer.arm();
        if replaced.is_some() {
            effects.push(Effect::CancelTimer { field });
        }
        state.phase = Phase::PendingFetch(ticket);
        effects.push(Effect::ArmTimer {
            field,
            ticket,
            delay_ms,
        });
        effects
    }

    pub fn timer_fired(&mut self, field: Field, ticket: TimerTicket) -> Vec<Effect> {
        if !self.fields[field.index()].debouncer.fire(ticket) {
            return Vec::new();
        }
        let request = self.issue_request();
        let state = &mut self.fields[field.index()];
        state.phase = Phase::Loading(request);
        vec![Effect::Geocode {
            field,
            request,
            query: state.query.trim().to_string(),
        }]
    }

    /// Apply a geocode reply. Returns `false` when the reply was stale and ignored.
    pub fn geocode_resolved(
        &mut self,
        field: Field,
        request: RequestId,
        result: Result<Vec<Place>, String>,
    ) -> bool {
        let limit = self.config.suggestion_limit;
        let state = &mut self.fields[field.index()];
        if state.phase != Phase::Loading(request) {
            return false;
        }
        match result {
            Ok(mut places) => {
                places.truncate(limit);
                state.phase = Phase::Showing(places);
            }
            Err(err) => {
                state.phase = Phase::Idle;
                state.notice = Some(format!("Search failed: {err}"));
            }
        }
        true
    }

    pub fn select(&mut self, field: Field, index: usize) -> Vec<Effect> {
        let state = &mut self.fields[field.index()];
        let place = match &state.phase {
            Phase::Showing(places) => match places.get(index) {
                Some(place) => place.clone(),
                None => return Vec::new(),
            },
            _ => return Vec::new(),
        };
        self.commit(field, place)
    }

    pub fn use_current_location(&mut self, field: Field) -> Vec<Effect> {
        if !self.offers_current_location(field) {
            return Vec::new();
        }
        let request = self.issue_request();
        let state = &mut self.fields[field.index()];
        state.locating = Some(request);
        state.notice = None;
        vec![Effect::RequestDeviceLocation { field, request }]
    }

    /// Apply a positioning reply. On failure nothing but the notice changes.
    pub fn location_resolved(
        &mut self,
        field: Field,
        request: RequestId,
        result: Result<Coordinate, String>,
    ) -> Vec<Effect> {
        let state = &mut self.fields[field.index()];
        if state.locating != Some(request) {
            return Vec::new();
        }
        state.locating = None;
        match result {
            Ok(coordinate) => self.commit(field, Place::new(CURRENT_LOCATION_LABEL, coordinate)),
            Err(err) => {
                state.notice = Some(format!("Location unavailable: {err}"));
                Vec::new()
            }
        }
    }

    fn commit(&mut self, field: Field, place: Place) -> Vec<Effect> {
        let mut effects = Vec::new();
        let state = &mut self.fields[field.index()];
        state.discard_session(field, &mut effects);
        state.query = place.name.clone();
        state.notice = None;
        if self.active == Some(field) {
            self.active = None;
        }
        effects.push(Effect::Commit { field, place });
        effects
    }

    /// Exchange the two texts. No search is started.
    pub fn swap(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        for field in Field::ALL {
            let state = &mut self.fields[field.index()];
            state.discard_session(field, &mut effects);
            state.notice = None;
        }
        let [from, to] = &mut self.fields;
        std::mem::swap(&mut from.query, &mut to.query);
        self.active = None;
        effects.push(Effect::SwapEndpoints);
        effects
    }

    pub fn clear(&mut self, field: Field) -> Vec<Effect> {
        let mut effects = Vec::new();
        let state = &mut self.fields[field.index()];
        state.discard_session(field, &mut effects);
        state.query.clear();
        state.notice = None;
        effects.push(Effect::Uncommit { field });
        effects
    }

    pub fn dismiss_notice(&mut self, field: Field) {
        self.fields[field.index()].notice = None;
    }

    /// Cancel every pending timer and orphan every in-flight request.
    pub fn teardown(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        for field in Field::ALL {
            self.fields[field.index()].discard_session(field, &mut effects);
        }
        self.active = None;
        effects
    }
}
