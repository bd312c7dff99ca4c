//! Debounced query controller behind the search box.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use veou_bus::{BusPublisher, EventBus, Topic};
use veou_schema::{BusMessage, Coordinate, Region, SearchSuggestion};

use crate::aggregator::{AggregationOutcome, NearbyPlaceAggregator};
use crate::config::SearchConfig;
use crate::places::{Completion, LocationProvider, PlaceSearchProvider};
use crate::session::SessionTracker;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryState {
    pub search_text: String,
    pub suggestions: Vec<SearchSuggestion>,
    pub show_results: bool,
}

/// Whether "title subtitle" mentions one of the popular keywords.
pub fn is_popular_completion(completion: &Completion, keywords: &[String]) -> bool {
    let text = format!("{} {}", completion.title, completion.subtitle).to_lowercase();
    keywords.iter().any(|k| text.contains(&k.to_lowercase()))
}

/// Popular places matching `query`, or the whole popular list when none do.
pub fn filter_short_query(popular: &[SearchSuggestion], query: &str) -> Vec<SearchSuggestion> {
    let filtered: Vec<SearchSuggestion> = popular
        .iter()
        .filter(|place| place.matches(query))
        .cloned()
        .collect();
    if filtered.is_empty() {
        popular.to_vec()
    } else {
        filtered
    }
}

/// Mixes matching popular places into autocomplete results: popular matches
/// lead, titles are unique case-insensitively (first wins), and popular
/// entries with a known distance come first, nearest first.
pub fn merge_autocomplete(
    completions: Vec<Completion>,
    popular: &[SearchSuggestion],
    query: &str,
    config: &SearchConfig,
) -> Vec<SearchSuggestion> {
    let mut combined: Vec<SearchSuggestion> = Vec::new();
    if !query.is_empty() {
        combined.extend(
            popular
                .iter()
                .filter(|place| place.matches(query))
                .take(config.popular_mix_limit)
                .cloned(),
        );
    }
    combined.extend(
        completions
            .into_iter()
            .take(config.autocomplete_limit)
            .map(|c| {
                let popular = is_popular_completion(&c, &config.popular_keywords);
                SearchSuggestion::from_completion(c.title, c.subtitle, popular)
            }),
    );

    let mut seen = std::collections::HashSet::new();
    combined.retain(|s| seen.insert(s.title.to_lowercase()));

    let (mut nearby, rest): (Vec<_>, Vec<_>) = combined
        .into_iter()
        .partition(|s| s.is_popular && s.distance.is_some());
    nearby.sort_by(|a, b| {
        let a = a.distance.unwrap_or(f64::MAX);
        let b = b.distance.unwrap_or(f64::MAX);
        a.total_cmp(&b)
    });
    nearby.extend(rest);
    nearby
}

pub struct QueryController {
    config: SearchConfig,
    places: Arc<dyn PlaceSearchProvider>,
    location: Arc<dyn LocationProvider>,
    aggregator: Arc<NearbyPlaceAggregator>,
    bus: BusPublisher,
    sessions: SessionTracker,
    state: Mutex<QueryState>,
    pending: Mutex<Option<JoinHandle<()>>>,
    shutdown: CancellationToken,
}

impl QueryController {
    pub fn new(
        config: SearchConfig,
        places: Arc<dyn PlaceSearchProvider>,
        location: Arc<dyn LocationProvider>,
        aggregator: Arc<NearbyPlaceAggregator>,
        bus: BusPublisher,
    ) -> Self {
        Self {
            config,
            places,
            location,
            aggregator,
            bus,
            sessions: SessionTracker::new(),
            state: Mutex::new(QueryState::default()),
            pending: Mutex::new(None),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> QueryState {
        self.lock().clone()
    }

    pub fn suggestions(&self) -> Vec<SearchSuggestion> {
        self.lock().suggestions.clone()
    }

    pub fn aggregator(&self) -> &Arc<NearbyPlaceAggregator> {
        &self.aggregator
    }

    /// Handles one keystroke. Empty and short queries are answered from the
    /// popular list right away; longer ones wait out the debounce window and
    /// then ask the autocomplete provider. Any earlier pending query is
    /// abandoned.
    pub fn on_query_changed(self: &Arc<Self>, text: &str) {
        let session = self.sessions.begin(text);
        let session_id = session.session_id;
        let is_short = text.chars().count() <= self.config.short_query_max_chars;

        let immediate = {
            let mut state = self.lock();
            state.search_text = text.to_string();
            state.show_results = !text.is_empty();
            if text.is_empty() {
                state.suggestions = self.aggregator.popular();
                Some(state.suggestions.clone())
            } else if is_short {
                state.suggestions = filter_short_query(&self.aggregator.popular(), text);
                Some(state.suggestions.clone())
            } else {
                None
            }
        };

        let this = Arc::clone(self);
        let text = text.to_string();
        let handle = tokio::spawn(async move {
            match immediate {
                Some(suggestions) => this.publish(Some(session_id), suggestions).await,
                None => this.debounced_autocomplete(session_id, text).await,
            }
        });
        self.replace_pending(Some(handle));
    }

    async fn debounced_autocomplete(&self, session_id: Uuid, text: String) {
        tokio::select! {
            _ = self.shutdown.cancelled() => return,
            _ = tokio::time::sleep(self.config.debounce()) => {}
        }
        if !self.sessions.is_current(session_id) {
            return;
        }

        let region = self
            .location
            .current_coordinate()
            .map(|c| Region::new(c, self.config.region_span_degrees));
        let completions = match self.places.autocomplete(&text, region).await {
            Ok(completions) => completions,
            Err(e) => {
                tracing::warn!(session_id = %session_id, query = %text, "autocomplete failed: {e:#}");
                return;
            }
        };

        let merged = merge_autocomplete(completions, &self.aggregator.popular(), &text, &self.config);
        {
            let mut state = self.lock();
            if !self.sessions.is_current(session_id) {
                tracing::debug!(session_id = %session_id, "dropping stale autocomplete results");
                return;
            }
            state.suggestions = merged.clone();
        }
        tracing::debug!(session_id = %session_id, count = merged.len(), "suggestions updated");
        self.publish(Some(session_id), merged).await;
    }

    /// Empties the suggestion list and abandons any pending query.
    pub async fn clear_results(&self) {
        self.replace_pending(None);
        {
            let mut state = self.lock();
            self.sessions.invalidate();
            state.suggestions.clear();
            state.show_results = false;
        }
        self.publish(None, Vec::new()).await;
    }

    pub async fn hide_search(&self) {
        self.lock().search_text.clear();
        self.clear_results().await;
    }

    /// Re-aggregates popular places around the current location. Skipped
    /// when the location is unknown.
    pub async fn refresh_popular(&self) -> Option<AggregationOutcome> {
        let Some(origin) = self.location.current_coordinate() else {
            tracing::debug!("no location, skipping popular places refresh");
            return None;
        };
        let outcome = self.aggregator.fetch_popular_nearby(origin).await;
        if let AggregationOutcome::Completed(places) = &outcome {
            self.show_popular_if_idle(places.clone()).await;
        }
        Some(outcome)
    }

    /// Shows `places` as the suggestions when the search box is empty.
    async fn show_popular_if_idle(&self, places: Vec<SearchSuggestion>) {
        {
            let mut state = self.lock();
            if !state.search_text.is_empty() {
                return;
            }
            state.suggestions = places.clone();
        }
        self.publish(None, places).await;
    }

    pub async fn resolve_coordinates(&self, suggestion: &SearchSuggestion) -> Option<Coordinate> {
        self.aggregator.resolve_coordinates(suggestion).await
    }

    pub async fn resolve_location(&self, query: &str) -> Option<Coordinate> {
        self.aggregator.resolve_location(query).await
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.replace_pending(None);
        self.aggregator.shutdown();
    }

    async fn publish(&self, session_id: Option<Uuid>, suggestions: Vec<SearchSuggestion>) {
        if let Err(e) = self
            .bus
            .publish(BusMessage::SuggestionsUpdated {
                session_id,
                suggestions,
            })
            .await
        {
            tracing::warn!("failed to publish suggestions: {e:#}");
        }
    }

    fn replace_pending(&self, handle: Option<JoinHandle<()>>) {
        let previous = {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::replace(&mut *pending, handle)
        };
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Refreshes popular places whenever location access becomes granted.
pub async fn spawn_authorization_listener(
    controller: Arc<QueryController>,
    bus: &EventBus,
) -> JoinHandle<()> {
    let mut rx = bus.subscribe(Topic::LocationAuthorizationChanged).await;
    let shutdown = controller.shutdown.clone();
    tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                _ = shutdown.cancelled() => break,
                msg = rx.recv() => msg,
            };
            let status = match msg {
                Some(BusMessage::LocationAuthorizationChanged { status }) => status,
                Some(_) => continue,
                None => break,
            };
            if !status.is_authorized() {
                tracing::info!(?status, "location access not granted");
                continue;
            }
            tracing::info!(?status, "location access granted, refreshing popular places");
            controller.refresh_popular().await;
        }
    })
}

/// Mirrors every accepted popular-places update into the suggestions while
/// the search box is empty.
pub async fn spawn_popular_listener(
    controller: Arc<QueryController>,
    bus: &EventBus,
) -> JoinHandle<()> {
    let mut rx = bus.subscribe(Topic::PopularPlacesUpdated).await;
    let shutdown = controller.shutdown.clone();
    tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                _ = shutdown.cancelled() => break,
                msg = rx.recv() => msg,
            };
            let places = match msg {
                Some(BusMessage::PopularPlacesUpdated { places, .. }) => places,
                Some(_) => continue,
                None => break,
            };
            controller.show_popular_if_idle(places).await;
        }
    })
}
