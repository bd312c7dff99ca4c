//! Nearby "popular places" aggregation: one ranked popularity query followed
//! by sequential per-category queries, merged into a capped, name-unique list.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use veou_bus::BusPublisher;
use veou_schema::{BusMessage, Coordinate, PlaceAnnotation, Region, SearchSuggestion};

use crate::annotations::{AnnotationSet, InsertOutcome};
use crate::config::{AggregatorConfig, VeouConfig};
use crate::places::{LocationProvider, PlaceResult, PlaceSearchProvider};
use crate::session::SessionTracker;

#[derive(Debug, Clone, PartialEq)]
pub enum AggregationOutcome {
    Completed(Vec<SearchSuggestion>),
    /// Another aggregation was already running; nothing was done.
    Busy,
    /// A newer request or a clear made this run stale.
    Superseded,
    /// The popularity query failed; the previous list is untouched.
    Failed,
    Cancelled,
}

/// Highest `area_of_interest_count` first, ties broken by name.
pub fn rank_by_popularity(mut places: Vec<PlaceResult>) -> Vec<PlaceResult> {
    places.sort_by(|a, b| {
        b.area_of_interest_count
            .cmp(&a.area_of_interest_count)
            .then_with(|| a.name.cmp(&b.name))
    });
    places
}

/// Appends entries whose title is not already present, stopping at
/// `max_results`. Returns how many were added.
pub fn merge_category_batch(
    accumulated: &mut Vec<SearchSuggestion>,
    batch: Vec<SearchSuggestion>,
    max_results: usize,
) -> usize {
    let mut names: HashSet<String> = accumulated.iter().map(|s| s.title.clone()).collect();
    let before = accumulated.len();
    for suggestion in batch {
        if accumulated.len() >= max_results {
            break;
        }
        if names.insert(suggestion.title.clone()) {
            accumulated.push(suggestion);
        }
    }
    accumulated.len() - before
}

fn to_suggestion(place: PlaceResult, origin: &Coordinate) -> SearchSuggestion {
    SearchSuggestion::nearby(place.name, place.address_line, place.coordinate, origin)
}

struct InProgressGuard<'a> {
    flag: &'a AtomicBool,
    released: &'a Notify,
}

impl Drop for InProgressGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
        self.released.notify_waiters();
    }
}

pub struct NearbyPlaceAggregator {
    config: AggregatorConfig,
    resolve_span_degrees: f64,
    places: Arc<dyn PlaceSearchProvider>,
    location: Arc<dyn LocationProvider>,
    bus: BusPublisher,
    sessions: SessionTracker,
    in_progress: AtomicBool,
    released: Notify,
    popular: Mutex<Vec<SearchSuggestion>>,
    annotations: Mutex<AnnotationSet>,
    refresh_task: Mutex<Option<JoinHandle<()>>>,
    shutdown: CancellationToken,
}

impl NearbyPlaceAggregator {
    pub fn new(
        config: &VeouConfig,
        places: Arc<dyn PlaceSearchProvider>,
        location: Arc<dyn LocationProvider>,
        bus: BusPublisher,
    ) -> Self {
        Self {
            config: config.aggregator.clone(),
            resolve_span_degrees: config.search.region_span_degrees,
            places,
            location,
            bus,
            sessions: SessionTracker::new(),
            in_progress: AtomicBool::new(false),
            released: Notify::new(),
            popular: Mutex::new(Vec::new()),
            annotations: Mutex::new(AnnotationSet::new()),
            refresh_task: Mutex::new(None),
            shutdown: CancellationToken::new(),
        }
    }

    /// Snapshot of the current popular-places list.
    pub fn popular(&self) -> Vec<SearchSuggestion> {
        self.popular
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn is_aggregating(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    /// Runs the full aggregation around `origin`. Rejected with
    /// [`AggregationOutcome::Busy`] while another run holds the guard.
    pub async fn fetch_popular_nearby(&self, origin: Coordinate) -> AggregationOutcome {
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("popular places aggregation already running");
            return AggregationOutcome::Busy;
        }
        let _guard = InProgressGuard {
            flag: &self.in_progress,
            released: &self.released,
        };

        let session = self.sessions.begin(self.config.popular_query.clone());
        let outcome = self.aggregate(origin, session.session_id).await;
        match &outcome {
            AggregationOutcome::Completed(places) => {
                tracing::info!(count = places.len(), "popular places aggregated")
            }
            other => tracing::debug!(?other, "popular places aggregation ended early"),
        }
        outcome
    }

    async fn aggregate(&self, origin: Coordinate, session_id: Uuid) -> AggregationOutcome {
        let region = Region::new(origin, self.config.region_span_degrees);
        let raw = match self
            .places
            .search(&self.config.popular_query, Some(region))
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("popular places search failed: {e:#}");
                return AggregationOutcome::Failed;
            }
        };
        if self.shutdown.is_cancelled() {
            return AggregationOutcome::Cancelled;
        }

        let ranked: Vec<SearchSuggestion> = rank_by_popularity(raw)
            .into_iter()
            .map(|place| to_suggestion(place, &origin))
            .collect();
        let mut accumulated = Vec::new();
        merge_category_batch(&mut accumulated, ranked, self.config.popular_limit);
        if !self.apply(session_id, &accumulated).await {
            return AggregationOutcome::Superseded;
        }

        for (index, category) in self.config.categories.iter().enumerate() {
            if accumulated.len() >= self.config.max_results {
                break;
            }
            if index > 0 {
                tokio::select! {
                    _ = self.shutdown.cancelled() => return AggregationOutcome::Cancelled,
                    _ = tokio::time::sleep(self.config.inter_request_delay()) => {}
                }
            }
            if !self.sessions.is_current(session_id) {
                return AggregationOutcome::Superseded;
            }

            let batch = match self.fetch_by_category(origin, category).await {
                Ok(batch) => batch,
                Err(e) => {
                    tracing::warn!(category = %category, "category search failed: {e:#}");
                    continue;
                }
            };
            let added =
                merge_category_batch(&mut accumulated, batch, self.config.max_results);
            tracing::debug!(category = %category, added, total = accumulated.len(), "merged category");
            if added > 0 && !self.apply(session_id, &accumulated).await {
                return AggregationOutcome::Superseded;
            }
        }

        if !self.sessions.is_current(session_id) {
            return AggregationOutcome::Superseded;
        }
        AggregationOutcome::Completed(accumulated)
    }

    /// Top `per_category_limit` raw results for one category around `origin`.
    pub async fn fetch_by_category(
        &self,
        origin: Coordinate,
        category: &str,
    ) -> Result<Vec<SearchSuggestion>> {
        let region = Region::new(origin, self.config.region_span_degrees);
        let results = self.places.search(category, Some(region)).await?;
        Ok(results
            .into_iter()
            .take(self.config.per_category_limit)
            .map(|place| to_suggestion(place, &origin))
            .collect())
    }

    /// Replaces the visible list if `session_id` is still current.
    async fn apply(&self, session_id: Uuid, places: &[SearchSuggestion]) -> bool {
        {
            let mut popular = self.popular.lock().unwrap_or_else(|e| e.into_inner());
            if !self.sessions.is_current(session_id) {
                return false;
            }
            *popular = places.to_vec();
        }
        if let Err(e) = self
            .bus
            .publish(BusMessage::PopularPlacesUpdated {
                session_id: Some(session_id),
                places: places.to_vec(),
            })
            .await
        {
            tracing::warn!("failed to publish popular places: {e:#}");
        }
        true
    }

    /// Empties the list and makes every in-flight run stale.
    pub async fn clear(&self) {
        self.abort_refresh();
        {
            let mut popular = self.popular.lock().unwrap_or_else(|e| e.into_inner());
            self.sessions.invalidate();
            popular.clear();
        }
        if let Err(e) = self
            .bus
            .publish(BusMessage::PopularPlacesUpdated {
                session_id: None,
                places: Vec::new(),
            })
            .await
        {
            tracing::warn!("failed to publish popular places: {e:#}");
        }
    }

    /// Map-panning refresh: supersedes anything in flight at once, then
    /// aggregates around `origin` after the refresh quiet period. A later
    /// call restarts the wait. When a superseded run still holds the guard,
    /// the refresh waits for it to finish and then runs.
    pub fn debounced_refresh(self: &Arc<Self>, origin: Coordinate, clear_previous: bool) {
        let session = self.sessions.begin("map refresh");
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            if clear_previous {
                this.apply(session.session_id, &[]).await;
            }
            tokio::select! {
                _ = this.shutdown.cancelled() => return,
                _ = tokio::time::sleep(this.config.refresh_debounce()) => {}
            }
            if !this.sessions.is_current(session.session_id) {
                return;
            }
            loop {
                let released = this.released.notified();
                tokio::pin!(released);
                released.as_mut().enable();

                if this.fetch_popular_nearby(origin).await != AggregationOutcome::Busy {
                    return;
                }
                tracing::debug!("map refresh waiting for the running aggregation");
                tokio::select! {
                    _ = this.shutdown.cancelled() => return,
                    _ = &mut released => {}
                }
                if !this.sessions.is_current(session.session_id) {
                    return;
                }
            }
        });

        let previous = self
            .refresh_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    fn abort_refresh(&self) {
        if let Some(handle) = self
            .refresh_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            handle.abort();
        }
    }

    fn search_region(&self) -> Option<Region> {
        self.location
            .current_coordinate()
            .map(|c| Region::new(c, self.resolve_span_degrees))
    }

    /// First result of a free-text search near the user, or unbounded when
    /// the location is unknown. Failures resolve to `None`.
    pub async fn resolve_location(&self, query: &str) -> Option<Coordinate> {
        match self.places.search(query, self.search_region()).await {
            Ok(results) => results.into_iter().next().map(|p| p.coordinate),
            Err(e) => {
                tracing::warn!(query, "location lookup failed: {e:#}");
                None
            }
        }
    }

    /// Coordinates for a suggestion, looking up "title, subtitle" when the
    /// suggestion came from autocomplete.
    pub async fn resolve_coordinates(&self, suggestion: &SearchSuggestion) -> Option<Coordinate> {
        if let Some(coordinate) = suggestion.coordinates {
            return Some(coordinate);
        }
        let query = if suggestion.subtitle.is_empty() {
            suggestion.title.clone()
        } else {
            format!("{}, {}", suggestion.title, suggestion.subtitle)
        };
        self.resolve_location(&query).await
    }

    /// Resolves the suggestion and drops a pin for it, reusing an existing
    /// pin at the same coordinate.
    pub async fn pin_suggestion(&self, suggestion: &SearchSuggestion) -> Option<InsertOutcome> {
        let coordinate = self.resolve_coordinates(suggestion).await?;
        let mut annotation =
            PlaceAnnotation::new(coordinate, &suggestion.title, &suggestion.subtitle);
        if let Some(origin) = self.location.current_coordinate() {
            annotation = annotation.with_distance_from(&origin);
        }
        let outcome = self
            .annotations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(annotation);
        Some(outcome)
    }

    pub fn annotations(&self) -> AnnotationSet {
        self.annotations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.abort_refresh();
    }
}
