use std::sync::Arc;

use tokio::task::JoinHandle;
use veou_bus::EventBus;

use crate::aggregator::NearbyPlaceAggregator;
use crate::config::VeouConfig;
use crate::places::{LocationProvider, PlaceSearchProvider};
use crate::query::{spawn_authorization_listener, spawn_popular_listener, QueryController};
use crate::summarizer::ReviewSummarizer;
use crate::summary::ReviewSummaryController;

const BUS_CAPACITY: usize = 64;

/// Wires the query controller, nearby-place aggregator and summary
/// controller onto one event bus.
pub struct Orchestrator {
    bus: Arc<EventBus>,
    query: Arc<QueryController>,
    summary: Arc<ReviewSummaryController>,
    listeners: Vec<JoinHandle<()>>,
}

impl Orchestrator {
    pub fn new(
        config: &VeouConfig,
        places: Arc<dyn PlaceSearchProvider>,
        location: Arc<dyn LocationProvider>,
        summarizer: ReviewSummarizer,
    ) -> Self {
        let bus = Arc::new(EventBus::new(BUS_CAPACITY));
        let aggregator = Arc::new(NearbyPlaceAggregator::new(
            config,
            places.clone(),
            location.clone(),
            bus.publisher(),
        ));
        let query = Arc::new(QueryController::new(
            config.search.clone(),
            places,
            location,
            aggregator,
            bus.publisher(),
        ));
        let summary = Arc::new(ReviewSummaryController::new(
            summarizer,
            &config.summary,
            bus.publisher(),
        ));
        Self {
            bus,
            query,
            summary,
            listeners: Vec::new(),
        }
    }

    /// Starts listening for location authorization changes and popular-place
    /// updates.
    pub async fn start(&mut self) {
        if !self.listeners.is_empty() {
            return;
        }
        self.listeners
            .push(spawn_authorization_listener(self.query.clone(), &self.bus).await);
        self.listeners
            .push(spawn_popular_listener(self.query.clone(), &self.bus).await);
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn query(&self) -> &Arc<QueryController> {
        &self.query
    }

    pub fn aggregator(&self) -> &Arc<NearbyPlaceAggregator> {
        self.query.aggregator()
    }

    pub fn summary(&self) -> &Arc<ReviewSummaryController> {
        &self.summary
    }

    /// Cancels every pending debounce, aggregation and summary task.
    pub fn shutdown(&mut self) {
        self.query.shutdown();
        self.summary.shutdown();
        for listener in self.listeners.drain(..) {
            listener.abort();
        }
        tracing::debug!("orchestrator shut down");
    }
}
