//! Review-summary cache and debouncer.
//!
//! Each request bumps a generation counter; a debounce wait or model call
//! that finishes under an older generation is dropped without touching the
//! observable state. A content fingerprint of the review set short-circuits
//! repeat requests while the summary for that set is still held.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use veou_bus::BusPublisher;
use veou_schema::{AiSummary, BusMessage, Review, SummaryPhase, SummaryState};

use crate::config::SummaryConfig;
use crate::fingerprint::ReviewSetFingerprint;
use crate::summarizer::ReviewSummarizer;

#[derive(Debug, Clone, PartialEq)]
pub enum SummaryOutcome {
    Ready(AiSummary),
    /// Served from the held summary; no model call.
    Cached(AiSummary),
    /// Empty review set; summary and error were cleared.
    Cleared,
    Failed(String),
    /// A newer request, a clear or shutdown made this one stale.
    Superseded,
}

#[derive(Default)]
struct Inner {
    state: SummaryState,
    generation: u64,
    last_fingerprint: Option<ReviewSetFingerprint>,
    last_request: Option<(Vec<Review>, String)>,
    has_requested: bool,
}

enum Plan {
    Hit(AiSummary),
    Cleared,
    Fetch { generation: u64, wait: bool },
}

pub struct ReviewSummaryController {
    summarizer: ReviewSummarizer,
    debounce: Duration,
    skip_debounce_on_first_load: bool,
    inner: Mutex<Inner>,
    bus: BusPublisher,
    task: Mutex<Option<JoinHandle<()>>>,
    shutdown: CancellationToken,
}

impl ReviewSummaryController {
    pub fn new(summarizer: ReviewSummarizer, config: &SummaryConfig, bus: BusPublisher) -> Self {
        Self {
            summarizer,
            debounce: config.debounce(),
            skip_debounce_on_first_load: config.skip_debounce_on_first_load,
            inner: Mutex::new(Inner::default()),
            bus,
            task: Mutex::new(None),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> SummaryState {
        self.lock().state.clone()
    }

    /// Summarizes `reviews`, resolving once this request reaches a terminal
    /// state or is superseded.
    pub async fn request_summary(&self, reviews: Vec<Review>, location_name: &str) -> SummaryOutcome {
        self.request(reviews, location_name.to_string(), false).await
    }

    /// Fire-and-forget variant of [`Self::request_summary`]. The previous
    /// submitted task, if any, is aborted.
    pub fn submit(self: &Arc<Self>, reviews: Vec<Review>, location_name: impl Into<String>) {
        let this = Arc::clone(self);
        let location_name = location_name.into();
        let handle = tokio::spawn(async move {
            this.request(reviews, location_name, false).await;
        });
        self.replace_task(Some(handle));
    }

    /// Re-issues the last request, ignoring the held summary and the
    /// debounce window. `None` when nothing was requested yet.
    pub async fn retry(&self) -> Option<SummaryOutcome> {
        let (reviews, location_name) = {
            let mut inner = self.lock();
            inner.last_fingerprint = None;
            inner.last_request.clone()?
        };
        tracing::info!(location = %location_name, "retrying review summary");
        Some(self.request(reviews, location_name, true).await)
    }

    /// Back to `Idle`; the next request counts as a first load again.
    pub async fn clear_summary(&self) {
        self.replace_task(None);
        let snapshot = {
            let mut inner = self.lock();
            inner.generation += 1;
            inner.last_fingerprint = None;
            inner.last_request = None;
            inner.has_requested = false;
            let is_expanded = inner.state.is_expanded;
            inner.state = SummaryState {
                is_expanded,
                ..SummaryState::default()
            };
            inner.state.clone()
        };
        self.publish(snapshot).await;
    }

    pub async fn toggle_expanded(&self) -> bool {
        let snapshot = {
            let mut inner = self.lock();
            inner.state.is_expanded = !inner.state.is_expanded;
            inner.state.clone()
        };
        let expanded = snapshot.is_expanded;
        self.publish(snapshot).await;
        expanded
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.replace_task(None);
    }

    async fn request(&self, reviews: Vec<Review>, location_name: String, immediate: bool) -> SummaryOutcome {
        let fingerprint = ReviewSetFingerprint::compute(&reviews);
        let (plan, snapshot) = self.plan(&reviews, &location_name, fingerprint, immediate);
        self.publish(snapshot).await;

        let (generation, wait) = match plan {
            Plan::Hit(summary) => {
                tracing::debug!(%fingerprint, "review summary cache hit");
                return SummaryOutcome::Cached(summary);
            }
            Plan::Cleared => return SummaryOutcome::Cleared,
            Plan::Fetch { generation, wait } => (generation, wait),
        };

        if wait {
            tokio::select! {
                _ = self.shutdown.cancelled() => return SummaryOutcome::Superseded,
                _ = tokio::time::sleep(self.debounce) => {}
            }
        }

        let Some(snapshot) = self.update_if_current(generation, |inner| {
            inner.state.phase = SummaryPhase::Fetching;
            inner.state.is_loading = true;
            inner.state.error_message = None;
        }) else {
            return SummaryOutcome::Superseded;
        };
        self.publish(snapshot).await;

        let result = tokio::select! {
            _ = self.shutdown.cancelled() => return SummaryOutcome::Superseded,
            result = self.summarizer.generate(&reviews, &location_name) => result,
        };

        match result {
            Ok(summary) => {
                let applied = self.update_if_current(generation, |inner| {
                    inner.state.phase = SummaryPhase::Ready;
                    inner.state.summary = Some(summary.clone());
                    inner.state.is_loading = false;
                    inner.state.error_message = None;
                    inner.last_fingerprint = Some(fingerprint);
                });
                match applied {
                    Some(snapshot) => {
                        tracing::info!(location = %location_name, %fingerprint, "review summary ready");
                        self.publish(snapshot).await;
                        SummaryOutcome::Ready(summary)
                    }
                    None => SummaryOutcome::Superseded,
                }
            }
            Err(e) => {
                let message = e.to_string();
                let applied = self.update_if_current(generation, |inner| {
                    inner.state.phase = SummaryPhase::Failed;
                    inner.state.summary = None;
                    inner.state.is_loading = false;
                    inner.state.error_message = Some(message.clone());
                });
                match applied {
                    Some(snapshot) => {
                        tracing::warn!(location = %location_name, "review summary failed: {message}");
                        self.publish(snapshot).await;
                        SummaryOutcome::Failed(message)
                    }
                    None => SummaryOutcome::Superseded,
                }
            }
        }
    }

    fn plan(
        &self,
        reviews: &[Review],
        location_name: &str,
        fingerprint: ReviewSetFingerprint,
        immediate: bool,
    ) -> (Plan, SummaryState) {
        let mut inner = self.lock();
        inner.generation += 1;
        let generation = inner.generation;

        if inner.last_fingerprint == Some(fingerprint) {
            if let Some(summary) = inner.state.summary.clone() {
                inner.state.phase = SummaryPhase::Ready;
                inner.state.is_loading = false;
                inner.state.error_message = None;
                return (Plan::Hit(summary), inner.state.clone());
            }
        }

        if reviews.is_empty() {
            inner.last_fingerprint = Some(fingerprint);
            inner.state.phase = SummaryPhase::Idle;
            inner.state.summary = None;
            inner.state.error_message = None;
            inner.state.is_loading = false;
            return (Plan::Cleared, inner.state.clone());
        }

        let first_load = !inner.has_requested;
        inner.has_requested = true;
        inner.last_request = Some((reviews.to_vec(), location_name.to_string()));
        let wait = !immediate && !(first_load && self.skip_debounce_on_first_load);
        if wait {
            inner.state.phase = SummaryPhase::Debouncing;
            inner.state.is_loading = false;
        }
        (Plan::Fetch { generation, wait }, inner.state.clone())
    }

    fn update_if_current(
        &self,
        generation: u64,
        apply: impl FnOnce(&mut Inner),
    ) -> Option<SummaryState> {
        let mut inner = self.lock();
        if inner.generation != generation {
            return None;
        }
        apply(&mut inner);
        Some(inner.state.clone())
    }

    async fn publish(&self, state: SummaryState) {
        if let Err(e) = self
            .bus
            .publish(BusMessage::SummaryStateChanged { state })
            .await
        {
            tracing::warn!("failed to publish summary state: {e:#}");
        }
    }

    fn replace_task(&self, handle: Option<JoinHandle<()>>) {
        let previous = {
            let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::replace(&mut *task, handle)
        };
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
