use std::sync::{Arc, Mutex};

use uuid::Uuid;
use veou_schema::SearchSession;

/// Holds the one current [`SearchSession`] for a controller. Starting a new
/// session supersedes whatever was in flight; completions compare their id
/// against [`SessionTracker::is_current`] before applying anything.
///
/// The lock is never held across an await.
#[derive(Clone, Default)]
pub struct SessionTracker {
    current: Arc<Mutex<Option<SearchSession>>>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self, query: impl Into<String>) -> SearchSession {
        let session = SearchSession::new(query);
        *self.lock() = Some(session.clone());
        session
    }

    pub fn is_current(&self, session_id: Uuid) -> bool {
        self.lock()
            .as_ref()
            .is_some_and(|s| s.session_id == session_id)
    }

    pub fn current(&self) -> Option<SearchSession> {
        self.lock().clone()
    }

    /// Drops the current session so that every in-flight result is stale.
    pub fn invalidate(&self) {
        *self.lock() = None;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<SearchSession>> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}
