//! Concurrent session registry

use super::session::StompSessionHandler;
use dashmap::DashMap;
use std::sync::Arc;

/// Mapping from session id to the session's handler. Insert and remove are
/// atomic per key; a registration for an existing id replaces the prior
/// handler and returns it.
#[derive(Debug, Default)]
pub(crate) struct SessionRegistry {
    sessions: DashMap<String, Arc<StompSessionHandler>>,
}

impl SessionRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(
        &self,
        session_id: String,
        handler: Arc<StompSessionHandler>,
    ) -> Option<Arc<StompSessionHandler>> {
        self.sessions.insert(session_id, handler)
    }

    pub(crate) fn get(&self, session_id: &str) -> Option<Arc<StompSessionHandler>> {
        self.sessions
            .get(session_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    pub(crate) fn remove(&self, session_id: &str) -> Option<Arc<StompSessionHandler>> {
        self.sessions.remove(session_id).map(|(_, handler)| handler)
    }

    pub(crate) fn contains(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    pub(crate) fn len(&self) -> usize {
        self.sessions.len()
    }
}
