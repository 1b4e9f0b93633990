//! In-memory registry of live exec sessions.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError, RwLock},
};

use quickdocker_core::TermSize;
use serde::Serialize;

use crate::bridge::CancelFlag;

/// Runtime-assigned exec id.
pub type SessionId = String;

/// Lifecycle of one exec session. States only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Created,
    Attached,
    Streaming,
    Closing,
    Closed,
}

/// Shared bookkeeping for one session.
#[derive(Debug)]
pub struct SessionRecord {
    id: SessionId,
    container_id: String,
    size: Mutex<TermSize>,
    state: Mutex<SessionState>,
    cancel: CancelFlag,
}

impl SessionRecord {
    pub(crate) fn new(id: SessionId, container_id: impl Into<String>, size: TermSize) -> Self {
        Self {
            id,
            container_id: container_id.into(),
            size: Mutex::new(size),
            state: Mutex::new(SessionState::Created),
            cancel: CancelFlag::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    #[must_use]
    pub fn size(&self) -> TermSize {
        *self.size.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set_size(&self, size: TermSize) {
        *self.size.lock().unwrap_or_else(PoisonError::into_inner) = size;
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move to `next` if it is later than the current state.
    pub(crate) fn advance(&self, next: SessionState) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if next > *state {
            *state = next;
            true
        } else {
            false
        }
    }

    #[must_use]
    pub const fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    #[must_use]
    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id.clone(),
            container_id: self.container_id.clone(),
            size: self.size(),
            state: self.state(),
        }
    }
}

/// Point-in-time view of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub id: SessionId,
    pub container_id: String,
    pub size: TermSize,
    pub state: SessionState,
}

/// Live sessions keyed by id.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<SessionRecord>>>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: Arc<SessionRecord>) {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(record.id.clone(), record);
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<SessionRecord>> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    pub fn remove(&self, id: &str) -> Option<Arc<SessionRecord>> {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }

    /// Snapshot of all sessions, ordered by id.
    #[must_use]
    pub fn list(&self) -> Vec<SessionInfo> {
        let mut infos: Vec<SessionInfo> = self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|r| r.info())
            .collect();
        infos.sort_by(|a, b| a.id.cmp(&b.id));
        infos
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Removes a session from its registry when dropped and marks it closed.
#[derive(Debug)]
pub(crate) struct Registration {
    registry: Arc<SessionRegistry>,
    record: Arc<SessionRecord>,
}

impl Registration {
    pub(crate) fn new(registry: Arc<SessionRegistry>, record: Arc<SessionRecord>) -> Self {
        registry.insert(Arc::clone(&record));
        Self { registry, record }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.record.advance(SessionState::Closed);
        self.record.cancel.cancel();
        self.registry.remove(&self.record.id);
        tracing::debug!(session_id = %self.record.id, "Session deregistered");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str) -> Arc<SessionRecord> {
        Arc::new(SessionRecord::new(id.to_string(), "web-1", TermSize::default()))
    }

    #[test]
    fn test_state_only_moves_forward() {
        let r = record("exec-1");
        assert_eq!(r.state(), SessionState::Created);
        assert!(r.advance(SessionState::Streaming));
        assert!(!r.advance(SessionState::Attached));
        assert_eq!(r.state(), SessionState::Streaming);
        assert!(r.advance(SessionState::Closed));
        assert!(!r.advance(SessionState::Closing));
    }

    #[test]
    fn test_registration_drop_removes() {
        let registry = Arc::new(SessionRegistry::new());
        let r = record("exec-1");
        let registration = Registration::new(Arc::clone(&registry), Arc::clone(&r));
        assert_eq!(registry.len(), 1);
        assert!(registry.get("exec-1").is_some());

        drop(registration);
        assert!(registry.is_empty());
        assert_eq!(r.state(), SessionState::Closed);
        assert!(r.cancel_flag().is_cancelled());
    }

    #[test]
    fn test_list_sorted() {
        let registry = SessionRegistry::new();
        registry.insert(record("exec-2"));
        registry.insert(record("exec-1"));
        let ids: Vec<_> = registry.list().into_iter().map(|i| i.id).collect();
        assert_eq!(ids, vec!["exec-1", "exec-2"]);
    }
}
