// src/services/session_tracker.rs
use log::debug;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// One analysis started on behalf of a client session.
///
/// Dropping the ticket (a finished request, or a handler abandoned when the
/// client disconnects) clears the session entry if it still points here.
#[derive(Debug)]
pub struct Ticket<'a> {
    tracker: &'a SessionTracker,
    pub session_id: Uuid,
    pub request_id: Uuid,
}

impl Ticket<'_> {
    /// Hands back `result` only if this is still the session's newest
    /// request.
    pub fn finish<T>(self, result: T) -> Option<T> {
        if self.tracker.is_current(&self) {
            Some(result)
        } else {
            debug!(
                "Discarding stale result {} for session {}",
                self.request_id, self.session_id
            );
            None
        }
    }
}

impl Drop for Ticket<'_> {
    fn drop(&mut self) {
        let mut latest = self.tracker.lock();
        if latest.get(&self.session_id) == Some(&self.request_id) {
            latest.remove(&self.session_id);
        }
    }
}

/// Tracks the newest analysis per client session so that a late result can
/// never overwrite a newer request's state.
#[derive(Debug, Default)]
pub struct SessionTracker {
    latest: Mutex<HashMap<Uuid, Uuid>>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Uuid>> {
        self.latest.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Starts a request for `session_id`; any earlier ticket for the same
    /// session is superseded.
    pub fn begin(&self, session_id: Uuid) -> Ticket<'_> {
        let request_id = Uuid::new_v4();
        if let Some(previous) = self.lock().insert(session_id, request_id) {
            debug!("Session {session_id}: request {previous} superseded by {request_id}");
        }
        Ticket {
            tracker: self,
            session_id,
            request_id,
        }
    }

    pub fn is_current(&self, ticket: &Ticket<'_>) -> bool {
        self.lock().get(&ticket.session_id) == Some(&ticket.request_id)
    }

    /// Abandons whatever is in flight for the session.
    pub fn reset(&self, session_id: &Uuid) -> bool {
        self.lock().remove(session_id).is_some()
    }

    pub fn in_flight(&self) -> usize {
        self.lock().len()
    }
}
