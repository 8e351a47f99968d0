//! At-most-one-in-flight-request-per-session enforcement.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use sessionware_core::SessionId;

/// Set of session ids that currently have a request in flight.
///
/// Registration is an atomic insert-if-absent; a second request for the same
/// id is rejected, not queued. Shared by every service built from one layer.
#[derive(Debug, Clone, Default)]
pub(crate) struct ActiveSessions {
    ids: Arc<Mutex<HashSet<SessionId>>>,
}

impl ActiveSessions {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register `id` as in use. Returns `None` if it already is.
    ///
    /// The returned guard unregisters the id when dropped, which covers every
    /// exit path of the request future, including unwinds and cancellation.
    pub(crate) fn acquire(&self, id: SessionId) -> Option<ActiveGuard> {
        let mut ids = lock(&self.ids);
        if !ids.insert(id.clone()) {
            return None;
        }
        drop(ids);
        Some(ActiveGuard {
            id,
            ids: Arc::clone(&self.ids),
        })
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, id: &SessionId) -> bool {
        lock(&self.ids).contains(id)
    }
}

// The set must stay usable even if a holder panicked mid-operation; the
// HashSet cannot be left in a torn state by insert/remove.
fn lock(ids: &Mutex<HashSet<SessionId>>) -> MutexGuard<'_, HashSet<SessionId>> {
    ids.lock().unwrap_or_else(PoisonError::into_inner)
}

/// RAII registration of one in-flight session id.
#[derive(Debug)]
pub(crate) struct ActiveGuard {
    id: SessionId,
    ids: Arc<Mutex<HashSet<SessionId>>>,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        lock(&self.ids).remove(&self.id);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_of_same_id_is_rejected() {
        let active = ActiveSessions::new();
        let id = SessionId::from("s-1");

        let first = active.acquire(id.clone());
        assert!(first.is_some());
        assert!(active.acquire(id.clone()).is_none());

        drop(first);
        assert!(active.acquire(id).is_some());
    }

    #[test]
    fn distinct_ids_are_independent() {
        let active = ActiveSessions::new();
        let a = active.acquire(SessionId::from("a"));
        let b = active.acquire(SessionId::from("b"));
        assert!(a.is_some());
        assert!(b.is_some());
    }

    #[test]
    fn guard_releases_on_unwind() {
        let active = ActiveSessions::new();
        let id = SessionId::from("panicky");

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = active.acquire(id.clone());
            panic!("handler blew up");
        }));
        assert!(result.is_err());

        // The unwind dropped the guard, so the id is free again.
        assert!(!active.contains(&id));
        assert!(active.acquire(id).is_some());
    }
}
