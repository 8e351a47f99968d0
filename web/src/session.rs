//! The request-scoped session handle.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use sessionware_core::{Codec, SessionId, SessionRecord};
use tracing::error;

/// Handle to the session checked out for the current request.
///
/// Obtained as an axum extractor (or from request extensions) inside a
/// router wrapped with [`SessionLayer`](crate::SessionLayer). The handle is
/// cheap to clone; all clones refer to the same per-request state.
///
/// None of the operations below touch the store. Mutations are buffered on
/// the handle and persisted exactly once, when the response is written:
/// a deleted session becomes a store delete plus a cookie removal, a dirty
/// one becomes a store save plus a refreshed cookie, an untouched one leaves
/// both store and cookie alone.
///
/// The handle's lifetime is one request. Keeping a clone beyond the response
/// (e.g. in a spawned task) is possible but pointless: mutations made after
/// the response began are never persisted.
#[derive(Debug)]
pub struct Session<T> {
    state: Arc<Mutex<SessionState<T>>>,
}

impl<T> Clone for Session<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

#[derive(Debug)]
struct SessionState<T> {
    id: SessionId,
    /// Unset until the first save computes it.
    idle_deadline: Option<DateTime<Utc>>,
    absolute_deadline: DateTime<Utc>,
    /// Needed by renewals, which reset the absolute deadline.
    absolute_timeout: chrono::Duration,
    /// `None` once the session was deleted this request.
    payload: Option<T>,
    dirty: bool,
    /// Ids superseded by renewals; their rows are removed at commit.
    stale_ids: Vec<SessionId>,
    committed: bool,
}

const DELETED_MSG: &str =
    "session already deleted within this request; delete must be the last session access";

impl<T> Session<T> {
    /// Fresh session for a client that presented no usable cookie.
    pub(crate) fn fresh(absolute_timeout: chrono::Duration, now: DateTime<Utc>) -> Self
    where
        T: Default,
    {
        Self {
            state: Arc::new(Mutex::new(SessionState {
                id: SessionId::random(),
                idle_deadline: None,
                absolute_deadline: now + absolute_timeout,
                absolute_timeout,
                payload: Some(T::default()),
                dirty: false,
                stale_ids: Vec::new(),
                committed: false,
            })),
        }
    }

    /// Session checked out of the store.
    pub(crate) fn from_record(
        record: &SessionRecord,
        payload: T,
        absolute_timeout: chrono::Duration,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(SessionState {
                id: record.id.clone(),
                idle_deadline: Some(record.idle_deadline),
                absolute_deadline: record.absolute_deadline,
                absolute_timeout,
                payload: Some(payload),
                dirty: false,
                stale_ids: Vec::new(),
                committed: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Read the payload without marking the session dirty.
    ///
    /// Any number of reads leaves persisted state, deadlines and the cookie
    /// untouched.
    ///
    /// # Panics
    ///
    /// Panics if [`delete`](Self::delete) was already called this request —
    /// that is a wiring bug, not a runtime condition.
    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let state = self.lock();
        match &state.payload {
            Some(payload) => f(payload),
            None => panic!("{DELETED_MSG}"),
        }
    }

    /// Mutate the payload, marking the session dirty.
    ///
    /// A dirty session is saved when the response is written, with its idle
    /// deadline recomputed.
    ///
    /// # Panics
    ///
    /// Panics if [`delete`](Self::delete) was already called this request.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut state = self.lock();
        state.dirty = true;
        match &mut state.payload {
            Some(payload) => f(payload),
            None => panic!("{DELETED_MSG}"),
        }
    }

    /// Replace the payload wholesale, marking the session dirty.
    ///
    /// # Panics
    ///
    /// Panics if [`delete`](Self::delete) was already called this request.
    pub fn set(&self, value: T) {
        let mut state = self.lock();
        assert!(state.payload.is_some(), "{DELETED_MSG}");
        state.payload = Some(value);
        state.dirty = true;
    }

    /// Mark the session deleted.
    ///
    /// When the response is written the record is removed from the store and
    /// the client is told to erase its cookie. Idempotent within a request;
    /// any *other* session access after this one panics.
    pub fn delete(&self) {
        self.lock().payload = None;
    }

    /// Replace the session id with a freshly generated one.
    ///
    /// See [`renew_with_id`](Self::renew_with_id).
    ///
    /// # Panics
    ///
    /// Panics if [`delete`](Self::delete) was already called this request.
    pub fn renew(&self) {
        self.renew_with_id(SessionId::random());
    }

    /// Replace the session id, e.g. after privilege escalation.
    ///
    /// The old id's record is removed from the store when the response is
    /// written, the absolute deadline restarts from now, and the session is
    /// marked dirty so the new id is persisted and sent to the client. With
    /// a caller-chosen id it is the caller's responsibility to pick a unique
    /// one.
    ///
    /// # Panics
    ///
    /// Panics if [`delete`](Self::delete) was already called this request.
    pub fn renew_with_id(&self, id: impl Into<SessionId>) {
        let mut state = self.lock();
        assert!(state.payload.is_some(), "{DELETED_MSG}");
        let old = std::mem::replace(&mut state.id, id.into());
        state.stale_ids.push(old);
        state.absolute_deadline = Utc::now() + state.absolute_timeout;
        state.idle_deadline = None;
        state.dirty = true;
    }

    /// The session's current id (the cookie value).
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.lock().id.clone()
    }

    /// The idle deadline, once a save has computed one.
    #[must_use]
    pub fn idle_deadline(&self) -> Option<DateTime<Utc>> {
        self.lock().idle_deadline
    }

    /// The absolute deadline capping this session's lifetime.
    #[must_use]
    pub fn absolute_deadline(&self) -> DateTime<Utc> {
        self.lock().absolute_deadline
    }

    /// Decide what the commit protocol must do, exactly once.
    ///
    /// The first call consumes the buffered mutations and marks the session
    /// committed; later calls (there are none on the happy path) see
    /// [`CommitAction::None`]. A dirty session gets its idle deadline
    /// recomputed here: `min(now + idle_timeout, absolute_deadline)`.
    pub(crate) fn commit_action(
        &self,
        codec: &dyn Codec<T>,
        now: DateTime<Utc>,
        idle_timeout: chrono::Duration,
    ) -> sessionware_core::Result<CommitAction> {
        let mut state = self.lock();
        if state.committed {
            return Ok(CommitAction::None);
        }
        state.committed = true;

        let stale = std::mem::take(&mut state.stale_ids);

        let Some(payload) = &state.payload else {
            return Ok(CommitAction::Delete {
                id: state.id.clone(),
                stale,
            });
        };

        if !state.dirty {
            // Renewals mark dirty, so an untouched session has no stale ids.
            return Ok(CommitAction::None);
        }

        let mut idle_deadline = now + idle_timeout;
        if idle_deadline > state.absolute_deadline {
            idle_deadline = state.absolute_deadline;
        }
        let data = codec.encode(payload)?;
        state.idle_deadline = Some(idle_deadline);

        Ok(CommitAction::Save {
            record: SessionRecord {
                id: state.id.clone(),
                idle_deadline,
                absolute_deadline: state.absolute_deadline,
                data,
            },
            stale,
        })
    }
}

/// What the commit protocol does for one request.
#[derive(Debug)]
pub(crate) enum CommitAction {
    /// Untouched session (or already committed): no store call, no cookie.
    None,
    /// Deleted session: remove rows, tell the client to erase the cookie.
    Delete {
        id: SessionId,
        stale: Vec<SessionId>,
    },
    /// Dirty session: persist the record, refresh the cookie.
    Save {
        record: SessionRecord,
        stale: Vec<SessionId>,
    },
}

/// Rejection when [`Session`] is extracted outside a wrapped router.
///
/// Extracting a session in a router that never installed
/// [`SessionLayer`](crate::SessionLayer) is a wiring bug; the rejection is
/// deliberately loud — a 500 naming the missing layer — rather than a
/// silent empty session.
#[derive(Debug)]
pub struct SessionLayerMissing;

impl IntoResponse for SessionLayerMissing {
    fn into_response(self) -> Response {
        error!("Session extracted without SessionLayer installed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "SessionLayer is not installed on this router",
        )
            .into_response()
    }
}

#[async_trait]
impl<S, T> FromRequestParts<S> for Session<T>
where
    S: Send + Sync,
    T: Send + 'static,
{
    type Rejection = SessionLayerMissing;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Self>()
            .cloned()
            .ok_or(SessionLayerMissing)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::Duration;
    use sessionware_core::JsonCodec;

    fn fresh() -> Session<u64> {
        Session::fresh(Duration::days(7), Utc::now())
    }

    #[test]
    fn read_does_not_mark_dirty() {
        let session = fresh();
        assert_eq!(session.read(|n| *n), 0);
        let action = session
            .commit_action(&JsonCodec, Utc::now(), Duration::hours(24))
            .unwrap();
        assert!(matches!(action, CommitAction::None));
    }

    #[test]
    fn update_marks_dirty_and_commits_a_save() {
        let session = fresh();
        session.update(|n| *n += 1);

        let now = Utc::now();
        let action = session
            .commit_action(&JsonCodec, now, Duration::hours(24))
            .unwrap();
        let CommitAction::Save { record, stale } = action else {
            panic!("expected a save");
        };
        assert!(stale.is_empty());
        assert_eq!(record.id, session.id());
        assert_eq!(record.idle_deadline, now + Duration::hours(24));
        assert_eq!(record.data, b"1");
    }

    #[test]
    fn idle_deadline_is_capped_by_absolute_deadline() {
        let session: Session<u64> = Session::fresh(Duration::hours(1), Utc::now());
        session.update(|n| *n = 5);

        let now = Utc::now();
        let action = session
            .commit_action(&JsonCodec, now, Duration::hours(24))
            .unwrap();
        let CommitAction::Save { record, .. } = action else {
            panic!("expected a save");
        };
        assert_eq!(record.idle_deadline, record.absolute_deadline);
    }

    #[test]
    fn delete_commits_a_delete() {
        let session = fresh();
        let id = session.id();
        session.update(|n| *n = 3);
        session.delete();

        let action = session
            .commit_action(&JsonCodec, Utc::now(), Duration::hours(24))
            .unwrap();
        let CommitAction::Delete { id: deleted, .. } = action else {
            panic!("expected a delete");
        };
        assert_eq!(deleted, id);
    }

    #[test]
    fn renew_queues_old_id_for_removal_and_resets_absolute_deadline() {
        let session = fresh();
        let old_id = session.id();
        let old_absolute = session.absolute_deadline();

        std::thread::sleep(std::time::Duration::from_millis(5));
        session.renew_with_id("known");

        assert_eq!(session.id(), SessionId::from("known"));
        assert!(session.absolute_deadline() > old_absolute);

        let action = session
            .commit_action(&JsonCodec, Utc::now(), Duration::hours(24))
            .unwrap();
        let CommitAction::Save { record, stale } = action else {
            panic!("expected a save");
        };
        assert_eq!(record.id, SessionId::from("known"));
        assert_eq!(stale, vec![old_id]);
    }

    #[test]
    fn renew_then_delete_removes_both_ids() {
        let session = fresh();
        let old_id = session.id();
        session.renew();
        session.delete();

        let action = session
            .commit_action(&JsonCodec, Utc::now(), Duration::hours(24))
            .unwrap();
        let CommitAction::Delete { id, stale } = action else {
            panic!("expected a delete");
        };
        assert_ne!(id, old_id);
        assert_eq!(stale, vec![old_id]);
    }

    #[test]
    fn commit_action_is_one_shot() {
        let session = fresh();
        session.update(|n| *n = 9);

        let first = session
            .commit_action(&JsonCodec, Utc::now(), Duration::hours(24))
            .unwrap();
        assert!(matches!(first, CommitAction::Save { .. }));

        let second = session
            .commit_action(&JsonCodec, Utc::now(), Duration::hours(24))
            .unwrap();
        assert!(matches!(second, CommitAction::None));
    }

    #[test]
    #[should_panic(expected = "already deleted")]
    fn read_after_delete_panics() {
        let session = fresh();
        session.delete();
        session.read(|n| *n);
    }

    #[test]
    #[should_panic(expected = "already deleted")]
    fn update_after_delete_panics() {
        let session = fresh();
        session.delete();
        session.update(|n| *n += 1);
    }

    #[test]
    #[should_panic(expected = "already deleted")]
    fn renew_after_delete_panics() {
        let session = fresh();
        session.delete();
        session.renew();
    }

    #[test]
    fn delete_is_idempotent_within_a_request() {
        let session = fresh();
        session.delete();
        session.delete();
    }
}
