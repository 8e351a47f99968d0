//! The session store contract.

use async_trait::async_trait;

use crate::error::Result;
use crate::record::{SessionId, SessionRecord};

/// Storage backend for session records.
///
/// Any backend — in-memory, relational, key-value — implements this trait
/// and is swappable without touching the middleware; the middleware holds an
/// `Arc<dyn SessionStore>`.
///
/// # Contract
///
/// - [`load`](Self::load) of a record whose idle deadline has passed behaves
///   as not-found, whether or not the row was physically removed yet (lazy
///   expiry).
/// - [`save`](Self::save) of a record already idle-expired at call time may
///   silently no-op; active deletion is not required.
/// - [`delete`](Self::delete) is idempotent: deleting an absent id is not an
///   error.
/// - [`delete_expired`](Self::delete_expired) removes every idle-expired
///   record. It need not be atomic with concurrent saves of the same ids;
///   such races resolve in favor of whichever call lands last.
/// - All four methods must tolerate concurrent calls from independent
///   requests against independent ids without corrupting shared state. The
///   middleware's concurrency guard ensures at most one in-flight request
///   *per id*; the store never sees concurrent mutations of the same id from
///   the middleware, only from [`delete_expired`] sweeps.
///
/// [`delete_expired`]: Self::delete_expired
#[async_trait]
pub trait SessionStore: Send + Sync + 'static {
    /// Load the record for `id`, or `None` if absent or idle-expired.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Store`](crate::SessionError::Store) if the
    /// backend fails. A miss is `Ok(None)`, never an error.
    async fn load(&self, id: &SessionId) -> Result<Option<SessionRecord>>;

    /// Save `record`, replacing any previous record with the same id.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Store`](crate::SessionError::Store) if the
    /// backend fails.
    async fn save(&self, record: &SessionRecord) -> Result<()>;

    /// Delete the record for `id`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Store`](crate::SessionError::Store) if the
    /// backend fails.
    async fn delete(&self, id: &SessionId) -> Result<()>;

    /// Delete every record whose idle deadline has passed.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Store`](crate::SessionError::Store) if the
    /// backend fails.
    async fn delete_expired(&self) -> Result<()>;
}
