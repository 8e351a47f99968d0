//! Error types for session tracking operations.

use thiserror::Error;

use crate::record::SessionId;

/// Result type alias for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;

/// Error taxonomy for session tracking.
///
/// Store and codec failures are runtime conditions: the middleware recovers
/// from them at the request boundary by invoking the configured error
/// handler. [`SessionError::ConcurrentSession`] is a distinct variant so
/// callers can special-case it (log differently, return 409, …) without
/// matching on message strings.
///
/// Programmer misuse — touching a session handle after deleting it, or
/// extracting one in a router that never installed the layer — is *not*
/// represented here; those fail loudly at the call site because they
/// indicate a wiring bug, not a runtime condition.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The backing store failed to load, save or delete a record.
    #[error("session store error: {0}")]
    Store(String),

    /// The session payload could not be encoded or decoded.
    #[error("session codec error: {0}")]
    Codec(String),

    /// Another request is already checked out for this session.
    ///
    /// Concurrent requests for the same session are rejected, not queued:
    /// the first to register wins and later ones see this error.
    #[error("another request is active for session {id}")]
    ConcurrentSession {
        /// The contested session identifier.
        id: SessionId,
    },
}

impl SessionError {
    /// Build a [`SessionError::Store`] from any displayable error.
    pub fn store(err: impl std::fmt::Display) -> Self {
        Self::Store(err.to_string())
    }

    /// Build a [`SessionError::Codec`] from any displayable error.
    pub fn codec(err: impl std::fmt::Display) -> Self {
        Self::Codec(err.to_string())
    }

    /// Returns `true` if this error is a concurrent-session conflict.
    ///
    /// # Examples
    ///
    /// ```
    /// # use sessionware_core::{SessionError, SessionId};
    /// let err = SessionError::ConcurrentSession { id: SessionId::random() };
    /// assert!(err.is_conflict());
    /// assert!(!SessionError::Store("down".into()).is_conflict());
    /// ```
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::ConcurrentSession { .. })
    }
}
