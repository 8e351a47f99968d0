//! Session records and identifiers.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Opaque session identifier, carried as the cookie value.
///
/// Generated identifiers encode 32 bytes of OS-seeded randomness as URL-safe
/// base64 without padding, so they are safe to place in a cookie value
/// unquoted. Identifiers supplied by the application (for explicit renewal)
/// can be any string; it is the caller's responsibility to pick a unique one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

/// Bytes of randomness backing a generated identifier.
const ID_RANDOM_BYTES: usize = 32;

impl SessionId {
    /// Generate a new random identifier.
    #[must_use]
    pub fn random() -> Self {
        let mut bytes = [0u8; ID_RANDOM_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// View the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A session's persisted state.
///
/// The payload travels as codec-encoded bytes so that out-of-process stores
/// (SQL, key-value) can persist it without knowing its shape.
///
/// Invariant: `idle_deadline <= absolute_deadline`. The middleware maintains
/// it by computing `idle_deadline = min(now + idle_timeout,
/// absolute_deadline)` on every save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    /// Identifier; doubles as the cookie value.
    pub id: SessionId,

    /// Sliding expiry: the record is dead once `now` passes this.
    pub idle_deadline: DateTime<Utc>,

    /// Hard cap on the session's lifetime, fixed at creation or renewal.
    pub absolute_deadline: DateTime<Utc>,

    /// Codec-encoded application payload.
    pub data: Vec<u8>,
}

impl SessionRecord {
    /// Whether the record's idle deadline has passed at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.idle_deadline
    }

    /// Whether the record's idle deadline has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(idle: DateTime<Utc>, absolute: DateTime<Utc>) -> SessionRecord {
        SessionRecord {
            id: SessionId::random(),
            idle_deadline: idle,
            absolute_deadline: absolute,
            data: Vec::new(),
        }
    }

    #[test]
    fn random_ids_are_unique() {
        let a = SessionId::random();
        let b = SessionId::random();
        assert_ne!(a, b);
    }

    #[test]
    fn random_ids_are_cookie_safe() {
        let id = SessionId::random();
        // 32 bytes -> 43 chars of unpadded base64
        assert_eq!(id.as_str().len(), 43);
        assert!(
            id.as_str()
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn id_round_trips_through_display() {
        let id = SessionId::from("known-id");
        assert_eq!(id.to_string(), "known-id");
        assert_eq!(SessionId::from(id.to_string()), id);
    }

    #[test]
    fn expiry_follows_idle_deadline() {
        let now = Utc::now();
        let live = record(now + Duration::hours(1), now + Duration::days(7));
        assert!(!live.is_expired_at(now));

        let dead = record(now - Duration::seconds(1), now + Duration::days(7));
        assert!(dead.is_expired_at(now));
    }

    #[test]
    fn deadline_exactly_now_is_not_expired() {
        let now = Utc::now();
        let r = record(now, now + Duration::days(7));
        assert!(!r.is_expired_at(now));
    }
}
