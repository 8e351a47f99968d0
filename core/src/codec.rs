//! Payload codecs.
//!
//! A [`Codec`] converts the application-defined session payload to and from
//! the bytes a [`SessionStore`](crate::SessionStore) persists. The middleware
//! decodes once when a record is checked out and encodes once when it is
//! saved, so codec cost is paid at most twice per request.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{Result, SessionError};

/// Converts session payloads to and from stored bytes.
///
/// Codec failures are reported as [`SessionError::Codec`] and are handled by
/// the middleware exactly like store failures.
pub trait Codec<T>: Send + Sync {
    /// Encode a payload into bytes for the store.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Codec`] if the payload cannot be serialized.
    fn encode(&self, session: &T) -> Result<Vec<u8>>;

    /// Decode a payload from stored bytes.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Codec`] if the bytes are not a valid encoding
    /// of `T`.
    fn decode(&self, data: &[u8]) -> Result<T>;
}

/// JSON codec; the default.
///
/// Self-describing and debuggable at the cost of size: stored payloads can be
/// inspected with any SQL client or cache tool.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl<T> Codec<T> for JsonCodec
where
    T: Serialize + DeserializeOwned,
{
    fn encode(&self, session: &T) -> Result<Vec<u8>> {
        serde_json::to_vec(session).map_err(SessionError::codec)
    }

    fn decode(&self, data: &[u8]) -> Result<T> {
        serde_json::from_slice(data).map_err(SessionError::codec)
    }
}

/// Compact binary codec.
///
/// Not self-describing; both ends must agree on the payload type, including
/// across deployments that share a store.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl<T> Codec<T> for BincodeCodec
where
    T: Serialize + DeserializeOwned,
{
    fn encode(&self, session: &T) -> Result<Vec<u8>> {
        bincode::serialize(session).map_err(SessionError::codec)
    }

    fn decode(&self, data: &[u8]) -> Result<T> {
        bincode::deserialize(data).map_err(SessionError::codec)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Payload {
        user: Option<String>,
        visits: u32,
    }

    #[test]
    fn json_round_trip() {
        let payload = Payload {
            user: Some("ferris".into()),
            visits: 3,
        };
        let bytes = JsonCodec.encode(&payload).unwrap();
        let decoded: Payload = JsonCodec.decode(&bytes).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn bincode_round_trip() {
        let payload = Payload {
            user: None,
            visits: u32::MAX,
        };
        let bytes = BincodeCodec.encode(&payload).unwrap();
        let decoded: Payload = BincodeCodec.decode(&bytes).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn garbage_bytes_fail_as_codec_error() {
        let err = <JsonCodec as Codec<Payload>>::decode(&JsonCodec, b"not json").unwrap_err();
        assert!(matches!(err, SessionError::Codec(_)));
    }
}
