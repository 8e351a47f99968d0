//! # Sessionware Core
//!
//! Session records, the store contract and reference stores for cookie-tracked
//! HTTP sessions.
//!
//! This crate is the storage-facing half of Sessionware. It knows nothing
//! about HTTP: the middleware in `sessionware-web` resolves a [`SessionId`]
//! from a request cookie, checks a [`SessionRecord`] out of a
//! [`SessionStore`], and checks it back in when the response is written.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │        sessionware-web (middleware)      │  ← cookies, deadlines,
//! │                                          │    deferred persistence
//! ├──────────────────────────────────────────┤
//! │        sessionware-core (this crate)     │
//! │  - SessionRecord / SessionId             │  ← what is persisted
//! │  - Codec: payload <-> bytes              │  ← serialization boundary
//! │  - SessionStore contract                 │  ← swappable backends
//! │  - MemoryStore reference implementation  │
//! └──────────────────────────────────────────┘
//! ```
//!
//! ## Expiry model
//!
//! Every record carries two deadlines. The *idle* deadline slides forward on
//! each save; the *absolute* deadline is fixed when the session is created or
//! renewed and caps its lifetime regardless of activity. Stores treat a
//! record whose idle deadline has passed as absent ([`SessionStore::load`]
//! returns `None`) without being required to remove the row eagerly — that is
//! the job of a periodic [`SessionStore::delete_expired`] sweep.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod codec;
pub mod error;
pub mod memory;
pub mod record;
pub mod store;

#[cfg(feature = "test-utils")]
pub mod mocks;

pub use codec::{BincodeCodec, Codec, JsonCodec};
pub use error::{Result, SessionError};
pub use memory::MemoryStore;
pub use record::{SessionId, SessionRecord};
pub use store::SessionStore;
