//! # Sessionware Web
//!
//! Cookie-tracked HTTP session middleware for axum/tower.
//!
//! The middleware resolves a session from the request's cookie, checks it out
//! of a [`SessionStore`], hands the handler a request-scoped [`Session`]
//! handle, and defers all persistence to the moment the response is released
//! — so handlers can mutate, renew or delete session state freely and exactly
//! one store write (or delete) happens per request.
//!
//! ## Request flow
//!
//! ```text
//! request ──► resolve cookie ──► Store.load / fresh record
//!                 │
//!                 ▼
//!          concurrency guard (one in-flight request per session id)
//!                 │
//!                 ▼
//!          handler runs against Session<T> (read / update / delete / renew)
//!                 │
//!                 ▼
//!          commit: Store.delete or Store.save + Set-Cookie, exactly once
//! ```
//!
//! A request that never touches the session performs no store write and emits
//! no `Set-Cookie`; deadlines do not slide on read-only traffic.
//!
//! ## Example
//!
//! ```ignore
//! use axum::{routing::get, Router};
//! use serde::{Deserialize, Serialize};
//! use sessionware_web::{Session, SessionLayer};
//!
//! #[derive(Default, Serialize, Deserialize)]
//! struct Visits {
//!     count: u64,
//! }
//!
//! async fn hello(session: Session<Visits>) -> String {
//!     let count = session.update(|v| {
//!         v.count += 1;
//!         v.count
//!     });
//!     format!("visit #{count}")
//! }
//!
//! let app: Router = Router::new()
//!     .route("/", get(hello))
//!     .layer(SessionLayer::<Visits>::new());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cleanup;
pub mod config;
pub mod layer;
pub mod session;

mod guard;

pub use cleanup::CleanupTask;
pub use config::{CookieOptions, ErrorHandler};
pub use layer::{SessionLayer, SessionService};
pub use session::{Session, SessionLayerMissing};

// The cookie template speaks the `cookie` crate's SameSite dialect.
pub use cookie::SameSite;

// Storage-facing types, re-exported so simple consumers need one import.
pub use sessionware_core::{
    BincodeCodec, Codec, JsonCodec, MemoryStore, Result, SessionError, SessionId, SessionRecord,
    SessionStore,
};
