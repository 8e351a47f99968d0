//! The session middleware: tower layer and service.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::extract::Request;
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue};
use axum::response::Response;
use chrono::Utc;
use cookie::Cookie;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tower::{Layer, Service};

use sessionware_core::{
    Codec, JsonCodec, MemoryStore, SessionError, SessionId, SessionRecord, SessionStore,
};

use crate::config::{CookieOptions, ErrorHandler, SessionConfig, default_error_handler};
use crate::guard::ActiveSessions;
use crate::session::{CommitAction, Session};

/// Sessions stay active for this long without a request, unless configured
/// otherwise.
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Hard cap on session lifetime regardless of activity, unless configured
/// otherwise. See the OWASP session management cheat sheet on absolute
/// timeouts.
const DEFAULT_ABSOLUTE_TIMEOUT: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Tower layer that tracks HTTP sessions with a cookie.
///
/// Construct one per application, configure it with the `with_*` builders,
/// and install it with `Router::layer`. All services built from one layer
/// share the store and the per-session concurrency guard; configuration is
/// immutable once the layer is installed.
///
/// # Duplicate cookies
///
/// A request carrying more than one cookie with the configured name is
/// treated as carrying none, and proceeds with a fresh session. Picking one
/// of several conflicting ids could resurrect the wrong session; erroring
/// would punish clients left with stale duplicates on overlapping paths.
pub struct SessionLayer<T> {
    idle_timeout: chrono::Duration,
    absolute_timeout: chrono::Duration,
    cookie: CookieOptions,
    store: Arc<dyn SessionStore>,
    codec: Arc<dyn Codec<T>>,
    error_handler: ErrorHandler,
    active: ActiveSessions,
}

impl<T> Clone for SessionLayer<T> {
    fn clone(&self) -> Self {
        Self {
            idle_timeout: self.idle_timeout,
            absolute_timeout: self.absolute_timeout,
            cookie: self.cookie.clone(),
            store: Arc::clone(&self.store),
            codec: Arc::clone(&self.codec),
            error_handler: Arc::clone(&self.error_handler),
            active: self.active.clone(),
        }
    }
}

impl<T> SessionLayer<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Create a layer with defaults: in-memory store, JSON codec, 24 h idle
    /// timeout, 7 d absolute timeout, cookie `id` (HttpOnly, Secure,
    /// SameSite=Lax, path `/`), log-and-500 error handler.
    #[must_use]
    pub fn new() -> Self {
        Self {
            idle_timeout: to_chrono(DEFAULT_IDLE_TIMEOUT),
            absolute_timeout: to_chrono(DEFAULT_ABSOLUTE_TIMEOUT),
            cookie: CookieOptions::default(),
            store: Arc::new(MemoryStore::new()),
            codec: Arc::new(JsonCodec),
            error_handler: Arc::new(default_error_handler),
            active: ActiveSessions::new(),
        }
    }
}

impl<T> Default for SessionLayer<T>
where
    T: Serialize + DeserializeOwned,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SessionLayer<T> {
    /// Set how long a session survives without a request.
    #[must_use]
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = to_chrono(timeout);
        self
    }

    /// Set the hard cap on session lifetime from creation or renewal.
    #[must_use]
    pub fn with_absolute_timeout(mut self, timeout: Duration) -> Self {
        self.absolute_timeout = to_chrono(timeout);
        self
    }

    /// Set the cookie template.
    #[must_use]
    pub fn with_cookie(mut self, cookie: CookieOptions) -> Self {
        self.cookie = cookie;
        self
    }

    /// Swap the backing store.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = store;
        self
    }

    /// Swap the payload codec.
    #[must_use]
    pub fn with_codec(mut self, codec: impl Codec<T> + 'static) -> Self {
        self.codec = Arc::new(codec);
        self
    }

    /// Install a custom error handler deciding the user-visible response for
    /// store, codec and concurrency errors.
    #[must_use]
    pub fn with_error_handler(
        mut self,
        handler: impl Fn(&SessionError) -> Response + Send + Sync + 'static,
    ) -> Self {
        self.error_handler = Arc::new(handler);
        self
    }

    /// A handle to the backing store, e.g. for
    /// [`CleanupTask::spawn`](crate::CleanupTask::spawn).
    #[must_use]
    pub fn store(&self) -> Arc<dyn SessionStore> {
        Arc::clone(&self.store)
    }

    /// Seed the store with `(id, payload)` pairs, with the deadlines a fresh
    /// save would compute. For tests and fixtures.
    ///
    /// # Errors
    ///
    /// Returns the first store or codec error encountered.
    pub async fn seed<I>(&self, entries: I) -> sessionware_core::Result<()>
    where
        I: IntoIterator<Item = (SessionId, T)>,
    {
        let now = Utc::now();
        for (id, payload) in entries {
            let absolute_deadline = now + self.absolute_timeout;
            let mut idle_deadline = now + self.idle_timeout;
            if idle_deadline > absolute_deadline {
                idle_deadline = absolute_deadline;
            }
            let data = self.codec.encode(&payload)?;
            self.store
                .save(&SessionRecord {
                    id,
                    idle_deadline,
                    absolute_deadline,
                    data,
                })
                .await?;
        }
        Ok(())
    }
}

impl<S, T> Layer<S> for SessionLayer<T> {
    type Service = SessionService<S, T>;

    fn layer(&self, inner: S) -> Self::Service {
        SessionService {
            inner,
            config: Arc::new(SessionConfig {
                idle_timeout: self.idle_timeout,
                absolute_timeout: self.absolute_timeout,
                cookie: self.cookie.clone(),
                store: Arc::clone(&self.store),
                codec: Arc::clone(&self.codec),
                error_handler: Arc::clone(&self.error_handler),
                active: self.active.clone(),
            }),
        }
    }
}

/// Middleware service built by [`SessionLayer`].
pub struct SessionService<S, T> {
    inner: S,
    config: Arc<SessionConfig<T>>,
}

impl<S: Clone, T> Clone for SessionService<S, T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            config: Arc::clone(&self.config),
        }
    }
}

impl<S, T> Service<Request> for SessionService<S, T>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
    T: Default + Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future =
        Pin<Box<dyn Future<Output = std::result::Result<Response, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<std::result::Result<(), S::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        let config = Arc::clone(&self.config);
        // Own the service that was polled ready; leave a fresh clone behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let cookie_id = single_session_cookie(req.headers(), &config.cookie.name);

            // A load miss covers both "no such record" and "idle-expired":
            // either way the client's cookie is no longer good.
            let loaded = match &cookie_id {
                Some(id) => match config.store.load(id).await {
                    Ok(record) => record,
                    Err(err) => return Ok((config.error_handler)(&err)),
                },
                None => None,
            };

            let session = match &loaded {
                Some(record) => match config.codec.decode(&record.data) {
                    Ok(payload) => Session::from_record(record, payload, config.absolute_timeout),
                    Err(err) => return Ok((config.error_handler)(&err)),
                },
                None => Session::fresh(config.absolute_timeout, Utc::now()),
            };

            // At most one in-flight request per session id; the loser is
            // rejected, not queued. The guard drops on every exit path.
            let id = session.id();
            let Some(_active) = config.active.acquire(id.clone()) else {
                let err = SessionError::ConcurrentSession { id };
                return Ok((config.error_handler)(&err));
            };

            req.extensions_mut().insert(session.clone());
            let response = inner.call(req).await?;

            // Commit before the response is released: in tower this is the
            // moment its headers become final, i.e. the first write.
            match commit(&config, &session).await {
                Ok(None) => Ok(response),
                Ok(Some(set_cookie)) => {
                    let mut response = response;
                    response.headers_mut().append(SET_COOKIE, set_cookie);
                    Ok(response)
                }
                Err(err) => {
                    // Once the save protocol has failed, nothing more of the
                    // handler's response is written.
                    drop(response);
                    Ok((config.error_handler)(&err))
                }
            }
        })
    }
}

/// Run the deferred save protocol; returns the `Set-Cookie` value to emit,
/// if any.
async fn commit<T>(
    config: &SessionConfig<T>,
    session: &Session<T>,
) -> std::result::Result<Option<HeaderValue>, SessionError> {
    let now = Utc::now();
    match session.commit_action(config.codec.as_ref(), now, config.idle_timeout)? {
        CommitAction::None => Ok(None),
        CommitAction::Delete { id, stale } => {
            for old in &stale {
                config.store.delete(old).await?;
            }
            config.store.delete(&id).await?;
            header_value(config.cookie.removal_cookie())
        }
        CommitAction::Save { record, stale } => {
            for old in &stale {
                config.store.delete(old).await?;
            }
            config.store.save(&record).await?;
            let max_age_secs = (record.idle_deadline - now).num_seconds();
            header_value(config.cookie.set_cookie(&record.id, max_age_secs))
        }
    }
}

fn header_value(cookie: String) -> std::result::Result<Option<HeaderValue>, SessionError> {
    HeaderValue::from_str(&cookie)
        .map(Some)
        .map_err(|err| SessionError::Store(format!("unencodable Set-Cookie header: {err}")))
}

/// Extract the session id when exactly one request cookie bears `name`.
///
/// Zero matches, an unreadable header, or several matches (a malformed
/// client mixing paths or domains) all yield `None`: the request proceeds
/// with a fresh session rather than trusting an arbitrary pick.
fn single_session_cookie(headers: &HeaderMap, name: &str) -> Option<SessionId> {
    let mut found = None;
    for header in headers.get_all(COOKIE) {
        let Ok(raw) = header.to_str() else { continue };
        for parsed in Cookie::split_parse(raw) {
            let Ok(c) = parsed else { continue };
            if c.name() == name {
                if found.is_some() {
                    return None;
                }
                found = Some(SessionId::from(c.value()));
            }
        }
    }
    found
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    // Saturate absurd configurations instead of panicking on deadline
    // arithmetic; a century outlives any session.
    chrono::Duration::from_std(duration)
        .unwrap_or_else(|_| chrono::Duration::days(100 * 365))
        .min(chrono::Duration::days(100 * 365))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(values: &[&str]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for value in values {
            map.append(COOKIE, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn no_cookie_header_yields_none() {
        assert!(single_session_cookie(&HeaderMap::new(), "id").is_none());
    }

    #[test]
    fn single_matching_cookie_is_extracted() {
        let map = headers(&["id=abc; theme=dark"]);
        assert_eq!(
            single_session_cookie(&map, "id"),
            Some(SessionId::from("abc"))
        );
    }

    #[test]
    fn other_cookie_names_are_ignored() {
        let map = headers(&["theme=dark; lang=en"]);
        assert!(single_session_cookie(&map, "id").is_none());
    }

    #[test]
    fn duplicate_names_in_one_header_are_treated_as_absent() {
        let map = headers(&["id=abc; id=def"]);
        assert!(single_session_cookie(&map, "id").is_none());
    }

    #[test]
    fn duplicate_names_across_headers_are_treated_as_absent() {
        let map = headers(&["id=abc", "id=def"]);
        assert!(single_session_cookie(&map, "id").is_none());
    }

    #[test]
    fn overlong_timeouts_saturate_instead_of_panicking() {
        let layer: SessionLayer<u64> =
            SessionLayer::new().with_idle_timeout(Duration::from_secs(u64::MAX));
        assert_eq!(layer.idle_timeout, chrono::Duration::days(100 * 365));
    }
}
