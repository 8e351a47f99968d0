//! Middleware configuration: cookie template and error handling.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use cookie::{Cookie, SameSite};
use sessionware_core::{Codec, SessionError, SessionId, SessionStore};
use tracing::error;

use crate::guard::ActiveSessions;

/// Decides the user-visible response when the middleware hits a store,
/// codec or concurrency error.
///
/// Invoked at most once per request. The default handler logs the error via
/// `tracing` and returns a generic 500; install your own with
/// [`SessionLayer::with_error_handler`](crate::SessionLayer::with_error_handler)
/// to special-case conflicts (see [`SessionError::is_conflict`]).
pub type ErrorHandler = Arc<dyn Fn(&SessionError) -> Response + Send + Sync>;

/// The default error handler: log and answer 500.
pub(crate) fn default_error_handler(err: &SessionError) -> Response {
    error!(error = %err, "session middleware error");
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
}

/// Template for the session cookie.
///
/// `Value` and `Max-Age` are filled in by the middleware; everything else is
/// fixed at construction.
#[derive(Debug, Clone)]
pub struct CookieOptions {
    /// Cookie name. Default `"id"`.
    pub name: String,

    /// Cookie path. Default `"/"`.
    pub path: String,

    /// Cookie domain. Default none (host-only).
    pub domain: Option<String>,

    /// Whether the cookie is hidden from client-side script. Default `true`.
    pub http_only: bool,

    /// Whether the cookie is restricted to HTTPS. Default `true`.
    pub secure: bool,

    /// `SameSite` policy. Default [`SameSite::Lax`].
    pub same_site: SameSite,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            name: "id".to_owned(),
            path: "/".to_owned(),
            domain: None,
            http_only: true,
            secure: true,
            same_site: SameSite::Lax,
        }
    }
}

impl CookieOptions {
    /// Create the default template.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cookie name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the cookie path.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Set the cookie domain.
    #[must_use]
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Set whether the cookie is hidden from client-side script.
    #[must_use]
    pub const fn with_http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    /// Set whether the cookie is restricted to HTTPS.
    #[must_use]
    pub const fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Set the `SameSite` policy.
    #[must_use]
    pub const fn with_same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = same_site;
        self
    }

    /// Render a `Set-Cookie` value carrying `id`, expiring in `max_age`
    /// seconds.
    pub(crate) fn set_cookie(&self, id: &SessionId, max_age_secs: i64) -> String {
        self.build(id.as_str().to_owned(), max_age_secs)
    }

    /// Render a `Set-Cookie` value that makes the client erase the cookie
    /// immediately (empty value, `Max-Age=0`).
    pub(crate) fn removal_cookie(&self) -> String {
        self.build(String::new(), 0)
    }

    fn build(&self, value: String, max_age_secs: i64) -> String {
        let mut builder = Cookie::build((self.name.clone(), value))
            .path(self.path.clone())
            .http_only(self.http_only)
            .secure(self.secure)
            .same_site(self.same_site)
            .max_age(cookie::time::Duration::seconds(max_age_secs));
        if let Some(domain) = &self.domain {
            builder = builder.domain(domain.clone());
        }
        builder.build().to_string()
    }
}

/// Frozen per-layer configuration shared by every service the layer builds.
pub(crate) struct SessionConfig<T> {
    pub idle_timeout: chrono::Duration,
    pub absolute_timeout: chrono::Duration,
    pub cookie: CookieOptions,
    pub store: Arc<dyn SessionStore>,
    pub codec: Arc<dyn Codec<T>>,
    pub error_handler: ErrorHandler,
    pub active: ActiveSessions,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_template() {
        let opts = CookieOptions::default();
        assert_eq!(opts.name, "id");
        assert_eq!(opts.path, "/");
        assert!(opts.domain.is_none());
        assert!(opts.http_only);
        assert!(opts.secure);
        assert_eq!(opts.same_site, SameSite::Lax);
    }

    #[test]
    fn set_cookie_carries_id_and_attributes() {
        let opts = CookieOptions::default();
        let rendered = opts.set_cookie(&SessionId::from("abc123"), 3600);
        assert!(rendered.starts_with("id=abc123"));
        assert!(rendered.contains("HttpOnly"));
        assert!(rendered.contains("Secure"));
        assert!(rendered.contains("SameSite=Lax"));
        assert!(rendered.contains("Path=/"));
        assert!(rendered.contains("Max-Age=3600"));
    }

    #[test]
    fn removal_cookie_erases_value_immediately() {
        let opts = CookieOptions::default();
        let rendered = opts.removal_cookie();
        assert!(rendered.starts_with("id=;"));
        assert!(rendered.contains("Max-Age=0"));
    }

    #[test]
    fn domain_is_rendered_when_configured() {
        let opts = CookieOptions::default().with_domain("example.com");
        let rendered = opts.set_cookie(&SessionId::from("x"), 60);
        assert!(rendered.contains("Domain=example.com"));
    }

    #[test]
    fn default_error_handler_answers_500() {
        let response = default_error_handler(&SessionError::Store("down".into()));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
