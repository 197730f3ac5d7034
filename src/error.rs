/// The configuration passed to a session could not be resolved.
///
/// Returned synchronously while constructing a [`Session`](crate::Session) or a
/// [`SessionMiddleware`](crate::SessionMiddleware). Nothing is built when this error is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// The secret is missing or shorter than [`MIN_SECRET_LENGTH`](crate::MIN_SECRET_LENGTH) characters.
    #[error("the session secret must be at least 16 characters long, but it has {length}")]
    InvalidSecret {
        /// The length of the supplied secret, in characters. Zero if no secret was supplied.
        length: usize,
    },

    /// A cookie attribute value contains `;` or a control character, or an extra attribute
    /// name is not a valid token. Written as is, it would add attributes to the `Set-Cookie` header.
    #[error("the session cookie attribute `{attribute}` cannot be written into a Set-Cookie header")]
    InvalidCookieAttribute {
        /// The name of the offending attribute.
        attribute: String,
    },

    /// The cookie name is not a valid HTTP token.
    #[error("`{name}` is not a valid cookie name")]
    InvalidCookieName {
        /// The configured name.
        name: String,
    },
}

/// All per-request errors that can occur in this crate.
///
/// These are never panicked across the request boundary.
/// The host framework receives them as the `Err` side of
/// [`SessionMiddleware::handle`](crate::SessionMiddleware::handle) and
/// [`finalize_session`](crate::finalize_session).
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A session is already attached to the request.
    /// This happens when the middleware is registered twice for the same route.
    #[error("a session is already attached to this request, the session middleware was declared more than once")]
    DuplicateSession,

    /// Reading the inbound session cookie failed.
    ///
    /// Invalid or expired tokens do *not* produce this error, they yield an empty session instead.
    #[error("failed to load the session cookie")]
    CookieLoad(#[source] anyhow::Error),

    /// Encoding or writing the outbound session cookie failed.
    #[error("failed to save the session cookie")]
    CookieSave(#[source] anyhow::Error),
}
