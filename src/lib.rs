//! Async HTTP sessions without server-side storage.
//!
//! This crate keeps the entire state of a session inside a single signed cookie.
//! Each request gets its own [`Session`], which is loaded from the request cookie,
//! handed to the request handler, and written back into the response cookie when the
//! response completes. Nothing is retained on the server between requests.
//!
//! # Anatomy of a session cookie
//!
//! The cookie value is a token produced by a [`TokenCodec`]. The default [`SignedTokenCodec`]
//! signs the JSON encoded session data with a key derived from the configured secret and
//! embeds an expiry. Tokens that are tampered with, expired or otherwise invalid are treated
//! as if there were no cookie at all, so a bad cookie never fails a request.
//!
//! The session id is stored in the data under the reserved key [`SESSION_ID_KEY`].
//! It is generated the first time it is requested.
//!
//! # Flash data
//!
//! If [`SessionConfig::flash`] is enabled, every value except the session id is removed from the
//! session when it is read through [`FlashStore::get`], so it is only seen once.
//!
//! # Host integration
//!
//! The crate is independent of any HTTP framework. A host implements [`HostRequest`]
//! and [`CookieTransport`], calls [`SessionMiddleware::handle`] before running the request
//! handler, and [`finalize_session`] right before the response is finalized.
//!
//! # Example
//!
//! ```
//! use stateless_session::{MemoryCookieJar, Session, SessionConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # async_std::task::block_on(async {
//! // The jar stands in for the cookies of a request and its response.
//! let jar = MemoryCookieJar::new();
//! let mut session = Session::new(SessionConfig::new("0123456789abcdef"), jar.clone())?;
//! session.load_cookie_data().await?;
//! session.data_mut().set("visits", 1)?;
//! session.save_cookie_data().await?;
//! let cookie = jar.response_cookie("session").unwrap();
//!
//! // The next request sends the cookie back.
//! let jar = MemoryCookieJar::new().with_request_cookie("session", cookie.value);
//! let mut session = Session::new(SessionConfig::new("0123456789abcdef"), jar)?;
//! session.load_cookie_data().await?;
//! assert_eq!(session.data_mut().get_as::<u32>("visits")?, Some(1));
//! #
//! # Ok::<(), Box<dyn std::error::Error>>(()) }) }
//! ```

#![forbid(unsafe_code)]
#![deny(
    future_incompatible,
    missing_debug_implementations,
    nonstandard_style,
    missing_docs,
    unreachable_pub,
    missing_copy_implementations,
    unused_qualifications
)]

pub use anyhow::Error;
/// An anyhow::Result with default return type of ()
pub type Result<T = ()> = std::result::Result<T, Error>;

mod codec;
mod error;
mod flash;
mod id;
mod middleware;
mod options;
mod session;
mod transport;

pub use biscotti::SameSite;
pub use codec::{SignedTokenCodec, TokenCodec, TokenPayload};
pub use error::{ConfigError, SessionError};
pub use flash::{FlashStore, SessionData, SESSION_ID_KEY};
pub use id::SessionId;
pub use middleware::{finalize_session, HostRequest, RequestSession, SessionMiddleware};
pub use options::{
    CookieOptions, SessionConfig, SessionOptions, DEFAULT_COOKIE_NAME,
    DEFAULT_COOKIE_PATH, DEFAULT_DURATION, MIN_SECRET_LENGTH,
};
pub use session::id_generator::{
    DebugSessionIdGenerator, RandomSessionIdGenerator, SessionIdGenerator,
};
pub use session::{LifecycleState, Session};
pub use transport::{CookieOperation, CookieTransport, MemoryCookieJar, OutgoingCookie};
