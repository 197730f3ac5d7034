use crate::options::{cookie_processor, CookieOptions};
use crate::Result;
use biscotti::RequestCookies;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Reads and writes named cookies for one request/response pair.
///
/// This is the host-facing interface used by [`Session`](crate::Session).
/// Implementations bind to the incoming request (for [`get`](CookieTransport::get))
/// and the outgoing response (for [`set`](CookieTransport::set)).
pub trait CookieTransport: Send {
    /// Read the value of the cookie `name` sent with the request, if there is one.
    fn get(&self, name: &str, options: &CookieOptions) -> Result<Option<String>>;

    /// Set the cookie `name` on the response, replacing any value set before.
    fn set(&mut self, name: &str, value: String, options: &CookieOptions) -> Result;
}

/// # In-memory cookie transport
///
/// Holds the cookies of a request and the cookies set on its response.
/// Clones share the same state, so a host can hand one clone to the session and
/// inspect the response cookies through another.
///
/// Every access is recorded as a [`CookieOperation`], which is mostly useful in tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryCookieJar {
    state: Arc<Mutex<JarState>>,
}

#[derive(Debug, Default)]
struct JarState {
    headers: Vec<String>,
    incoming: HashMap<String, String>,
    outgoing: BTreeMap<String, OutgoingCookie>,
    operations: Vec<CookieOperation>,
}

/// A cookie set on the response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingCookie {
    /// The cookie value.
    pub value: String,
    /// The attributes the cookie was set with.
    pub options: CookieOptions,
}

/// An access to a [`MemoryCookieJar`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CookieOperation {
    /// A request cookie was read.
    Get {
        /// The cookie name.
        name: String,
    },
    /// A response cookie was set.
    Set {
        /// The cookie name.
        name: String,
        /// The cookie value.
        value: String,
    },
}

impl MemoryCookieJar {
    /// Create a jar without request cookies.
    pub fn new() -> Self {
        Default::default()
    }

    /// Create a jar holding the request cookies of a `Cookie` header, e.g. `a=1; session=abc`.
    ///
    /// Fails if the header is not a valid list of cookie pairs.
    pub fn from_cookie_header(header: &str) -> Result<Self> {
        RequestCookies::new().extend_from_header(header, &cookie_processor())?;
        let jar = Self::new();
        jar.state().headers.push(header.to_owned());
        Ok(jar)
    }

    /// Add a request cookie. It takes precedence over cookies of the same name from a `Cookie` header.
    pub fn with_request_cookie(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.state().incoming.insert(name.into(), value.into());
        self
    }

    /// The cookie `name` set on the response, if any.
    pub fn response_cookie(&self, name: &str) -> Option<OutgoingCookie> {
        self.state().outgoing.get(name).cloned()
    }

    /// Render all response cookies as `Set-Cookie` header values, ordered by name.
    pub fn set_cookie_headers(&self) -> Vec<String> {
        self.state()
            .outgoing
            .iter()
            .filter_map(|(name, cookie)| {
                cookie.options.set_cookie_header(name, &cookie.value).ok()
            })
            .collect()
    }

    /// All accesses so far, oldest first.
    pub fn operations(&self) -> Vec<CookieOperation> {
        self.state().operations.clone()
    }

    fn state(&self) -> MutexGuard<'_, JarState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CookieTransport for MemoryCookieJar {
    fn get(&self, name: &str, _options: &CookieOptions) -> Result<Option<String>> {
        let mut state = self.state();
        state.operations.push(CookieOperation::Get {
            name: name.to_owned(),
        });
        if let Some(value) = state.incoming.get(name) {
            return Ok(Some(value.clone()));
        }

        let processor = cookie_processor();
        let mut cookies = RequestCookies::new();
        for header in &state.headers {
            cookies.extend_from_header(header, &processor)?;
        }
        let value = cookies
            .get(name)
            .map(|cookie| unquote(cookie.value()).to_owned());
        Ok(value)
    }

    fn set(&mut self, name: &str, value: String, options: &CookieOptions) -> Result {
        options.set_cookie_header(name, &value)?;
        let mut state = self.state();
        state.operations.push(CookieOperation::Set {
            name: name.to_owned(),
            value: value.clone(),
        });
        state.outgoing.insert(
            name.to_owned(),
            OutgoingCookie {
                value,
                options: options.clone(),
            },
        );
        Ok(())
    }
}

/// Strip the double quotes a cookie value may be wrapped in.
fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|value| value.strip_suffix('"'))
        .unwrap_or(value)
}
