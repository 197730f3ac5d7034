use crate::codec::{SignedTokenCodec, TokenCodec};
use crate::error::{ConfigError, SessionError};
use crate::flash::{FlashStore, SessionData, SESSION_ID_KEY};
use crate::options::{SessionConfig, SessionOptions};
use crate::transport::CookieTransport;
use crate::SessionId;
use serde_json::Value;
use std::mem;
use std::sync::Arc;

pub(crate) mod id_generator;

use id_generator::{RandomSessionIdGenerator, SessionIdGenerator};

/// The session of a single request.
///
/// A session owns the cookie transport of its request/response pair and the session data.
/// It is created empty, filled from the request cookie by [`load_cookie_data`](Session::load_cookie_data),
/// mutated by the request handler through [`data_mut`](Session::data_mut), and written back to the
/// response cookie by [`save_cookie_data`](Session::save_cookie_data).
/// Nothing is kept on the server once the session is dropped.
///
/// `Transport` is the cookie transport of the request.
/// `Codec` turns the data into a cookie value and back, see [`TokenCodec`].
/// `IdGenerator` creates session ids, see [`SessionIdGenerator`].
///
/// It is marked `#[must_use]`, as dropping it without saving discards all changes.
#[derive(Debug)]
#[must_use]
pub struct Session<
    Transport,
    Codec = SignedTokenCodec,
    IdGenerator = RandomSessionIdGenerator,
> {
    options: Arc<SessionOptions>,
    transport: Transport,
    codec: Arc<Codec>,
    id_generator: Arc<IdGenerator>,
    data: FlashStore,
    state: LifecycleState,
}

/// Where a [`Session`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// The session was created and holds empty data.
    Constructed,
    /// The request cookie was read. The data is what the cookie carried, or empty.
    Loaded,
    /// The data was written to the response cookie at least once.
    Saved,
}

impl<Transport: CookieTransport> Session<Transport> {
    /// Create a session with the default codec and id generator.
    ///
    /// Fails if the configuration does not resolve, in which case nothing is bound to `transport`.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use stateless_session::{MemoryCookieJar, Session, SessionConfig};
    /// let session = Session::new(SessionConfig::new("0123456789abcdef"), MemoryCookieJar::new()).unwrap();
    /// assert!(session.data().is_empty());
    /// assert!(Session::new(SessionConfig::new("too short"), MemoryCookieJar::new()).is_err());
    /// ```
    pub fn new(config: SessionConfig, transport: Transport) -> Result<Self, ConfigError> {
        let options = config.resolve()?;
        let codec = SignedTokenCodec::from_options(&options);
        Ok(Self::with_parts(
            Arc::new(options),
            transport,
            Arc::new(codec),
            Arc::new(RandomSessionIdGenerator),
        ))
    }
}

impl<Transport, Codec, IdGenerator> Session<Transport, Codec, IdGenerator>
where
    Transport: CookieTransport,
    Codec: TokenCodec,
    IdGenerator: SessionIdGenerator,
{
    /// Create a session from already resolved options and the given strategies.
    pub fn with_parts(
        options: Arc<SessionOptions>,
        transport: Transport,
        codec: Arc<Codec>,
        id_generator: Arc<IdGenerator>,
    ) -> Self {
        let data = FlashStore::new(SessionData::new(), options.flash());
        Self {
            options,
            transport,
            codec,
            id_generator,
            data,
            state: LifecycleState::Constructed,
        }
    }

    /// The resolved options of this session.
    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Where this session is in its lifecycle.
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Returns a reference to the data of this session.
    pub fn data(&self) -> &FlashStore {
        &self.data
    }

    /// Returns a mutable reference to the data of this session.
    /// Reads through [`FlashStore::get`] need it, as they may remove flash values.
    pub fn data_mut(&mut self) -> &mut FlashStore {
        &mut self.data
    }

    /// The id of this session.
    ///
    /// If the data holds no valid id, a new one is generated and stored,
    /// so repeated calls return the same id.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use stateless_session::{MemoryCookieJar, Session, SessionConfig, SESSION_ID_KEY};
    /// # fn main() -> stateless_session::Result {
    /// let config = SessionConfig::new("0123456789abcdef");
    /// let mut session = Session::new(config, MemoryCookieJar::new())?;
    /// assert!(!session.data().contains_key(SESSION_ID_KEY));
    /// let id = session.session_id();
    /// assert_eq!(session.session_id(), id);
    /// assert!(session.data().contains_key(SESSION_ID_KEY));
    /// # Ok(()) }
    /// ```
    pub fn session_id(&mut self) -> SessionId {
        if let Some(id) = self.stored_session_id() {
            return id;
        }
        let id = self.id_generator.generate();
        self.data
            .insert(SESSION_ID_KEY, Value::String(id.to_string()));
        id
    }

    fn stored_session_id(&self) -> Option<SessionId> {
        let value = self.data.raw().get(SESSION_ID_KEY)?;
        let id = value.as_str().and_then(|id| id.parse().ok());
        if id.is_none() {
            log::warn!("The stored session id is not a valid id, replacing it with a new one.");
        }
        id
    }

    /// Read the session cookie of the request and take over the data it carries.
    ///
    /// Without a cookie the data stays as it is.
    /// A cookie that fails verification counts as no cookie.
    /// Otherwise the data is replaced as a whole by the decoded data.
    /// Either way the data is afterwards wrapped according to the configured flash setting.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use stateless_session::{LifecycleState, MemoryCookieJar, Session, SessionConfig};
    /// # fn main() -> stateless_session::Result {
    /// # async_std::task::block_on(async {
    /// let jar = MemoryCookieJar::new().with_request_cookie("session", "forged.token");
    /// let mut session = Session::new(SessionConfig::new("0123456789abcdef"), jar)?;
    /// session.data_mut().set("kept", 1)?;
    /// session.load_cookie_data().await?;
    /// assert_eq!(session.state(), LifecycleState::Loaded);
    /// assert_eq!(session.data_mut().get_as::<u32>("kept")?, Some(1));
    /// # Ok::<(), stateless_session::Error>(()) }) }
    /// ```
    pub async fn load_cookie_data(&mut self) -> Result<(), SessionError> {
        if self.state != LifecycleState::Constructed {
            log::warn!("Loading the session cookie more than once for the same request.");
        }

        let cookie = self
            .transport
            .get(self.options.name(), self.options.cookie())
            .map_err(SessionError::CookieLoad)?;

        let decoded = match cookie {
            Some(token) => self
                .codec
                .decode(&token)
                .await
                .map_err(SessionError::CookieLoad)?,
            None => {
                log::trace!("No session cookie found.");
                SessionData::new()
            }
        };

        let data = if decoded.is_empty() {
            mem::take(&mut self.data).into_raw()
        } else {
            decoded
        };
        self.data = FlashStore::new(data, self.options.flash());
        self.state = LifecycleState::Loaded;
        Ok(())
    }

    /// Encode the current data and set it as the session cookie of the response.
    ///
    /// Any previously set session cookie is overwritten.
    /// Saving again later writes the data as it is at that point.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use stateless_session::{LifecycleState, MemoryCookieJar, Session, SessionConfig};
    /// # fn main() -> stateless_session::Result {
    /// # async_std::task::block_on(async {
    /// let jar = MemoryCookieJar::new();
    /// let config = SessionConfig::new("0123456789abcdef").with_name("sid");
    /// let mut session = Session::new(config, jar.clone())?;
    /// session.load_cookie_data().await?;
    /// session.save_cookie_data().await?;
    /// assert_eq!(session.state(), LifecycleState::Saved);
    /// assert!(jar.response_cookie("sid").is_some());
    /// # Ok::<(), stateless_session::Error>(()) }) }
    /// ```
    pub async fn save_cookie_data(&mut self) -> Result<(), SessionError> {
        let token = self
            .codec
            .encode(self.data.raw())
            .await
            .map_err(SessionError::CookieSave)?;
        self.transport
            .set(self.options.name(), token, self.options.cookie())
            .map_err(SessionError::CookieSave)?;
        log::trace!("Saved the session cookie.");
        self.state = LifecycleState::Saved;
        Ok(())
    }

    /// Clear all data of this session.
    ///
    /// Afterwards the data holds nothing but the session id.
    /// If `new_id` is true, the id is freshly generated, otherwise the current id is kept.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use stateless_session::{MemoryCookieJar, Session, SessionConfig};
    /// # fn main() -> stateless_session::Result {
    /// let config = SessionConfig::new("0123456789abcdef");
    /// let mut session = Session::new(config, MemoryCookieJar::new())?;
    /// let id = session.session_id();
    /// session.data_mut().set("user", "alice")?;
    ///
    /// session.regenerate(false);
    /// assert_eq!(session.session_id(), id);
    /// assert_eq!(session.data().len(), 1);
    ///
    /// session.regenerate(true);
    /// assert_ne!(session.session_id(), id);
    /// # Ok(()) }
    /// ```
    pub fn regenerate(&mut self, new_id: bool) {
        let id = if new_id {
            self.id_generator.generate()
        } else {
            self.session_id()
        };
        let mut data = SessionData::new();
        data.insert(SESSION_ID_KEY.to_owned(), Value::String(id.to_string()));
        self.data = FlashStore::new(data, self.options.flash());
        log::debug!("Regenerated session (new id: {new_id}).");
    }
}
