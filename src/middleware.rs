use crate::codec::{SignedTokenCodec, TokenCodec};
use crate::error::{ConfigError, SessionError};
use crate::flash::FlashStore;
use crate::options::{SessionConfig, SessionOptions};
use crate::session::id_generator::{RandomSessionIdGenerator, SessionIdGenerator};
use crate::transport::CookieTransport;
use crate::{Session, SessionId};
use std::future::Future;
use std::sync::Arc;

/// What the host HTTP framework has to provide for each request.
///
/// The host owns a conventional session field on its request type, which starts out as `None`,
/// and can hand out a cookie transport bound to the current request/response pair.
pub trait HostRequest {
    /// The cookie transport of the host.
    type Transport: CookieTransport;
    /// The token codec of the [`SessionMiddleware`] serving this request.
    type Codec: TokenCodec;
    /// The id generator of the [`SessionMiddleware`] serving this request.
    type IdGenerator: SessionIdGenerator;

    /// The session field of the request.
    fn session_field(
        &mut self,
    ) -> &mut Option<RequestSession<Self::Transport, Self::Codec, Self::IdGenerator>>;

    /// A cookie transport bound to the current request and its response.
    fn cookie_transport(&self) -> Self::Transport;
}

/// Attaches a session to each request.
///
/// The configuration is resolved once, when the middleware is built, and shared by all requests.
/// Per request, [`handle`](SessionMiddleware::handle) loads the session from the request cookie and
/// attaches it to the request. Before the response is sent, the host calls [`finalize_session`]
/// to write the session cookie.
#[derive(Debug)]
pub struct SessionMiddleware<Codec = SignedTokenCodec, IdGenerator = RandomSessionIdGenerator> {
    options: Arc<SessionOptions>,
    codec: Arc<Codec>,
    id_generator: Arc<IdGenerator>,
}

/// The session attached to a request by [`SessionMiddleware::handle`].
///
/// Besides the id and the data, it offers the operations handlers expect from a session:
/// [`destroy`](RequestSession::destroy) and [`regenerate`](RequestSession::regenerate) clear the data,
/// while [`reload`](RequestSession::reload), [`save`](RequestSession::save) and
/// [`touch`](RequestSession::touch) have nothing to do, since the whole session lives in its cookie,
/// and only call their completion callback.
#[derive(Debug)]
pub struct RequestSession<
    Transport,
    Codec = SignedTokenCodec,
    IdGenerator = RandomSessionIdGenerator,
> {
    session_id: SessionId,
    inner: Session<Transport, Codec, IdGenerator>,
}

impl SessionMiddleware {
    /// Resolve `config` and build a middleware with the default codec and id generator.
    ///
    /// Fails immediately if the configuration is invalid.
    pub fn new(config: SessionConfig) -> Result<Self, ConfigError> {
        let options = config.resolve()?;
        let codec = SignedTokenCodec::from_options(&options);
        Ok(Self {
            options: Arc::new(options),
            codec: Arc::new(codec),
            id_generator: Arc::new(RandomSessionIdGenerator),
        })
    }
}

impl<Codec, IdGenerator> SessionMiddleware<Codec, IdGenerator> {
    /// Replace the token codec, e.g. with one that encrypts the session data.
    pub fn with_codec<Other: TokenCodec>(
        self,
        codec: Other,
    ) -> SessionMiddleware<Other, IdGenerator> {
        SessionMiddleware {
            options: self.options,
            codec: Arc::new(codec),
            id_generator: self.id_generator,
        }
    }

    /// Replace the session id generator.
    pub fn with_id_generator<Other: SessionIdGenerator>(
        self,
        id_generator: Other,
    ) -> SessionMiddleware<Codec, Other> {
        SessionMiddleware {
            options: self.options,
            codec: self.codec,
            id_generator: Arc::new(id_generator),
        }
    }

    /// The resolved options shared by all sessions of this middleware.
    pub fn options(&self) -> &SessionOptions {
        &self.options
    }
}

impl<Codec: TokenCodec, IdGenerator: SessionIdGenerator> SessionMiddleware<Codec, IdGenerator> {
    /// Load the session of `request` and attach it to the request's session field.
    ///
    /// Fails with [`SessionError::DuplicateSession`] if the field is already set, and with
    /// [`SessionError::CookieLoad`] if the cookie cannot be read. In both cases the field is
    /// left untouched, so [`finalize_session`] will not write a cookie.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use stateless_session::{
    /// #     HostRequest, MemoryCookieJar, RandomSessionIdGenerator, RequestSession, SignedTokenCodec,
    /// # };
    /// #[derive(Default)]
    /// struct Request {
    ///     cookies: MemoryCookieJar,
    ///     session: Option<RequestSession<MemoryCookieJar>>,
    /// }
    ///
    /// impl HostRequest for Request {
    ///     type Transport = MemoryCookieJar;
    ///     type Codec = SignedTokenCodec;
    ///     type IdGenerator = RandomSessionIdGenerator;
    ///
    ///     fn session_field(&mut self) -> &mut Option<RequestSession<MemoryCookieJar>> {
    ///         &mut self.session
    ///     }
    ///
    ///     fn cookie_transport(&self) -> MemoryCookieJar {
    ///         self.cookies.clone()
    ///     }
    /// }
    /// # fn main() -> stateless_session::Result {
    /// # async_std::task::block_on(async {
    /// use stateless_session::{SessionConfig, SessionMiddleware};
    ///
    /// let middleware = SessionMiddleware::new(SessionConfig::new("0123456789abcdef"))?;
    /// let mut request = Request::default();
    /// middleware.handle(&mut request).await?;
    ///
    /// let session = request.session.as_mut().unwrap();
    /// session.session_mut().set("visits", 1)?;
    /// assert!(middleware.handle(&mut request).await.is_err());
    /// # Ok::<(), stateless_session::Error>(()) }) }
    /// ```
    pub async fn handle<Request>(&self, request: &mut Request) -> Result<(), SessionError>
    where
        Request: HostRequest<Codec = Codec, IdGenerator = IdGenerator>,
    {
        if request.session_field().is_some() {
            log::debug!("Refusing to attach a second session to the same request.");
            return Err(SessionError::DuplicateSession);
        }

        let mut session = Session::with_parts(
            Arc::clone(&self.options),
            request.cookie_transport(),
            Arc::clone(&self.codec),
            Arc::clone(&self.id_generator),
        );
        session.load_cookie_data().await?;

        *request.session_field() = Some(RequestSession::attach(session));
        Ok(())
    }
}

/// Write the session cookie of `request`, then run `finish` with `args`.
///
/// Hosts call this at the point where the response is finalized, passing their original
/// finalization as `finish`. The cookie thus always reflects the session data as it is when
/// the response completes.
/// If no session is attached, `finish` runs directly.
/// If saving fails, `finish` does not run and the error is returned instead.
///
/// # Example
///
/// ```rust
/// # use stateless_session::{
/// #     HostRequest, MemoryCookieJar, RandomSessionIdGenerator, RequestSession, SignedTokenCodec,
/// # };
/// # #[derive(Default)]
/// # struct Request {
/// #     cookies: MemoryCookieJar,
/// #     session: Option<RequestSession<MemoryCookieJar>>,
/// # }
/// #
/// # impl HostRequest for Request {
/// #     type Transport = MemoryCookieJar;
/// #     type Codec = SignedTokenCodec;
/// #     type IdGenerator = RandomSessionIdGenerator;
/// #
/// #     fn session_field(&mut self) -> &mut Option<RequestSession<MemoryCookieJar>> {
/// #         &mut self.session
/// #     }
/// #
/// #     fn cookie_transport(&self) -> MemoryCookieJar {
/// #         self.cookies.clone()
/// #     }
/// # }
/// # fn main() -> stateless_session::Result {
/// # async_std::task::block_on(async {
/// use stateless_session::{finalize_session, SessionConfig, SessionMiddleware};
///
/// let middleware = SessionMiddleware::new(SessionConfig::new("0123456789abcdef"))?;
/// let mut request = Request::default();
/// middleware.handle(&mut request).await?;
///
/// // The host's own finalization, e.g. writing the response with its status.
/// let status = finalize_session(&mut request, |status| async move { status }, 200).await?;
/// assert_eq!(status, 200);
/// assert!(request.cookies.response_cookie("session").is_some());
/// # Ok::<(), stateless_session::Error>(()) }) }
/// ```
pub async fn finalize_session<Request, Finish, Args, Fut>(
    request: &mut Request,
    finish: Finish,
    args: Args,
) -> Result<Fut::Output, SessionError>
where
    Request: HostRequest,
    Finish: FnOnce(Args) -> Fut,
    Fut: Future,
{
    if let Some(session) = request.session_field() {
        session.inner.save_cookie_data().await?;
    }
    Ok(finish(args).await)
}

impl<Transport, Codec, IdGenerator> RequestSession<Transport, Codec, IdGenerator>
where
    Transport: CookieTransport,
    Codec: TokenCodec,
    IdGenerator: SessionIdGenerator,
{
    fn attach(mut inner: Session<Transport, Codec, IdGenerator>) -> Self {
        let session_id = inner.session_id();
        Self { session_id, inner }
    }

    fn reattach(&mut self) {
        self.session_id = self.inner.session_id();
    }

    /// The id of the session, as of the last time it was attached.
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// The session data.
    pub fn session(&self) -> &FlashStore {
        self.inner.data()
    }

    /// The session data, for writing and for flash-aware reads.
    pub fn session_mut(&mut self) -> &mut FlashStore {
        self.inner.data_mut()
    }

    /// The underlying session.
    pub fn inner(&self) -> &Session<Transport, Codec, IdGenerator> {
        &self.inner
    }

    /// Clear the session data, keeping the session id.
    pub fn destroy(&mut self) {
        self.inner.regenerate(false);
        self.reattach();
    }

    /// Clear the session data and assign a new session id.
    pub fn regenerate(&mut self) {
        self.inner.regenerate(true);
        self.reattach();
    }

    /// Does nothing but call `done`, the session is always up to date.
    pub fn reload(&mut self, done: impl FnOnce()) {
        done();
    }

    /// Does nothing but call `done`, the session is saved by [`finalize_session`].
    pub fn save(&mut self, done: impl FnOnce()) {
        done();
    }

    /// Does nothing but call `done`, the cookie expiry is renewed whenever it is saved.
    pub fn touch(&mut self, done: impl FnOnce()) {
        done();
    }
}

impl<Codec, IdGenerator> Clone for SessionMiddleware<Codec, IdGenerator> {
    fn clone(&self) -> Self {
        Self {
            options: Arc::clone(&self.options),
            codec: Arc::clone(&self.codec),
            id_generator: Arc::clone(&self.id_generator),
        }
    }
}
