use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::Utc;
use serde_json::json;
use stateless_session::{
    finalize_session, ConfigError, CookieOperation, CookieOptions, CookieTransport,
    DebugSessionIdGenerator, HostRequest, MemoryCookieJar, RequestSession, SessionConfig,
    SessionData, SessionError, SessionIdGenerator, SessionMiddleware, SignedTokenCodec,
    TokenCodec, DEFAULT_DURATION, SESSION_ID_KEY,
};

const SECRET: &str = "0123456789abcdef";

type TestSession<Transport = MemoryCookieJar> =
    RequestSession<Transport, SignedTokenCodec, DebugSessionIdGenerator>;

/// A request of a minimal host framework.
#[derive(Debug, Default)]
struct TestRequest {
    cookies: MemoryCookieJar,
    session: Option<TestSession>,
}

impl TestRequest {
    fn with_cookie(value: impl Into<String>) -> Self {
        Self {
            cookies: MemoryCookieJar::new().with_request_cookie("session", value),
            session: None,
        }
    }

    fn session(&mut self) -> &mut TestSession {
        self.session.as_mut().expect("session is attached")
    }

    /// The data carried by the session cookie of the response.
    fn response_session(&self) -> Option<SessionData> {
        let cookie = self.cookies.response_cookie("session")?;
        Some(decode(&cookie.value))
    }
}

impl HostRequest for TestRequest {
    type Transport = MemoryCookieJar;
    type Codec = SignedTokenCodec;
    type IdGenerator = DebugSessionIdGenerator;

    fn session_field(&mut self) -> &mut Option<TestSession> {
        &mut self.session
    }

    fn cookie_transport(&self) -> MemoryCookieJar {
        self.cookies.clone()
    }
}

/// A cookie transport whose connection is gone.
#[derive(Debug, Clone)]
struct BrokenJar;

impl CookieTransport for BrokenJar {
    fn get(
        &self,
        _name: &str,
        _options: &CookieOptions,
    ) -> stateless_session::Result<Option<String>> {
        Err(anyhow::anyhow!("connection reset by peer"))
    }

    fn set(
        &mut self,
        _name: &str,
        _value: String,
        _options: &CookieOptions,
    ) -> stateless_session::Result {
        Err(anyhow::anyhow!("connection reset by peer"))
    }
}

#[derive(Debug, Default)]
struct BrokenRequest {
    session: Option<TestSession<BrokenJar>>,
}

impl HostRequest for BrokenRequest {
    type Transport = BrokenJar;
    type Codec = SignedTokenCodec;
    type IdGenerator = DebugSessionIdGenerator;

    fn session_field(&mut self) -> &mut Option<TestSession<BrokenJar>> {
        &mut self.session
    }

    fn cookie_transport(&self) -> BrokenJar {
        BrokenJar
    }
}

/// A codec that stores the session data readable and unsigned.
#[derive(Debug)]
struct PlainCodec;

#[async_trait::async_trait]
impl TokenCodec for PlainCodec {
    async fn encode(&self, data: &SessionData) -> stateless_session::Result<String> {
        Ok(format!("plain.{}", URL_SAFE_NO_PAD.encode(serde_json::to_vec(data)?)))
    }

    async fn decode(&self, token: &str) -> stateless_session::Result<SessionData> {
        let Some(payload) = token.strip_prefix("plain.") else {
            return Ok(SessionData::new());
        };
        Ok(serde_json::from_slice(&URL_SAFE_NO_PAD.decode(payload)?)?)
    }
}

#[derive(Debug, Default)]
struct PlainRequest {
    cookies: MemoryCookieJar,
    session: Option<RequestSession<MemoryCookieJar, PlainCodec, DebugSessionIdGenerator>>,
}

impl HostRequest for PlainRequest {
    type Transport = MemoryCookieJar;
    type Codec = PlainCodec;
    type IdGenerator = DebugSessionIdGenerator;

    fn session_field(
        &mut self,
    ) -> &mut Option<RequestSession<MemoryCookieJar, PlainCodec, DebugSessionIdGenerator>> {
        &mut self.session
    }

    fn cookie_transport(&self) -> MemoryCookieJar {
        self.cookies.clone()
    }
}

fn middleware(
    config: SessionConfig,
) -> SessionMiddleware<SignedTokenCodec, DebugSessionIdGenerator> {
    SessionMiddleware::new(config)
        .unwrap()
        .with_id_generator(DebugSessionIdGenerator::default())
}

fn decode(token: &str) -> SessionData {
    SignedTokenCodec::new(SECRET, DEFAULT_DURATION).decode_at(token, Utc::now())
}

fn token(data: serde_json::Value) -> String {
    let data: SessionData = serde_json::from_value(data).unwrap();
    SignedTokenCodec::new(SECRET, DEFAULT_DURATION)
        .encode_at(&data, Utc::now())
        .unwrap()
}

async fn respond(request: &mut TestRequest) -> Result<u16, SessionError> {
    finalize_session(request, |status| async move { status }, 200).await
}

/// The middleware refuses to be built with an invalid secret.
#[test]
fn test_setup_rejects_short_secret() {
    assert_eq!(
        SessionMiddleware::new(SessionConfig::new("0123456789abcde")).unwrap_err(),
        ConfigError::InvalidSecret { length: 15 }
    );
    assert!(SessionMiddleware::new(SessionConfig::default()).is_err());
}

/// A request without a cookie gets an empty session with a fresh id, and the response carries it.
#[async_std::test]
async fn test_fresh_session_round_trip() {
    let expected_id = DebugSessionIdGenerator::default().generate();
    let middleware = middleware(SessionConfig::new(SECRET));
    let mut request = TestRequest::default();

    middleware.handle(&mut request).await.unwrap();
    let session = request.session();
    assert_eq!(session.session_id(), expected_id);
    assert_eq!(session.session().keys().collect::<Vec<_>>(), vec![SESSION_ID_KEY]);

    session.session_mut().insert("date", json!("2024-03-01"));
    assert_eq!(respond(&mut request).await.unwrap(), 200);

    let mut expected = SessionData::new();
    expected.insert("date".to_owned(), json!("2024-03-01"));
    expected.insert(SESSION_ID_KEY.to_owned(), json!(expected_id.to_string()));
    assert_eq!(request.response_session(), Some(expected));
    assert_eq!(
        request.cookies.operations(),
        vec![
            CookieOperation::Get {
                name: "session".to_owned()
            },
            CookieOperation::Set {
                name: "session".to_owned(),
                value: request.cookies.response_cookie("session").unwrap().value,
            }
        ]
    );
}

/// The cookie of one response restores the session on the next request.
#[async_std::test]
async fn test_session_survives_across_requests() {
    let middleware = middleware(SessionConfig::new(SECRET));
    let mut first = TestRequest::default();
    middleware.handle(&mut first).await.unwrap();
    let id = first.session().session_id();
    first.session().session_mut().set("cart", vec![1, 2]).unwrap();
    respond(&mut first).await.unwrap();

    let cookie = first.cookies.response_cookie("session").unwrap();
    let mut second = TestRequest::with_cookie(cookie.value);
    middleware.handle(&mut second).await.unwrap();
    assert_eq!(second.session().session_id(), id);
    assert_eq!(
        second.session().session_mut().get_as::<Vec<u32>>("cart").unwrap(),
        Some(vec![1, 2])
    );
}

/// A forged cookie is ignored and the request continues with a brand-new session.
#[async_std::test]
async fn test_invalid_cookie_starts_new_session() {
    let data: SessionData = serde_json::from_value(json!({
        "id": "00000000-0000-0000-0000-0000000000ff",
        "admin": true
    }))
    .unwrap();
    let forged = SignedTokenCodec::new("another secret of ours", DEFAULT_DURATION)
        .encode_at(&data, Utc::now())
        .unwrap();
    let middleware = middleware(SessionConfig::new(SECRET));
    let mut request = TestRequest::with_cookie(forged);

    middleware.handle(&mut request).await.unwrap();
    let session = request.session();
    assert!(!session.session().contains_key("admin"));
    assert_eq!(
        session.session_id(),
        DebugSessionIdGenerator::default().generate()
    );
}

/// Attaching a second session to the same request fails and leaves the first one alone.
#[async_std::test]
async fn test_duplicate_session_is_refused() {
    let middleware = middleware(SessionConfig::new(SECRET));
    let mut request = TestRequest::default();
    middleware.handle(&mut request).await.unwrap();
    request.session().session_mut().insert("kept", json!(true));

    assert!(matches!(
        middleware.handle(&mut request).await,
        Err(SessionError::DuplicateSession)
    ));
    assert_eq!(request.session().session_mut().get("kept"), Some(json!(true)));
    assert_eq!(request.cookies.operations().len(), 1);
}

/// If the cookie cannot be read, no session is attached and nothing is written on completion.
#[async_std::test]
async fn test_load_failure_attaches_nothing() {
    let middleware = middleware(SessionConfig::new(SECRET));
    let mut request = BrokenRequest::default();

    assert!(matches!(
        middleware.handle(&mut request).await,
        Err(SessionError::CookieLoad(_))
    ));
    assert!(request.session.is_none());

    let finished = finalize_session(&mut request, |status| async move { status }, 500)
        .await
        .unwrap();
    assert_eq!(finished, 500);
}

/// `destroy` clears the data but keeps the id, `regenerate` also replaces the id.
#[async_std::test]
async fn test_destroy_and_regenerate() {
    let middleware = middleware(SessionConfig::new(SECRET));
    let mut request = TestRequest::default();
    middleware.handle(&mut request).await.unwrap();
    let session = request.session();
    let id = session.session_id();

    session.session_mut().insert("user", json!("alice"));
    session.destroy();
    assert_eq!(session.session_id(), id);
    assert_eq!(session.session().len(), 1);

    session.session_mut().insert("user", json!("bob"));
    session.regenerate();
    assert_ne!(session.session_id(), id);
    assert_eq!(session.session().keys().collect::<Vec<_>>(), vec![SESSION_ID_KEY]);

    let new_id = session.session_id();
    respond(&mut request).await.unwrap();
    let saved = request.response_session().unwrap();
    assert_eq!(saved.get(SESSION_ID_KEY), Some(&json!(new_id.to_string())));
    assert!(!saved.contains_key("user"));
}

/// `reload`, `save` and `touch` only call their completion callback.
#[async_std::test]
async fn test_callback_operations() {
    let middleware = middleware(SessionConfig::new(SECRET));
    let mut request = TestRequest::default();
    middleware.handle(&mut request).await.unwrap();
    let session = request.session();
    session.session_mut().insert("n", json!(1));

    let mut calls = 0;
    session.reload(|| calls += 1);
    session.save(|| calls += 1);
    session.touch(|| calls += 1);
    assert_eq!(calls, 3);
    assert_eq!(session.session_mut().get("n"), Some(json!(1)));
    assert!(request.cookies.response_cookie("session").is_none());
}

/// The original finalization receives its arguments unchanged, after the cookie was written.
#[async_std::test]
async fn test_finalize_passes_arguments_through() {
    let middleware = middleware(SessionConfig::new(SECRET));
    let mut request = TestRequest::default();
    middleware.handle(&mut request).await.unwrap();
    let cookies = request.cookies.clone();

    let output = finalize_session(
        &mut request,
        |(status, body)| {
            let written = cookies.response_cookie("session").is_some();
            async move { (status, body, written) }
        },
        (201, "created"),
    )
    .await
    .unwrap();
    assert_eq!(output, (201, "created", true));
}

/// With flash enabled, values read by the handler do not make it into the response cookie.
#[async_std::test]
async fn test_flash_values_are_read_once() {
    let middleware = middleware(SessionConfig::new(SECRET).with_flash(true));
    let cookie = token(json!({
        "id": "00000000-0000-0000-0000-00000000000a",
        "notice": "profile saved",
        "unread": "still here"
    }));
    let mut request = TestRequest::with_cookie(cookie);
    middleware.handle(&mut request).await.unwrap();

    let session = request.session();
    assert_eq!(session.session_mut().get("notice"), Some(json!("profile saved")));
    assert_eq!(session.session_mut().get("notice"), None);
    assert!(session.session_mut().get(SESSION_ID_KEY).is_some());
    assert!(session.session_mut().get(SESSION_ID_KEY).is_some());

    respond(&mut request).await.unwrap();
    let saved = request.response_session().unwrap();
    assert!(!saved.contains_key("notice"));
    assert_eq!(saved.get("unread"), Some(&json!("still here")));
    assert_eq!(
        saved.get(SESSION_ID_KEY),
        Some(&json!("00000000-0000-0000-0000-00000000000a"))
    );
}

/// The response cookie uses the configured name and attributes.
#[async_std::test]
async fn test_cookie_name_and_attributes() {
    let cookie_options = CookieOptions {
        http_only: true,
        max_age: Some(86_400),
        ..Default::default()
    };
    let middleware = middleware(
        SessionConfig::new(SECRET)
            .with_name("sid")
            .with_cookie(cookie_options),
    );
    let mut request = TestRequest::default();
    middleware.handle(&mut request).await.unwrap();
    respond(&mut request).await.unwrap();

    assert!(request.cookies.response_cookie("session").is_none());
    let headers = request.cookies.set_cookie_headers();
    assert_eq!(headers.len(), 1);
    assert!(headers[0].starts_with("sid="));
    let mut attributes: Vec<&str> = headers[0].split("; ").skip(1).collect();
    attributes.sort_unstable();
    assert_eq!(attributes, vec!["HttpOnly", "Max-Age=86400", "Path=/"]);
}

/// Cookie attributes that would smuggle extra attributes into the header are refused at setup.
#[test]
fn test_setup_rejects_injected_cookie_attributes() {
    let cookie_options = CookieOptions {
        path: Some("/; Domain=evil.example".to_owned()),
        ..Default::default()
    };
    assert_eq!(
        SessionMiddleware::new(SessionConfig::new(SECRET).with_cookie(cookie_options)).unwrap_err(),
        ConfigError::InvalidCookieAttribute {
            attribute: "Path".to_owned()
        }
    );

    let mut cookie_options = CookieOptions::default();
    cookie_options
        .extra
        .insert("Priority".to_owned(), "High; Secure=no".to_owned());
    assert_eq!(
        SessionMiddleware::new(SessionConfig::new(SECRET).with_cookie(cookie_options)).unwrap_err(),
        ConfigError::InvalidCookieAttribute {
            attribute: "Priority".to_owned()
        }
    );
}

/// A session cookie sent as a quoted string in the `Cookie` header still restores the session.
#[async_std::test]
async fn test_quoted_cookie_restores_session() {
    let cookie = token(json!({
        "id": "00000000-0000-0000-0000-00000000000c",
        "cart": [3]
    }));
    let header = format!("theme=dark; session=\"{cookie}\"");
    let mut request = TestRequest {
        cookies: MemoryCookieJar::from_cookie_header(&header).unwrap(),
        session: None,
    };
    middleware(SessionConfig::new(SECRET))
        .handle(&mut request)
        .await
        .unwrap();

    let session = request.session();
    assert_eq!(
        session.session_id().to_string(),
        "00000000-0000-0000-0000-00000000000c"
    );
    assert_eq!(
        session.session_mut().get_as::<Vec<u32>>("cart").unwrap(),
        Some(vec![3])
    );
}

/// A codec installed on the middleware reads the request cookie and writes the response cookie.
#[async_std::test]
async fn test_custom_codec_carries_the_session() {
    let middleware = SessionMiddleware::new(SessionConfig::new(SECRET))
        .unwrap()
        .with_codec(PlainCodec)
        .with_id_generator(DebugSessionIdGenerator::default());
    let data: SessionData = serde_json::from_value(json!({
        "id": "00000000-0000-0000-0000-00000000000b",
        "visits": 1
    }))
    .unwrap();
    let cookie = PlainCodec.encode(&data).await.unwrap();
    let mut request = PlainRequest {
        cookies: MemoryCookieJar::new().with_request_cookie("session", cookie),
        session: None,
    };

    middleware.handle(&mut request).await.unwrap();
    let session = request.session.as_mut().unwrap();
    assert_eq!(
        session.session_id().to_string(),
        "00000000-0000-0000-0000-00000000000b"
    );
    let visits = session.session_mut().get_as::<u32>("visits").unwrap();
    assert_eq!(visits, Some(1));
    session.session_mut().set("visits", 2).unwrap();

    finalize_session(&mut request, |status| async move { status }, 200)
        .await
        .unwrap();
    let response = request.cookies.response_cookie("session").unwrap();
    assert!(response.value.starts_with("plain."));
    let saved = PlainCodec.decode(&response.value).await.unwrap();
    assert_eq!(saved.get("visits"), Some(&json!(2)));
    assert_eq!(
        saved.get(SESSION_ID_KEY),
        Some(&json!("00000000-0000-0000-0000-00000000000b"))
    );
}
