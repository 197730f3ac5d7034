use crate::flash::SessionData;
use crate::options::SessionOptions;
use crate::Result;
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt::{Debug, Formatter};
use std::time::Duration;

/// Context string for deriving the signing key from the configured secret.
const KEY_DERIVATION_CONTEXT: &str = "stateless-session 2024-01-01 token signing key";

/// Converts session data into a cookie value and back.
///
/// This is the backend-facing interface of the session cookie.
/// Implement it to replace the signing scheme, e.g. with an encrypting one,
/// without touching the session lifecycle.
#[async_trait]
pub trait TokenCodec: Debug + Send + Sync {
    /// Serialize `data` into a token.
    ///
    /// The token must decode back to equal data until it expires.
    /// An error aborts saving the session cookie.
    async fn encode(&self, data: &SessionData) -> Result<String>;

    /// Verify `token` and deserialize the data it carries.
    ///
    /// Tokens that are malformed, tampered with or expired must yield `Ok` with empty data,
    /// so that a bad cookie degrades to a fresh session.
    /// An error is reserved for failures of the codec itself, and fails the request.
    async fn decode(&self, token: &str) -> Result<SessionData>;
}

/// The schema of the payload carried by a [`SignedTokenCodec`] token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenPayload<'a> {
    /// The session data.
    pub session: Cow<'a, SessionData>,
    /// When the token was issued, in seconds since the unix epoch.
    pub iat: i64,
    /// When the token expires, in seconds since the unix epoch.
    pub exp: i64,
}

/// The default [`TokenCodec`].
///
/// A token consists of two base64url segments joined by a dot:
/// the JSON encoded [`TokenPayload`] and a keyed BLAKE3 hash of that first segment.
/// The key is derived from the configured secret.
/// Tokens expire after the configured duration, rounded to whole seconds.
///
/// The payload is signed, not encrypted: clients can read the session data.
#[derive(Clone, Copy)]
pub struct SignedTokenCodec {
    key: [u8; blake3::KEY_LEN],
    lifetime_seconds: i64,
}

#[derive(Debug, thiserror::Error)]
enum VerificationError {
    #[error("the token does not consist of a payload and a signature")]
    Malformed,
    #[error("a token segment is not valid base64")]
    Encoding(#[from] base64::DecodeError),
    #[error("the token signature does not match its payload")]
    BadSignature,
    #[error("the token payload is not valid JSON")]
    Payload(#[from] serde_json::Error),
    #[error("the token expired at {exp}")]
    Expired { exp: i64 },
}

impl SignedTokenCodec {
    /// Create a codec signing with a key derived from `secret`, issuing tokens that live for `duration`.
    pub fn new(secret: &str, duration: Duration) -> Self {
        let rounded_seconds = (duration.as_millis() + 500) / 1000;
        Self {
            key: blake3::derive_key(KEY_DERIVATION_CONTEXT, secret.as_bytes()),
            lifetime_seconds: i64::try_from(rounded_seconds).unwrap_or(i64::MAX),
        }
    }

    /// Create a codec from the secret and duration of resolved options.
    pub fn from_options(options: &SessionOptions) -> Self {
        Self::new(options.secret(), options.duration())
    }

    /// The lifetime of issued tokens, in seconds.
    pub fn lifetime_seconds(&self) -> i64 {
        self.lifetime_seconds
    }

    /// Encode `data` into a token issued at `now`.
    pub fn encode_at(&self, data: &SessionData, now: DateTime<Utc>) -> Result<String> {
        let iat = now.timestamp();
        let payload = TokenPayload {
            session: Cow::Borrowed(data),
            iat,
            exp: iat.saturating_add(self.lifetime_seconds),
        };
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&payload)?);
        let signature = blake3::keyed_hash(&self.key, payload.as_bytes());
        Ok(format!(
            "{payload}.{}",
            URL_SAFE_NO_PAD.encode(signature.as_bytes())
        ))
    }

    /// Decode `token` as of `now`.
    ///
    /// Returns empty data if the token does not verify.
    pub fn decode_at(&self, token: &str, now: DateTime<Utc>) -> SessionData {
        match self.verify(token, now) {
            Ok(data) => data,
            Err(error) => {
                log::debug!("Discarding session token: {error}");
                SessionData::new()
            }
        }
    }

    fn verify(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> std::result::Result<SessionData, VerificationError> {
        let (payload, signature) = token.split_once('.').ok_or(VerificationError::Malformed)?;

        let signature: [u8; blake3::OUT_LEN] = URL_SAFE_NO_PAD
            .decode(signature)?
            .try_into()
            .map_err(|_| VerificationError::BadSignature)?;
        // `blake3::Hash` compares in constant time.
        if blake3::keyed_hash(&self.key, payload.as_bytes()) != blake3::Hash::from(signature) {
            return Err(VerificationError::BadSignature);
        }

        let payload: TokenPayload = serde_json::from_slice(&URL_SAFE_NO_PAD.decode(payload)?)?;
        if now.timestamp() >= payload.exp {
            return Err(VerificationError::Expired { exp: payload.exp });
        }
        Ok(payload.session.into_owned())
    }
}

#[async_trait]
impl TokenCodec for SignedTokenCodec {
    async fn encode(&self, data: &SessionData) -> Result<String> {
        self.encode_at(data, Utc::now())
    }

    async fn decode(&self, token: &str) -> Result<SessionData> {
        Ok(self.decode_at(token, Utc::now()))
    }
}

impl Debug for SignedTokenCodec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignedTokenCodec")
            .field("key", &"[redacted]")
            .field("lifetime_seconds", &self.lifetime_seconds)
            .finish()
    }
}
