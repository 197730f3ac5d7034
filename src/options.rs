use crate::error::ConfigError;
use biscotti::{Processor, ProcessorConfig, ResponseCookie, ResponseCookies, SameSite};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::time::Duration;

/// The minimum length of the session secret, in characters.
pub const MIN_SECRET_LENGTH: usize = 16;
/// How long a session token stays valid if no duration is configured: one day.
pub const DEFAULT_DURATION: Duration = Duration::from_millis(86_400_000);
/// The cookie name used if no name is configured.
pub const DEFAULT_COOKIE_NAME: &str = "session";
/// The cookie path used if the cookie options do not set one.
pub const DEFAULT_COOKIE_PATH: &str = "/";

/// The configuration of a session, as supplied by the caller.
///
/// Every field is optional. Missing fields are filled in by [`SessionConfig::resolve`],
/// which also validates the secret.
/// The type can be deserialized from any serde source, so it may be embedded in the
/// configuration file of an application.
///
/// # Example
///
/// ```rust
/// # use stateless_session::SessionConfig;
/// let options = SessionConfig::new("0123456789abcdef")
///     .with_flash(true)
///     .resolve()
///     .unwrap();
/// assert_eq!(options.name(), "session");
/// assert!(options.flash());
/// assert_eq!(options.cookie().path.as_deref(), Some("/"));
/// ```
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// The key used to sign session tokens. Must have at least [`MIN_SECRET_LENGTH`] characters.
    pub secret: Option<String>,
    /// The lifetime of a session token in milliseconds.
    pub duration: Option<u64>,
    /// If true, values are removed from the session after they are read once.
    pub flash: Option<bool>,
    /// The name of the session cookie.
    pub name: Option<String>,
    /// The attributes attached to the session cookie.
    pub cookie: Option<CookieOptions>,
}

/// A fully resolved and validated session configuration.
///
/// Built by [`SessionConfig::resolve`]. It cannot be modified afterwards.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionOptions {
    secret: String,
    duration: Duration,
    flash: bool,
    name: String,
    cookie: CookieOptions,
}

/// The attributes of the session cookie.
///
/// Only [`path`](CookieOptions::path) is defaulted during resolution, every other attribute
/// is passed to the [`CookieTransport`](crate::CookieTransport) exactly as given.
/// Resolution rejects attribute values that would break out of their `Set-Cookie` attribute,
/// see [`CookieOptions::validate`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CookieOptions {
    /// The `Path` attribute. Resolves to `/` if unset.
    pub path: Option<String>,
    /// The `Domain` attribute.
    pub domain: Option<String>,
    /// Set the `Secure` attribute.
    pub secure: bool,
    /// Set the `HttpOnly` attribute.
    pub http_only: bool,
    /// The `SameSite` attribute, written as `"Strict"`, `"Lax"` or `"None"` in configuration files.
    #[serde(with = "same_site")]
    pub same_site: Option<SameSite>,
    /// The `Max-Age` attribute, in seconds.
    pub max_age: Option<u64>,
    /// Further attributes understood by the cookie transport, rendered as `name=value`.
    pub extra: BTreeMap<String, String>,
}

impl SessionConfig {
    /// Create a configuration with the given secret and all other fields left to their defaults.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: Some(secret.into()),
            ..Default::default()
        }
    }

    /// Set the lifetime of session tokens.
    /// Sub-millisecond precision is dropped.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Enable or disable flash semantics.
    pub fn with_flash(mut self, flash: bool) -> Self {
        self.flash = Some(flash);
        self
    }

    /// Set the name of the session cookie.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the attributes of the session cookie.
    pub fn with_cookie(mut self, cookie: CookieOptions) -> Self {
        self.cookie = Some(cookie);
        self
    }

    /// Fill in defaults and validate the secret and the cookie attributes.
    ///
    /// Defaults are applied first, then the configuration is checked,
    /// so either a complete configuration is returned or none at all.
    pub fn resolve(self) -> Result<SessionOptions, ConfigError> {
        let mut cookie = self.cookie.unwrap_or_default();
        if cookie.path.is_none() {
            cookie.path = Some(DEFAULT_COOKIE_PATH.to_owned());
        }
        let duration = self
            .duration
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_DURATION);
        let flash = self.flash.unwrap_or(false);
        let name = self
            .name
            .unwrap_or_else(|| DEFAULT_COOKIE_NAME.to_owned());

        let secret = self.secret.unwrap_or_default();
        let length = secret.chars().count();
        if length < MIN_SECRET_LENGTH {
            return Err(ConfigError::InvalidSecret { length });
        }
        if !is_token(&name) {
            return Err(ConfigError::InvalidCookieName { name });
        }
        cookie.validate()?;

        Ok(SessionOptions {
            secret,
            duration,
            flash,
            name,
            cookie,
        })
    }
}

impl TryFrom<SessionConfig> for SessionOptions {
    type Error = ConfigError;

    fn try_from(config: SessionConfig) -> Result<Self, Self::Error> {
        config.resolve()
    }
}

impl SessionOptions {
    /// The key used to sign session tokens.
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// The lifetime of session tokens.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Whether values are removed from the session after they are read once.
    pub fn flash(&self) -> bool {
        self.flash
    }

    /// The name of the session cookie.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The attributes of the session cookie. The path is always set.
    pub fn cookie(&self) -> &CookieOptions {
        &self.cookie
    }
}

impl CookieOptions {
    /// Check that every attribute can be written into a `Set-Cookie` header as given.
    ///
    /// `path`, `domain` and `extra` values must not contain `;` or control characters,
    /// and `extra` names must be HTTP tokens.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let values = [("Path", self.path.as_deref()), ("Domain", self.domain.as_deref())];
        for (attribute, value) in values {
            if value.map_or(false, |value| !is_attribute_value(value)) {
                return Err(ConfigError::InvalidCookieAttribute {
                    attribute: attribute.to_owned(),
                });
            }
        }
        for (name, value) in &self.extra {
            if !is_token(name) || !is_attribute_value(value) {
                return Err(ConfigError::InvalidCookieAttribute {
                    attribute: name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Build a response cookie carrying these attributes.
    ///
    /// The [`extra`](CookieOptions::extra) attributes have no counterpart on [`ResponseCookie`]
    /// and are left out, [`set_cookie_header`](CookieOptions::set_cookie_header) appends them.
    pub fn response_cookie(
        &self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> ResponseCookie<'static> {
        let mut cookie = ResponseCookie::new(name.into(), value.into());
        if let Some(domain) = self.domain.as_deref() {
            cookie = cookie.set_domain(domain.to_owned());
        }
        if let Some(path) = self.path.as_deref() {
            cookie = cookie.set_path(path.to_owned());
        }
        if let Some(same_site) = self.same_site {
            cookie = cookie.set_same_site(same_site);
        }
        if self.secure {
            cookie = cookie.set_secure(true);
        }
        if self.http_only {
            cookie = cookie.set_http_only(true);
        }
        if let Some(max_age) = self.max_age {
            let max_age = i64::try_from(max_age).unwrap_or(i64::MAX);
            cookie = cookie.set_max_age(biscotti::time::SignedDuration::from_secs(max_age));
        }
        cookie
    }

    /// Render the cookie `name=value` with these attributes as a `Set-Cookie` header value.
    ///
    /// Fails if `name` is not a valid cookie name
    /// or the attributes do not pass [`validate`](CookieOptions::validate).
    ///
    /// ```rust
    /// # use stateless_session::CookieOptions;
    /// let options = CookieOptions {
    ///     path: Some("/".to_owned()),
    ///     http_only: true,
    ///     ..Default::default()
    /// };
    /// let header = options.set_cookie_header("session", "abc").unwrap();
    /// assert!(header.starts_with("session=abc"));
    /// assert!(header.contains("Path=/"));
    /// assert!(header.contains("HttpOnly"));
    /// ```
    pub fn set_cookie_header(&self, name: &str, value: &str) -> Result<String, ConfigError> {
        if !is_token(name) {
            return Err(ConfigError::InvalidCookieName {
                name: name.to_owned(),
            });
        }
        self.validate()?;
        let mut cookies = ResponseCookies::new();
        cookies.insert(self.response_cookie(name, value));
        let processor = cookie_processor();
        let mut header: String = cookies.header_values(&processor).collect();
        for (name, value) in &self.extra {
            header.push_str("; ");
            header.push_str(name);
            header.push('=');
            header.push_str(value);
        }
        Ok(header)
    }
}

/// The cookie processor used to parse `Cookie` and render `Set-Cookie` headers.
///
/// Tokens are signed by the codec, so the processor applies no cryptography of its own.
pub(crate) fn cookie_processor() -> Processor {
    ProcessorConfig::default().into()
}

fn is_attribute_value(value: &str) -> bool {
    !value.chars().any(|c| c == ';' || c.is_control())
}

fn is_token(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_graphic() && !"()<>@,;:\\\"/[]?={}".contains(c))
}

impl Debug for SessionConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("secret", &self.secret.as_ref().map(|_| "[redacted]"))
            .field("duration", &self.duration)
            .field("flash", &self.flash)
            .field("name", &self.name)
            .field("cookie", &self.cookie)
            .finish()
    }
}

impl Debug for SessionOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionOptions")
            .field("secret", &"[redacted]")
            .field("duration", &self.duration)
            .field("flash", &self.flash)
            .field("name", &self.name)
            .field("cookie", &self.cookie)
            .finish()
    }
}

// `SameSite` is written the way it appears in the header.
mod same_site {
    use biscotti::SameSite;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S>(value: &Option<SameSite>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(SameSite::Strict) => serializer.serialize_some("Strict"),
            Some(SameSite::Lax) => serializer.serialize_some("Lax"),
            Some(SameSite::None) => serializer.serialize_some("None"),
            None => serializer.serialize_none(),
        }
    }

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Option<SameSite>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let Some(value) = Option::<String>::deserialize(deserializer)? else {
            return Ok(None);
        };
        match value.as_str() {
            "Strict" | "strict" => Ok(Some(SameSite::Strict)),
            "Lax" | "lax" => Ok(Some(SameSite::Lax)),
            "None" | "none" => Ok(Some(SameSite::None)),
            _ => Err(de::Error::unknown_variant(&value, &["Strict", "Lax", "None"])),
        }
    }
}
