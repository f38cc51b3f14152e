//! Cookie adapter contract between the auth client and its host.
//!
//! The auth client never touches HTTP headers itself. Whoever constructs it
//! hands over a [`CookieMethods`] implementation that knows where cookies are
//! read from and where writes should land (a browser jar, a request/response
//! pair, ...).

use thiserror::Error;

/// Lifetime given to session cookies when the caller does not override it (400 days).
pub const DEFAULT_MAX_AGE_SECS: i64 = 400 * 24 * 60 * 60;

/// SameSite attribute of a cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Lax,
    Strict,
    None,
}

impl SameSite {
    pub fn as_str(&self) -> &'static str {
        match self {
            SameSite::Lax => "Lax",
            SameSite::Strict => "Strict",
            SameSite::None => "None",
        }
    }
}

/// Attributes attached to every cookie the auth client writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieOptions {
    pub path: Option<String>,
    pub domain: Option<String>,
    /// Max-Age in seconds. `Some(0)` expires the cookie immediately.
    pub max_age: Option<i64>,
    pub http_only: bool,
    pub secure: bool,
    pub same_site: Option<SameSite>,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            path: Some("/".to_string()),
            domain: None,
            max_age: Some(DEFAULT_MAX_AGE_SECS),
            http_only: false,
            secure: false,
            same_site: Some(SameSite::Lax),
        }
    }
}

impl CookieOptions {
    /// Same attributes with a zero Max-Age, used when removing a cookie.
    pub fn expired(&self) -> Self {
        Self {
            max_age: Some(0),
            ..self.clone()
        }
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn with_http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    pub fn with_domain(mut self, domain: &str) -> Self {
        self.domain = Some(domain.to_string());
        self
    }
}

/// Why a cookie write could not be applied.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CookieWriteError {
    #[error("cookie store is read-only in this context")]
    ReadOnly,

    #[error("response headers were already sent")]
    HeadersCommitted,

    #[error("invalid cookie: {0}")]
    Invalid(String),
}

/// Read/write access to the cookies of the current execution context.
///
/// Writes are best-effort: the auth client logs and ignores a failed
/// `set`/`remove` instead of failing the surrounding operation.
pub trait CookieMethods: Send + Sync {
    fn get(&self, name: &str) -> Option<String>;

    fn set(&self, name: &str, value: &str, options: &CookieOptions)
        -> Result<(), CookieWriteError>;

    fn remove(&self, name: &str, options: &CookieOptions) -> Result<(), CookieWriteError> {
        self.set(name, "", options)
    }
}
