//! Cookie bridges between the auth client and the HTTP layer.
//!
//! * [`RequestCookies`] backs handlers: reads come from the request `Cookie`
//!   header, writes are buffered and flushed as `Set-Cookie` on the response.
//! * [`MiddlewareCookies`] backs the route guard. It keeps two jars, one for
//!   the request that is forwarded downstream and one for the response sent
//!   to the browser.
//! * [`BrowserCookies`] is the ambient store used by the browser-side client.

use atlas_auth::{CookieMethods, CookieOptions, CookieWriteError, SameSite};
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue};
use axum::response::Response;
use cookie::{Cookie, CookieJar};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Build a `cookie` crate cookie from the auth client's options.
pub(crate) fn build_cookie(name: &str, value: &str, options: &CookieOptions) -> Cookie<'static> {
    let mut builder = Cookie::build((name.to_string(), value.to_string()))
        .http_only(options.http_only)
        .secure(options.secure);
    if let Some(path) = &options.path {
        builder = builder.path(path.clone());
    }
    if let Some(domain) = &options.domain {
        builder = builder.domain(domain.clone());
    }
    if let Some(max_age) = options.max_age {
        builder = builder.max_age(cookie::time::Duration::seconds(max_age));
    }
    if let Some(same_site) = options.same_site {
        builder = builder.same_site(match same_site {
            SameSite::Lax => cookie::SameSite::Lax,
            SameSite::Strict => cookie::SameSite::Strict,
            SameSite::None => cookie::SameSite::None,
        });
    }
    builder.build()
}

/// Parse every `Cookie` header of a request into a jar of originals.
fn jar_from_headers(headers: &HeaderMap) -> CookieJar {
    let mut jar = CookieJar::new();
    for header in headers.get_all(COOKIE) {
        let Ok(header) = header.to_str() else {
            continue;
        };
        for cookie in Cookie::split_parse(header).flatten() {
            jar.add_original(cookie.into_owned());
        }
    }
    jar
}

fn jar_value(jar: &CookieJar, name: &str) -> Option<String> {
    jar.get(name).map(|cookie| cookie.value().to_string())
}

/// Append one `Set-Cookie` header per cookie.
pub fn append_set_cookies(response: &mut Response, cookies: &[HeaderValue]) {
    for value in cookies {
        response.headers_mut().append(SET_COOKIE, value.clone());
    }
}

fn set_cookie_headers<'a>(cookies: impl Iterator<Item = &'a Cookie<'static>>) -> Vec<HeaderValue> {
    cookies
        .filter_map(|cookie| match HeaderValue::from_str(&cookie.to_string()) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(cookie = cookie.name(), error = %err, "dropping unencodable cookie");
                None
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    ReadWrite,
    ReadOnly,
}

struct RequestJar {
    jar: CookieJar,
    committed: bool,
}

/// Per-request cookie store for handlers.
pub struct RequestCookies {
    state: Mutex<RequestJar>,
    access: Access,
}

impl RequestCookies {
    /// Writable store over the request's cookies.
    pub fn new(headers: &HeaderMap) -> Arc<Self> {
        Self::with_access(headers, Access::ReadWrite)
    }

    /// Store for page rendering, where the response is already being
    /// produced and cookies cannot be changed.
    pub fn read_only(headers: &HeaderMap) -> Arc<Self> {
        Self::with_access(headers, Access::ReadOnly)
    }

    fn with_access(headers: &HeaderMap, access: Access) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(RequestJar {
                jar: jar_from_headers(headers),
                committed: false,
            }),
            access,
        })
    }

    /// Stop accepting writes and return the pending `Set-Cookie` values.
    pub fn commit(&self) -> Vec<HeaderValue> {
        let mut state = self.state.lock();
        state.committed = true;
        set_cookie_headers(state.jar.delta())
    }

    /// Commit and attach the pending cookies to `response`.
    pub fn apply(&self, mut response: Response) -> Response {
        append_set_cookies(&mut response, &self.commit());
        response
    }
}

impl CookieMethods for RequestCookies {
    fn get(&self, name: &str) -> Option<String> {
        jar_value(&self.state.lock().jar, name)
    }

    fn set(&self, name: &str, value: &str, options: &CookieOptions) -> Result<(), CookieWriteError> {
        if self.access == Access::ReadOnly {
            return Err(CookieWriteError::ReadOnly);
        }
        let mut state = self.state.lock();
        if state.committed {
            return Err(CookieWriteError::HeadersCommitted);
        }
        state.jar.add(build_cookie(name, value, options));
        Ok(())
    }
}

struct MiddlewareJars {
    request: CookieJar,
    forwarded: Option<HeaderValue>,
    forwarded_dirty: bool,
    response: CookieJar,
}

/// Cookie store for the route guard.
///
/// Every write lands in the request jar first, then the forwarded `Cookie`
/// header is rebuilt from that jar, then the cookie is applied to the
/// response jar. Response cookies accumulate across writes.
pub struct MiddlewareCookies {
    jars: Mutex<MiddlewareJars>,
}

impl MiddlewareCookies {
    pub fn new(headers: &HeaderMap) -> Arc<Self> {
        Arc::new(Self {
            jars: Mutex::new(MiddlewareJars {
                request: jar_from_headers(headers),
                forwarded: None,
                forwarded_dirty: false,
                response: CookieJar::new(),
            }),
        })
    }

    /// `Cookie` header for the forwarded request, `None` when no write happened.
    pub fn forwarded_header(&self) -> Option<Option<HeaderValue>> {
        let jars = self.jars.lock();
        jars.forwarded_dirty.then(|| jars.forwarded.clone())
    }

    /// `Set-Cookie` values for the browser.
    pub fn response_cookies(&self) -> Vec<HeaderValue> {
        set_cookie_headers(self.jars.lock().response.delta())
    }

    /// Rewrite the request headers so downstream handlers see every write.
    pub fn forward_to(&self, headers: &mut HeaderMap) {
        match self.forwarded_header() {
            Some(Some(value)) => {
                headers.insert(COOKIE, value);
            }
            Some(None) => {
                headers.remove(COOKIE);
            }
            None => {}
        }
    }
}

impl CookieMethods for MiddlewareCookies {
    fn get(&self, name: &str) -> Option<String> {
        jar_value(&self.jars.lock().request, name)
    }

    fn set(&self, name: &str, value: &str, options: &CookieOptions) -> Result<(), CookieWriteError> {
        let cookie = build_cookie(name, value, options);
        let mut jars = self.jars.lock();

        // Request side first. Nothing is committed until the forwarded
        // header is known to be valid.
        let mut request = jars.request.clone();
        request.add(cookie.clone());

        let forwarded = request
            .iter()
            .filter(|c| !c.value().is_empty())
            .map(|c| c.stripped().to_string())
            .collect::<Vec<_>>()
            .join("; ");
        let forwarded = if forwarded.is_empty() {
            None
        } else {
            Some(
                HeaderValue::from_str(&forwarded)
                    .map_err(|err| CookieWriteError::Invalid(err.to_string()))?,
            )
        };

        jars.request = request;
        jars.forwarded = forwarded;
        jars.forwarded_dirty = true;
        jars.response.add(cookie);
        Ok(())
    }
}

static BROWSER_COOKIES: Lazy<Arc<BrowserCookies>> = Lazy::new(BrowserCookies::isolated);

/// Browser-like cookie store: writes replace values, an empty value or a
/// zero Max-Age deletes.
#[derive(Default)]
pub struct BrowserCookies {
    values: Mutex<BTreeMap<String, String>>,
}

impl BrowserCookies {
    /// The process-wide store used by [`crate::client::create_browser_client`].
    pub fn global() -> Arc<Self> {
        BROWSER_COOKIES.clone()
    }

    /// A fresh store not shared with anyone else.
    pub fn isolated() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// `name=value` pairs, as a script would see them.
    pub fn document_cookie(&self) -> String {
        self.values
            .lock()
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl CookieMethods for BrowserCookies {
    fn get(&self, name: &str) -> Option<String> {
        self.values.lock().get(name).cloned()
    }

    fn set(&self, name: &str, value: &str, options: &CookieOptions) -> Result<(), CookieWriteError> {
        let mut values = self.values.lock();
        if value.is_empty() || options.max_age == Some(0) {
            values.remove(name);
        } else {
            values.insert(name.to_string(), value.to_string());
        }
        Ok(())
    }
}
