//! Plumbing shared by the page and action handlers

use atlas_auth::User;
use axum::http::HeaderMap;
use axum::response::{Html, IntoResponse, Redirect, Response};
use std::sync::Arc;

use crate::cookies::RequestCookies;
use crate::html::Chrome;
use crate::notify::{FlashNotifier, Notification};
use crate::provider::Backend;
use crate::state::AppState;
use crate::theme::{CookieStore, Theme, ThemeSettings};

/// Client hint carrying the browser's colour scheme.
const PREFERS_COLOR_SCHEME: &str = "sec-ch-prefers-color-scheme";

/// `next` targets must stay on this site.
pub(crate) fn safe_next(next: Option<&str>) -> Option<&str> {
    next.filter(|n| n.starts_with('/') && !n.starts_with("//") && !n.contains('\\'))
}

/// `/login?error=<message>`, keeping `next` when there is one.
pub(crate) fn login_error(message: &str, next: Option<&str>) -> String {
    let mut query = url::form_urlencoded::Serializer::new(String::new());
    query.append_pair("error", message);
    if let Some(next) = safe_next(next) {
        query.append_pair("next", next);
    }
    format!("/login?{}", query.finish())
}

fn prefers_dark(headers: &HeaderMap) -> bool {
    headers
        .get(PREFERS_COLOR_SCHEME)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim_matches('"').eq_ignore_ascii_case("dark"))
}

/// A page render.
///
/// The provider only gets a read-only view of the cookies: a session
/// refreshed while rendering is not written back. Flash messages and the
/// theme use a separate writable store so toasts are cleared once shown.
pub(crate) struct Page {
    cookies: Arc<RequestCookies>,
    pub backend: Box<dyn Backend>,
    theme: Theme,
    resolved: Theme,
    pub toasts: Vec<Notification>,
    path: String,
}

impl Page {
    pub fn new(state: &AppState, headers: &HeaderMap, path: &str) -> Self {
        let cookies = RequestCookies::new(headers);
        let backend = state.factory.create(RequestCookies::read_only(headers));
        let toasts = FlashNotifier::new(cookies.clone()).take();
        let settings = ThemeSettings::new(CookieStore::new(cookies.clone()));

        Self {
            theme: settings.theme(),
            resolved: settings.resolve(prefers_dark(headers)),
            cookies,
            backend,
            toasts,
            path: path.to_string(),
        }
    }

    /// Signed-in user; provider failures render as signed out.
    pub async fn user(&self) -> Option<User> {
        match self.backend.get_user().await {
            Ok(user) => user,
            Err(err) => {
                tracing::warn!(path = %self.path, error = %err, "user lookup failed");
                None
            }
        }
    }

    pub fn chrome<'a>(&'a self, user: Option<&'a User>) -> Chrome<'a> {
        Chrome {
            theme: self.theme,
            resolved: self.resolved,
            notifications: &self.toasts,
            user,
            path: &self.path,
        }
    }

    pub fn render(&self, html: Html<String>) -> Response {
        self.cookies.apply(html.into_response())
    }

    pub fn redirect(&self, location: &str) -> Response {
        self.cookies.apply(Redirect::temporary(location).into_response())
    }
}

/// A form submission. Everything it writes (session, flash) goes out with
/// the redirect that follows.
pub(crate) struct Action {
    cookies: Arc<RequestCookies>,
    pub backend: Box<dyn Backend>,
    pub notifier: FlashNotifier,
}

impl Action {
    pub fn new(state: &AppState, headers: &HeaderMap) -> Self {
        let cookies = RequestCookies::new(headers);
        Self {
            backend: state.factory.create(cookies.clone()),
            notifier: FlashNotifier::new(cookies.clone()),
            cookies,
        }
    }

    pub fn cookies(&self) -> Arc<RequestCookies> {
        self.cookies.clone()
    }

    /// 303 so the browser follows up with a GET.
    pub fn see_other(&self, location: &str) -> Response {
        self.cookies.apply(Redirect::to(location).into_response())
    }

    pub fn respond(&self, response: impl IntoResponse) -> Response {
        self.cookies.apply(response.into_response())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_next() {
        assert_eq!(safe_next(Some("/dashboard/items")), Some("/dashboard/items"));
        assert_eq!(safe_next(Some("//evil.example")), None);
        assert_eq!(safe_next(Some("https://evil.example")), None);
        assert_eq!(safe_next(Some("/\\evil.example")), None);
        assert_eq!(safe_next(None), None);
    }

    #[test]
    fn test_login_error_location() {
        assert_eq!(
            login_error("Invalid login credentials", Some("/dashboard")),
            "/login?error=Invalid+login+credentials&next=%2Fdashboard"
        );
        assert_eq!(login_error("x", Some("//evil")), "/login?error=x");
    }

    #[test]
    fn test_prefers_dark_hint() {
        let mut headers = HeaderMap::new();
        assert!(!prefers_dark(&headers));
        headers.insert(PREFERS_COLOR_SCHEME, "\"dark\"".parse().unwrap());
        assert!(prefers_dark(&headers));
    }
}
