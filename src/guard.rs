//! Route protection.
//!
//! [`route_guard`] runs in front of every route. It loads the session
//! through a [`MiddlewareCookies`] bridge (refreshing it when stale), asks
//! [`RoutePolicy::decide`] what to do, and carries any cookie the refresh
//! wrote to both the forwarded request and the outgoing response.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};

use crate::cookies::{append_set_cookies, MiddlewareCookies};
use crate::state::AppState;

/// What the guard does with a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// Outside the guard's matcher: not even the session is loaded.
    Excluded,
    /// Handled by the downstream route.
    PassThrough,
    /// Redirect to this location.
    Redirect(String),
}

/// Which paths need a session
#[derive(Debug, Clone)]
pub struct RoutePolicy {
    public_paths: Vec<String>,
    api_prefix: String,
    login_path: String,
    home_path: String,
    /// Leading path segments the guard never runs for.
    excluded: Vec<String>,
}

impl Default for RoutePolicy {
    fn default() -> Self {
        Self {
            public_paths: vec!["/".into(), "/login".into(), "/auth/callback".into()],
            api_prefix: "/api".into(),
            login_path: "/login".into(),
            home_path: "/dashboard".into(),
            excluded: vec![
                "api".into(),
                "_next/static".into(),
                "_next/image".into(),
                "favicon.ico".into(),
            ],
        }
    }
}

impl RoutePolicy {
    pub fn with_public_path(mut self, path: &str) -> Self {
        if !self.public_paths.iter().any(|p| p == path) {
            self.public_paths.push(path.to_string());
        }
        self
    }

    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    pub fn home_path(&self) -> &str {
        &self.home_path
    }

    /// Whether the guard runs for `path` at all.
    pub fn matches(&self, path: &str) -> bool {
        let rest = path.strip_prefix('/').unwrap_or(path);
        !self.excluded.iter().any(|prefix| rest.starts_with(prefix.as_str()))
    }

    pub fn is_public(&self, path: &str) -> bool {
        self.public_paths.iter().any(|p| p == path) || path.starts_with(self.api_prefix.as_str())
    }

    /// Decide the fate of a request for `path`.
    ///
    /// `/login` is public, but a signed-in visitor is still sent on to the
    /// dashboard before the page renders.
    pub fn decide(&self, path: &str, has_session: bool) -> GuardDecision {
        if !self.matches(path) {
            return GuardDecision::Excluded;
        }
        if has_session && path == self.login_path {
            return GuardDecision::Redirect(self.home_path.clone());
        }
        if self.is_public(path) || has_session {
            return GuardDecision::PassThrough;
        }
        GuardDecision::Redirect(self.login_redirect(path))
    }

    /// `/login`, carrying `next` unless the user came from the root.
    pub fn login_redirect(&self, path: &str) -> String {
        if path == "/" {
            return self.login_path.clone();
        }
        let next: String = url::form_urlencoded::byte_serialize(path.as_bytes()).collect();
        format!("{}?next={}", self.login_path, next)
    }
}

/// Middleware applying [`RoutePolicy`] to every request.
pub async fn route_guard(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    if !state.policy.matches(&path) {
        return next.run(request).await;
    }

    let cookies = MiddlewareCookies::new(request.headers());
    let backend = state.factory.create(cookies.clone());

    // A failed lookup counts as signed out.
    let has_session = match backend.get_session().await {
        Ok(session) => session.is_some(),
        Err(err) => {
            tracing::warn!(path = %path, error = %err, "session lookup failed");
            false
        }
    };

    let set_cookies = cookies.response_cookies();
    match state.policy.decide(&path, has_session) {
        GuardDecision::Redirect(location) => {
            tracing::info!(path = %path, location = %location, has_session, "guard redirect");
            let mut response = Redirect::temporary(&location).into_response();
            append_set_cookies(&mut response, &set_cookies);
            response
        }
        GuardDecision::PassThrough | GuardDecision::Excluded => {
            cookies.forward_to(request.headers_mut());
            let mut response = next.run(request).await;
            append_set_cookies(&mut response, &set_cookies);
            response
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_paths_never_redirect() {
        let policy = RoutePolicy::default();
        for path in ["/", "/auth/callback", "/api/health", "/apiary"] {
            assert!(
                !matches!(policy.decide(path, false), GuardDecision::Redirect(_)),
                "{}",
                path
            );
            assert!(!matches!(policy.decide(path, true), GuardDecision::Redirect(_)));
        }
    }

    #[test]
    fn test_anonymous_requests_go_to_login() {
        let policy = RoutePolicy::default();
        assert_eq!(
            policy.decide("/dashboard", false),
            GuardDecision::Redirect("/login?next=%2Fdashboard".to_string())
        );
        assert_eq!(
            policy.decide("/dashboard/items/new", false),
            GuardDecision::Redirect("/login?next=%2Fdashboard%2Fitems%2Fnew".to_string())
        );
        assert_eq!(policy.decide("/login", false), GuardDecision::PassThrough);
    }

    #[test]
    fn test_signed_in_users_skip_login() {
        let policy = RoutePolicy::default();
        assert_eq!(
            policy.decide("/login", true),
            GuardDecision::Redirect("/dashboard".to_string())
        );
        assert_eq!(policy.decide("/dashboard/items", true), GuardDecision::PassThrough);
    }

    #[test]
    fn test_matcher_exclusions() {
        let policy = RoutePolicy::default();
        assert!(!policy.matches("/api/health"));
        assert!(!policy.matches("/_next/static/chunk.js"));
        assert!(!policy.matches("/_next/image"));
        assert!(!policy.matches("/favicon.ico"));
        assert!(policy.matches("/dashboard"));
        assert_eq!(policy.decide("/favicon.ico", false), GuardDecision::Excluded);
    }

    #[test]
    fn test_login_redirect_for_root_has_no_next() {
        assert_eq!(RoutePolicy::default().login_redirect("/"), "/login");
    }

    #[test]
    fn test_extra_public_path() {
        let policy = RoutePolicy::default().with_public_path("/reset-password");
        assert_eq!(policy.decide("/reset-password", false), GuardDecision::PassThrough);
    }
}
