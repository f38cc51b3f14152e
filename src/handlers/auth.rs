//! Sign-in, sign-out and the provider callback

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{Redirect, Response};
use axum::Form;
use serde::Deserialize;

use crate::forms::{LoginAction, LoginForm};
use crate::handlers::shared::{login_error, safe_next, Action, Page};
use crate::html;
use crate::notify::{Notification, Notifier};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub next: Option<String>,
    /// Set by the provider when the user aborted or the link expired.
    pub error_description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginQuery {
    pub error: Option<String>,
    pub next: Option<String>,
}

/// GET /auth/callback
///
/// Trades the one-time code for a session. No retry: a failed exchange
/// sends the user back to the login page.
pub async fn callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let action = Action::new(&state, &headers);

    let Some(code) = query.code.as_deref().filter(|c| !c.is_empty()) else {
        let message = query
            .error_description
            .as_deref()
            .unwrap_or("Missing authorization code");
        tracing::warn!(reason = %message, "callback without code");
        return action.respond(Redirect::temporary(&login_error(message, None)));
    };

    match action.backend.exchange_code_for_session(code).await {
        Ok(session) => {
            let next = safe_next(query.next.as_deref()).unwrap_or("/dashboard");
            tracing::info!(user_id = %session.user.id, next = %next, "code exchanged");
            action.respond(Redirect::temporary(next))
        }
        Err(err) => {
            tracing::warn!(error = %err, "code exchange failed");
            action.respond(Redirect::temporary(&login_error(
                &crate::Error::from(err).user_message(),
                None,
            )))
        }
    }
}

/// POST /auth/signout
pub async fn sign_out(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let action = Action::new(&state, &headers);
    match action.backend.sign_out().await {
        Ok(()) => {
            tracing::info!("signed out");
            action.see_other("/")
        }
        Err(err) => {
            tracing::warn!(error = %err, "sign-out failed");
            action.see_other(&login_error(&crate::Error::from(err).user_message(), None))
        }
    }
}

/// GET /auth/signout: no side effects, just go home.
pub async fn sign_out_get() -> Redirect {
    Redirect::to("/")
}

/// GET /login
pub async fn login_page(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<LoginQuery>,
) -> Response {
    let page = Page::new(&state, &headers, "/login");
    if page.user().await.is_some() {
        return page.redirect(state.policy.home_path());
    }
    page.render(html::login(
        &page.chrome(None),
        query.error.as_deref(),
        safe_next(query.next.as_deref()),
    ))
}

/// POST /login
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<LoginForm>,
) -> Response {
    let action = Action::new(&state, &headers);
    let next = safe_next(form.next.as_deref());

    let login_action = match form.validate() {
        Ok(login_action) => login_action,
        Err(err) => return action.see_other(&login_error(&err.to_string(), next)),
    };

    let callback = match next {
        Some(next) => {
            let next: String = url::form_urlencoded::byte_serialize(next.as_bytes()).collect();
            state.config.site_link(&format!("/auth/callback?next={}", next))
        }
        None => state.config.site_link("/auth/callback"),
    };

    match login_action {
        LoginAction::Password { email, password } => {
            match action.backend.sign_in_with_password(&email, &password).await {
                Ok(session) => {
                    tracing::info!(user_id = %session.user.id, "signed in with password");
                    action.see_other(next.unwrap_or(state.policy.home_path()))
                }
                Err(err) => {
                    tracing::info!(error = %err, "password sign-in rejected");
                    action.see_other(&login_error(&crate::Error::from(err).user_message(), next))
                }
            }
        }
        LoginAction::SignUp { email, password } => {
            match action.backend.sign_up(&email, &password, &callback).await {
                Ok(response) if response.session.is_some() => {
                    action.see_other(next.unwrap_or(state.policy.home_path()))
                }
                Ok(_) => {
                    action.notifier.notify(Notification::success(
                        "Check your email",
                        "Follow the link we sent you to confirm your account.",
                    ));
                    action.see_other("/login")
                }
                Err(err) => {
                    action.see_other(&login_error(&crate::Error::from(err).user_message(), next))
                }
            }
        }
        LoginAction::MagicLink { email } => {
            match action.backend.sign_in_with_otp(&email, &callback).await {
                Ok(()) => {
                    action.notifier.notify(Notification::success(
                        "Check your email",
                        "We sent you a sign-in link.",
                    ));
                    action.see_other("/login")
                }
                Err(err) => {
                    action.see_other(&login_error(&crate::Error::from(err).user_message(), next))
                }
            }
        }
        LoginAction::OAuth(provider) => {
            match action.backend.sign_in_with_oauth(provider, &callback) {
                Ok(url) => {
                    tracing::info!(provider = provider.as_str(), "starting oauth sign-in");
                    action.see_other(&url)
                }
                Err(err) => {
                    action.see_other(&login_error(&crate::Error::from(err).user_message(), next))
                }
            }
        }
    }
}

