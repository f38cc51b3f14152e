//! Landing page, dashboard and password pages

use atlas_auth::UserAttributes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Response;
use axum::Form;

use crate::forms::{ResetPasswordForm, UpdatePasswordForm};
use crate::handlers::shared::{Action, Page};
use crate::html;
use crate::notify::{Notification, Notifier};
use crate::state::AppState;

/// GET /
pub async fn landing(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let page = Page::new(&state, &headers, "/");
    let user = page.user().await;
    page.render(html::landing(&page.chrome(user.as_ref())))
}

/// GET /dashboard
pub async fn dashboard(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let page = Page::new(&state, &headers, "/dashboard");
    let Some(user) = page.user().await else {
        return page.redirect(&state.policy.login_redirect("/dashboard"));
    };
    page.render(html::dashboard(&page.chrome(Some(&user)), &user))
}

/// GET /reset-password
pub async fn reset_password_page(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let page = Page::new(&state, &headers, "/reset-password");
    if page.user().await.is_some() {
        return page.redirect(state.policy.home_path());
    }
    page.render(html::reset_password(&page.chrome(None)))
}

/// POST /reset-password
///
/// The emailed link lands on the callback, which then forwards to
/// `/update-password` with a fresh session.
pub async fn reset_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<ResetPasswordForm>,
) -> Response {
    let action = Action::new(&state, &headers);
    let email = match form.validate() {
        Ok(email) => email,
        Err(err) => {
            action
                .notifier
                .notify(Notification::error("Could not send reset link", err.to_string()));
            return action.see_other("/reset-password");
        }
    };

    let redirect_to = state.config.site_link("/auth/callback?next=/update-password");
    match action.backend.reset_password_for_email(&email, &redirect_to).await {
        Ok(()) => {
            tracing::info!("password reset requested");
            action.notifier.notify(Notification::success(
                "Check your email",
                "We sent you a link to reset your password.",
            ));
            action.see_other("/login")
        }
        Err(err) => {
            let err = crate::Error::from(err);
            tracing::warn!(error = %err, "password reset failed");
            action
                .notifier
                .notify(Notification::error("Could not send reset link", err.user_message()));
            action.see_other("/reset-password")
        }
    }
}

/// GET /update-password
pub async fn update_password_page(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let page = Page::new(&state, &headers, "/update-password");
    let Some(user) = page.user().await else {
        return page.redirect(&state.policy.login_redirect("/update-password"));
    };
    page.render(html::update_password(&page.chrome(Some(&user))))
}

/// POST /update-password
pub async fn update_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<UpdatePasswordForm>,
) -> Response {
    let action = Action::new(&state, &headers);
    let password = match form.validate() {
        Ok(password) => password,
        Err(err) => {
            action
                .notifier
                .notify(Notification::error("Could not update password", err.to_string()));
            return action.see_other("/update-password");
        }
    };

    match action.backend.update_user(UserAttributes::password(&password)).await {
        Ok(user) => {
            tracing::info!(user_id = %user.id, "password updated");
            action
                .notifier
                .notify(Notification::success("Password updated", String::new()));
            action.see_other(state.policy.home_path())
        }
        Err(err) => {
            let err = crate::Error::from(err);
            tracing::warn!(error = %err, "password update failed");
            action
                .notifier
                .notify(Notification::error("Could not update password", err.user_message()));
            action.see_other("/update-password")
        }
    }
}
