//! Theme switcher

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Response;
use axum::Form;

use crate::forms::ThemeForm;
use crate::handlers::shared::{safe_next, Action};
use crate::state::AppState;
use crate::theme::{CookieStore, Theme, ThemeSettings};

/// POST /theme
pub async fn set_theme(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<ThemeForm>,
) -> Response {
    let action = Action::new(&state, &headers);
    let settings = ThemeSettings::new(CookieStore::new(action.cookies()));

    match Theme::parse(&form.theme) {
        Some(theme) => {
            if let Err(err) = settings.set_theme(theme) {
                tracing::warn!(error = %err, "theme not saved");
            }
        }
        None => tracing::debug!(theme = %form.theme, "ignoring unknown theme"),
    }

    action.see_other(safe_next(form.return_to.as_deref()).unwrap_or("/"))
}
