//! HTTP handlers

mod auth;
mod health;
mod items;
mod pages;
mod shared;
mod theme;

use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::guard;
use crate::state::AppState;

pub use auth::{callback, login, login_page, sign_out, sign_out_get, CallbackQuery, LoginQuery};
pub use health::{health, HealthResponse};
pub use pages::{
    dashboard, landing, reset_password, reset_password_page, update_password,
    update_password_page,
};
pub use theme::set_theme;

/// The full application: every route behind the session guard.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(landing))
        .route("/login", get(login_page).post(login))
        .route("/auth/callback", get(callback))
        .route("/auth/signout", get(sign_out_get).post(sign_out))
        .route("/dashboard", get(dashboard))
        .route("/dashboard/items", get(items::list).post(items::act))
        .route("/dashboard/items/new", get(items::new_page).post(items::create))
        .route("/reset-password", get(reset_password_page).post(reset_password))
        .route("/update-password", get(update_password_page).post(update_password))
        .route("/theme", post(set_theme))
        .route("/api/health", get(health))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(from_fn_with_state(state.clone(), guard::route_guard)),
        )
        .with_state(state)
}
