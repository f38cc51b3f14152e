//! Atlas
//!
//! A small server-rendered web app on top of Supabase: cookie-backed
//! sessions shared between the route guard, page renders and form actions,
//! plus a per-user list of items stored through PostgREST.
//!
//! # Example
//!
//! ```no_run
//! use atlas::{app, AppConfig, AppState};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = AppConfig::from_env()?;
//! let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.http_port)).await?;
//! axum::serve(listener, app(AppState::new(config))).await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod cookies;
pub mod error;
pub mod forms;
pub mod guard;
pub mod handlers;
pub mod html;
pub mod items;
pub mod notify;
pub mod provider;
pub mod state;
pub mod theme;

pub use client::{create_browser_client, create_server_client, SupabaseClient};
pub use config::{AppConfig, ClientOptions, ConfigError};
pub use error::{Error, Result};
pub use guard::{GuardDecision, RoutePolicy};
pub use handlers::app;
pub use state::AppState;

// Re-export the SDK crates
pub use atlas_auth as auth;
pub use atlas_postgrest as postgrest;
