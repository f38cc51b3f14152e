//! Error handling for the atlas service

use atlas_auth::AuthError;
use atlas_postgrest::PostgrestError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::forms::ValidationError;
use crate::html;

/// Unified error type for the service
#[derive(Error, Debug)]
pub enum Error {
    /// Auth provider errors
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Table API errors
    #[error("Database error: {0}")]
    Database(#[from] PostgrestError),

    /// Rejected form input
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// An operation needed a signed-in user and there was none
    #[error("not authenticated")]
    NotAuthenticated,

    /// A write succeeded but the provider returned no row
    #[error("no row returned for {0}")]
    NoRowReturned(&'static str),
}

impl Error {
    /// Message fit to show to the user.
    pub fn user_message(&self) -> String {
        match self {
            Error::Auth(AuthError::ApiError { message, .. }) => message.clone(),
            Error::Database(err) => err.user_message(),
            other => other.to_string(),
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Error::NotAuthenticated => StatusCode::UNAUTHORIZED,
            Error::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::Auth(err) if err.status().is_some_and(|s| (400..500).contains(&s)) => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = ?self, "request failed");
        }
        (status, html::error_page(status, &self.user_message())).into_response()
    }
}

/// Result type for the service
pub type Result<T> = std::result::Result<T, Error>;
