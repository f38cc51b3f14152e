//! Wire types of the auth API.

use serde::{Deserialize, Serialize};

/// User record embedded in a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub last_sign_in_at: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub app_metadata: serde_json::Value,
    #[serde(default)]
    pub user_metadata: serde_json::Value,
}

/// Access/refresh token pair issued by the auth server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    /// Unix timestamp (seconds). Filled in from `expires_in` when the server omits it.
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub token_type: String,
    pub user: User,
}

impl Session {
    /// Populate `expires_at` relative to `now` if the server left it out.
    pub(crate) fn with_expiry_from(mut self, now: i64) -> Self {
        if self.expires_at.is_none() {
            self.expires_at = Some(now + self.expires_in);
        }
        self
    }

    /// Whether the access token expires within `margin_secs` of `now`.
    pub fn expires_within(&self, now: i64, margin_secs: i64) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at - now <= margin_secs,
            None => false,
        }
    }
}

/// Result of a sign-up call: a session when email confirmation is disabled,
/// only the user otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct SignUpResponse {
    pub user: Option<User>,
    pub session: Option<Session>,
}

/// Attributes accepted by `PUT /user`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl UserAttributes {
    pub fn password(password: &str) -> Self {
        Self {
            password: Some(password.to_string()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SignUpOptions {
    pub email_redirect_to: Option<String>,
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct OtpOptions {
    pub email_redirect_to: Option<String>,
    pub should_create_user: bool,
}

impl Default for OtpOptions {
    fn default() -> Self {
        Self {
            email_redirect_to: None,
            should_create_user: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct OAuthSignInOptions {
    pub redirect_to: Option<String>,
    pub scopes: Option<String>,
}

/// OAuth providers the login page offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OAuthProvider {
    Google,
    Github,
    Gitlab,
    Discord,
    Apple,
    Azure,
}

impl OAuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Github => "github",
            Self::Gitlab => "gitlab",
            Self::Discord => "discord",
            Self::Apple => "apple",
            Self::Azure => "azure",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "google" => Some(Self::Google),
            "github" => Some(Self::Github),
            "gitlab" => Some(Self::Gitlab),
            "discord" => Some(Self::Discord),
            "apple" => Some(Self::Apple),
            "azure" => Some(Self::Azure),
            _ => None,
        }
    }
}

/// Error payloads returned by the auth server come in a few shapes.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ApiErrorBody {
    pub error: Option<String>,
    pub error_description: Option<String>,
    pub msg: Option<String>,
    pub message: Option<String>,
}

impl ApiErrorBody {
    pub(crate) fn into_message(self) -> Option<String> {
        self.error_description
            .or(self.msg)
            .or(self.message)
            .or(self.error)
    }
}
