//! Form payloads and their validation.

use atlas_auth::OAuthProvider;
use serde::Deserialize;
use thiserror::Error;

pub const TITLE_MIN: usize = 3;
pub const TITLE_MAX: usize = 280;
pub const DESCRIPTION_MAX: usize = 1000;
pub const PASSWORD_MIN: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    Required(&'static str),

    #[error("{field} must be at least {min} characters")]
    TooShort { field: &'static str, min: usize },

    #[error("{field} must be at most {max} characters")]
    TooLong { field: &'static str, max: usize },

    #[error("enter a valid email address")]
    InvalidEmail,

    #[error("passwords do not match")]
    PasswordMismatch,

    #[error("unsupported sign-in method: {0}")]
    UnknownAction(String),
}

fn check_email(email: &str) -> Result<String, ValidationError> {
    let email = email.trim();
    if email.is_empty() {
        return Err(ValidationError::Required("email"));
    }
    let (local, domain) = email.split_once('@').ok_or(ValidationError::InvalidEmail)?;
    let domain_ok = domain.contains('.') && domain.split('.').all(|label| !label.is_empty());
    if local.is_empty() || domain.contains('@') || !domain_ok || email.contains(char::is_whitespace)
    {
        return Err(ValidationError::InvalidEmail);
    }
    Ok(email.to_string())
}

fn check_password(password: Option<&str>, min: usize) -> Result<String, ValidationError> {
    let password = password.unwrap_or_default();
    if password.is_empty() {
        return Err(ValidationError::Required("password"));
    }
    if password.chars().count() < min {
        return Err(ValidationError::TooShort {
            field: "password",
            min,
        });
    }
    Ok(password.to_string())
}

/// `POST /login`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub email: String,
    pub password: Option<String>,
    pub provider: Option<String>,
    pub next: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginAction {
    Password { email: String, password: String },
    SignUp { email: String, password: String },
    MagicLink { email: String },
    OAuth(OAuthProvider),
}

impl LoginForm {
    pub fn validate(&self) -> Result<LoginAction, ValidationError> {
        match self.action.as_str() {
            "" | "password" => Ok(LoginAction::Password {
                email: check_email(&self.email)?,
                password: check_password(self.password.as_deref(), 1)?,
            }),
            "signup" => Ok(LoginAction::SignUp {
                email: check_email(&self.email)?,
                password: check_password(self.password.as_deref(), PASSWORD_MIN)?,
            }),
            // The password field is ignored for magic links.
            "magic-link" => Ok(LoginAction::MagicLink {
                email: check_email(&self.email)?,
            }),
            "oauth" => {
                let name = self.provider.as_deref().unwrap_or("google");
                OAuthProvider::parse(name)
                    .map(LoginAction::OAuth)
                    .ok_or_else(|| ValidationError::UnknownAction(name.to_string()))
            }
            other => Err(ValidationError::UnknownAction(other.to_string())),
        }
    }
}

/// `POST /dashboard/items/new`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewItemForm {
    #[serde(default)]
    pub title: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemDraft {
    pub title: String,
    pub description: Option<String>,
}

impl NewItemForm {
    pub fn validate(&self) -> Result<ItemDraft, ValidationError> {
        let title = self.title.trim();
        let title_len = title.chars().count();
        if title_len < TITLE_MIN {
            return Err(ValidationError::TooShort {
                field: "title",
                min: TITLE_MIN,
            });
        }
        if title_len > TITLE_MAX {
            return Err(ValidationError::TooLong {
                field: "title",
                max: TITLE_MAX,
            });
        }

        let description = self
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty());
        if description.is_some_and(|d| d.chars().count() > DESCRIPTION_MAX) {
            return Err(ValidationError::TooLong {
                field: "description",
                max: DESCRIPTION_MAX,
            });
        }

        Ok(ItemDraft {
            title: title.to_string(),
            description: description.map(str::to_string),
        })
    }
}

/// `POST /dashboard/items`
#[derive(Debug, Clone, Deserialize)]
pub struct ItemActionForm {
    pub id: String,
    pub action: String,
    /// Current state, flipped by `toggle`.
    #[serde(default)]
    pub is_complete: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemAction {
    SetComplete(bool),
    Delete,
}

impl ItemActionForm {
    pub fn validate(&self) -> Result<ItemAction, ValidationError> {
        if self.id.trim().is_empty() {
            return Err(ValidationError::Required("id"));
        }
        match self.action.as_str() {
            "toggle" => {
                let current = matches!(self.is_complete.as_deref(), Some("true" | "on" | "1"));
                Ok(ItemAction::SetComplete(!current))
            }
            "delete" => Ok(ItemAction::Delete),
            other => Err(ValidationError::UnknownAction(other.to_string())),
        }
    }
}

/// `POST /reset-password`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResetPasswordForm {
    #[serde(default)]
    pub email: String,
}

impl ResetPasswordForm {
    pub fn validate(&self) -> Result<String, ValidationError> {
        check_email(&self.email)
    }
}

/// `POST /update-password`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdatePasswordForm {
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub confirm_password: String,
}

impl UpdatePasswordForm {
    pub fn validate(&self) -> Result<String, ValidationError> {
        let password = check_password(Some(&self.password), PASSWORD_MIN)?;
        if password != self.confirm_password {
            return Err(ValidationError::PasswordMismatch);
        }
        Ok(password)
    }
}

/// `POST /theme`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ThemeForm {
    #[serde(default)]
    pub theme: String,
    pub return_to: Option<String>,
}
