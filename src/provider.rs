//! The narrow seam between the app and the hosted provider.
//!
//! Handlers only ever talk to a [`Backend`] produced by a [`ClientFactory`],
//! so the provider can be swapped for an in-memory one in tests.

use async_trait::async_trait;
use atlas_auth::{
    AuthError, CookieMethods, OAuthProvider, OAuthSignInOptions, OtpOptions, Session,
    SignUpOptions, SignUpResponse, User, UserAttributes,
};
use atlas_postgrest::{PostgrestError, SortOrder};
use reqwest::Client;
use std::sync::Arc;

use crate::client::SupabaseClient;
use crate::config::AppConfig;
use crate::items::{Item, ItemPatch, NewItem};

/// Table holding the items
pub const ITEMS_TABLE: &str = "items";

/// Auth operations the app relies on
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn get_session(&self) -> Result<Option<Session>, AuthError>;

    async fn get_user(&self) -> Result<Option<User>, AuthError>;

    async fn exchange_code_for_session(&self, code: &str) -> Result<Session, AuthError>;

    async fn sign_out(&self) -> Result<(), AuthError>;

    async fn sign_in_with_password(&self, email: &str, password: &str)
        -> Result<Session, AuthError>;

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        email_redirect_to: &str,
    ) -> Result<SignUpResponse, AuthError>;

    async fn sign_in_with_otp(&self, email: &str, email_redirect_to: &str) -> Result<(), AuthError>;

    /// Returns the URL the browser has to visit.
    fn sign_in_with_oauth(
        &self,
        provider: OAuthProvider,
        redirect_to: &str,
    ) -> Result<String, AuthError>;

    async fn update_user(&self, attributes: UserAttributes) -> Result<User, AuthError>;

    async fn reset_password_for_email(&self, email: &str, redirect_to: &str)
        -> Result<(), AuthError>;
}

/// Row operations on the items table. Scoping to the caller is the
/// provider's job.
#[async_trait]
pub trait ItemTable: Send + Sync {
    /// All visible rows, newest first.
    async fn list_items(&self) -> Result<Vec<Item>, PostgrestError>;

    async fn insert_item(&self, item: &NewItem) -> Result<Vec<Item>, PostgrestError>;

    async fn update_item(&self, id: &str, patch: &ItemPatch) -> Result<Vec<Item>, PostgrestError>;

    async fn delete_item(&self, id: &str) -> Result<(), PostgrestError>;
}

/// Everything a request needs from the provider
pub trait Backend: AuthProvider + ItemTable {}

impl<T: AuthProvider + ItemTable> Backend for T {}

/// Builds a [`Backend`] bound to one cookie store
pub trait ClientFactory: Send + Sync {
    fn create(&self, cookies: Arc<dyn CookieMethods>) -> Box<dyn Backend>;
}

/// Production factory talking to the hosted provider
pub struct SupabaseFactory {
    config: Arc<AppConfig>,
    http_client: Client,
}

impl SupabaseFactory {
    pub fn new(config: Arc<AppConfig>) -> Self {
        Self {
            config,
            http_client: Client::new(),
        }
    }
}

impl ClientFactory for SupabaseFactory {
    fn create(&self, cookies: Arc<dyn CookieMethods>) -> Box<dyn Backend> {
        Box::new(SupabaseClient::new(
            &self.config,
            self.http_client.clone(),
            cookies,
        ))
    }
}

#[async_trait]
impl AuthProvider for SupabaseClient {
    async fn get_session(&self) -> Result<Option<Session>, AuthError> {
        self.auth.get_session().await
    }

    async fn get_user(&self) -> Result<Option<User>, AuthError> {
        self.auth.get_user().await
    }

    async fn exchange_code_for_session(&self, code: &str) -> Result<Session, AuthError> {
        self.auth.exchange_code_for_session(code).await
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.auth.sign_out().await
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, AuthError> {
        self.auth.sign_in_with_password(email, password).await
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        email_redirect_to: &str,
    ) -> Result<SignUpResponse, AuthError> {
        let options = SignUpOptions {
            email_redirect_to: Some(email_redirect_to.to_string()),
            ..Default::default()
        };
        self.auth.sign_up(email, password, options).await
    }

    async fn sign_in_with_otp(&self, email: &str, email_redirect_to: &str) -> Result<(), AuthError> {
        let options = OtpOptions {
            email_redirect_to: Some(email_redirect_to.to_string()),
            ..Default::default()
        };
        self.auth.sign_in_with_otp(email, options).await
    }

    fn sign_in_with_oauth(
        &self,
        provider: OAuthProvider,
        redirect_to: &str,
    ) -> Result<String, AuthError> {
        let options = OAuthSignInOptions {
            redirect_to: Some(redirect_to.to_string()),
            scopes: None,
        };
        self.auth.sign_in_with_oauth(provider, options)
    }

    async fn update_user(&self, attributes: UserAttributes) -> Result<User, AuthError> {
        self.auth.update_user(attributes).await
    }

    async fn reset_password_for_email(
        &self,
        email: &str,
        redirect_to: &str,
    ) -> Result<(), AuthError> {
        self.auth
            .reset_password_for_email(email, Some(redirect_to))
            .await
    }
}

#[async_trait]
impl ItemTable for SupabaseClient {
    async fn list_items(&self) -> Result<Vec<Item>, PostgrestError> {
        self.from(ITEMS_TABLE)
            .select("*")
            .order("created_at", SortOrder::Descending)
            .execute::<Item>()
            .await
    }

    async fn insert_item(&self, item: &NewItem) -> Result<Vec<Item>, PostgrestError> {
        let rows = self.from(ITEMS_TABLE).insert(item).await?;
        rows_from(rows)
    }

    async fn update_item(&self, id: &str, patch: &ItemPatch) -> Result<Vec<Item>, PostgrestError> {
        let rows = self.from(ITEMS_TABLE).eq("id", id).update(patch).await?;
        rows_from(rows)
    }

    async fn delete_item(&self, id: &str) -> Result<(), PostgrestError> {
        self.from(ITEMS_TABLE).eq("id", id).delete().await?;
        Ok(())
    }
}

fn rows_from(value: serde_json::Value) -> Result<Vec<Item>, PostgrestError> {
    if value.is_null() {
        return Ok(Vec::new());
    }
    serde_json::from_value(value).map_err(|e| PostgrestError::DeserializationError(e.to_string()))
}
