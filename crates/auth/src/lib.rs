//! Supabase Auth client for atlas
//!
//! Talks to the GoTrue REST API and keeps the session in cookies through a
//! caller-supplied [`CookieMethods`] adapter, so the same client works in a
//! browser-like store, a request handler, or a middleware that has to mirror
//! writes onto both the request and the response.

mod cookies;
mod events;
mod pkce;
mod storage;
mod types;

use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use thiserror::Error;
use url::Url;

pub use cookies::{CookieMethods, CookieOptions, CookieWriteError, SameSite, DEFAULT_MAX_AGE_SECS};
pub use events::{AuthChangeEvent, Subscription};
pub use storage::{default_storage_key, MAX_CHUNK_SIZE};
pub use types::{
    OAuthProvider, OAuthSignInOptions, OtpOptions, Session, SignUpOptions, SignUpResponse, User,
    UserAttributes,
};

use events::Listeners;
use storage::SessionStorage;
use types::ApiErrorBody;

const CLIENT_INFO: &str = concat!("atlas-auth/", env!("CARGO_PKG_VERSION"));

/// Errors returned by the auth client
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("URL error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("Missing session")]
    MissingSession,

    #[error("Code verifier not found in storage")]
    MissingCodeVerifier,
}

impl AuthError {
    /// HTTP status reported by the auth server, if the failure came from it.
    pub fn status(&self) -> Option<u16> {
        match self {
            AuthError::ApiError { status, .. } => Some(*status),
            _ => None,
        }
    }

    fn is_client_error(&self) -> bool {
        self.status().is_some_and(|s| (400..500).contains(&s))
    }
}

/// How sign-in flows that leave the app (magic link, OAuth, recovery) come back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowType {
    /// Code returned to the callback, exchanged with the stored verifier.
    Pkce,
    /// Tokens returned in the URL fragment.
    Implicit,
}

/// Client options
#[derive(Debug, Clone)]
pub struct AuthOptions {
    pub auto_refresh_token: bool,
    pub persist_session: bool,
    pub flow_type: FlowType,
    /// Refresh when the access token expires within this many seconds.
    pub expiry_margin_secs: i64,
    pub cookie_options: CookieOptions,
    /// Overrides `sb-<project-ref>-auth-token`.
    pub storage_key: Option<String>,
}

impl Default for AuthOptions {
    fn default() -> Self {
        Self {
            auto_refresh_token: true,
            persist_session: true,
            flow_type: FlowType::Pkce,
            expiry_margin_secs: 90,
            cookie_options: CookieOptions::default(),
            storage_key: None,
        }
    }
}

/// Auth client
pub struct AuthClient {
    url: String,
    key: String,
    http_client: Client,
    options: AuthOptions,
    storage: SessionStorage,
    listeners: Arc<Listeners>,
}

impl AuthClient {
    /// Create a client. No request is made until an operation is invoked.
    pub fn new(
        url: &str,
        key: &str,
        http_client: Client,
        options: AuthOptions,
        cookies: Arc<dyn CookieMethods>,
    ) -> Self {
        let url = url.trim_end_matches('/').to_string();
        let storage_key = options
            .storage_key
            .clone()
            .unwrap_or_else(|| default_storage_key(&url));
        let storage = SessionStorage::new(cookies, storage_key, options.cookie_options.clone());
        Self {
            url,
            key: key.to_string(),
            http_client,
            options,
            storage,
            listeners: Arc::new(Listeners::default()),
        }
    }

    /// Name of the cookie (or cookie prefix, when chunked) holding the session.
    pub fn storage_key(&self) -> &str {
        self.storage.key()
    }

    /// The stored session as-is: no refresh, no network.
    pub fn session_from_storage(&self) -> Option<Session> {
        self.storage.load()
    }

    /// Current session, refreshed first when the access token is about to expire.
    pub async fn get_session(&self) -> Result<Option<Session>, AuthError> {
        let Some(session) = self.storage.load() else {
            return Ok(None);
        };

        if !self.options.auto_refresh_token
            || !session.expires_within(now(), self.options.expiry_margin_secs)
        {
            return Ok(Some(session));
        }

        log::debug!("access token for {} is stale, refreshing", session.user.id);
        match self.refresh_with_token(&session.refresh_token).await {
            Ok(refreshed) => {
                self.listeners
                    .emit(AuthChangeEvent::TokenRefreshed, Some(&refreshed));
                Ok(Some(refreshed))
            }
            Err(err) => {
                if err.is_client_error() {
                    log::warn!("refresh token rejected, clearing session: {}", err);
                    self.storage.clear();
                    self.listeners.emit(AuthChangeEvent::SignedOut, None);
                }
                Err(err)
            }
        }
    }

    /// Fetch the user behind the current session.
    pub async fn get_user(&self) -> Result<Option<User>, AuthError> {
        let Some(session) = self.get_session().await? else {
            return Ok(None);
        };

        let response = self
            .http_client
            .get(self.endpoint("/user"))
            .header("apikey", &self.key)
            .header("X-Client-Info", CLIENT_INFO)
            .bearer_auth(&session.access_token)
            .send()
            .await?;

        let user: User = parse_json(response).await?;
        Ok(Some(user))
    }

    /// Sign in with email and password
    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, AuthError> {
        let payload = serde_json::json!({
            "email": email,
            "password": password,
        });

        let response = self
            .http_client
            .post(self.endpoint("/token?grant_type=password"))
            .header("apikey", &self.key)
            .header("X-Client-Info", CLIENT_INFO)
            .json(&payload)
            .send()
            .await?;

        let session = self.accept_session(parse_json(response).await?);
        self.listeners.emit(AuthChangeEvent::SignedIn, Some(&session));
        Ok(session)
    }

    /// Register a new user. Returns a session only when confirmation is not required.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        options: SignUpOptions,
    ) -> Result<SignUpResponse, AuthError> {
        let mut payload = serde_json::json!({
            "email": email,
            "password": password,
        });
        if let Some(data) = options.data {
            payload["data"] = data;
        }
        self.attach_challenge(&mut payload, false);

        let url = with_redirect(&self.endpoint("/signup"), options.email_redirect_to.as_deref())?;
        let response = self
            .http_client
            .post(url)
            .header("apikey", &self.key)
            .header("X-Client-Info", CLIENT_INFO)
            .json(&payload)
            .send()
            .await?;

        let body: serde_json::Value = parse_json(response).await?;
        if body.get("access_token").is_some() {
            let session = self.accept_session(serde_json::from_value(body)?);
            self.listeners.emit(AuthChangeEvent::SignedIn, Some(&session));
            return Ok(SignUpResponse {
                user: Some(session.user.clone()),
                session: Some(session),
            });
        }

        let user: User = match body.get("user").cloned() {
            Some(user) => serde_json::from_value(user)?,
            None => serde_json::from_value(body)?,
        };
        Ok(SignUpResponse {
            user: Some(user),
            session: None,
        })
    }

    /// Send a magic link / one-time code to `email`.
    pub async fn sign_in_with_otp(&self, email: &str, options: OtpOptions) -> Result<(), AuthError> {
        let mut payload = serde_json::json!({
            "email": email,
            "create_user": options.should_create_user,
        });
        self.attach_challenge(&mut payload, false);

        let url = with_redirect(&self.endpoint("/otp"), options.email_redirect_to.as_deref())?;
        let response = self
            .http_client
            .post(url)
            .header("apikey", &self.key)
            .header("X-Client-Info", CLIENT_INFO)
            .json(&payload)
            .send()
            .await?;

        ensure_success(response).await?;
        Ok(())
    }

    /// Build the provider authorize URL the browser should be sent to.
    pub fn sign_in_with_oauth(
        &self,
        provider: OAuthProvider,
        options: OAuthSignInOptions,
    ) -> Result<String, AuthError> {
        let mut url = Url::parse(&self.endpoint("/authorize"))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("provider", provider.as_str());
            if let Some(redirect_to) = &options.redirect_to {
                query.append_pair("redirect_to", redirect_to);
            }
            if let Some(scopes) = &options.scopes {
                query.append_pair("scopes", scopes);
            }
            if self.options.flow_type == FlowType::Pkce {
                let verifier = pkce::generate_verifier();
                self.storage.store_verifier(&verifier);
                query.append_pair("code_challenge", &pkce::challenge_for(&verifier));
                query.append_pair("code_challenge_method", pkce::CHALLENGE_METHOD);
            }
        }
        Ok(url.to_string())
    }

    /// Trade the one-time `auth_code` from the callback for a session.
    pub async fn exchange_code_for_session(&self, auth_code: &str) -> Result<Session, AuthError> {
        let stored = self
            .storage
            .load_verifier()
            .ok_or(AuthError::MissingCodeVerifier)?;
        let (verifier, recovery) = pkce::split_stored(&stored);

        let payload = serde_json::json!({
            "auth_code": auth_code,
            "code_verifier": verifier,
        });

        let response = self
            .http_client
            .post(self.endpoint("/token?grant_type=pkce"))
            .header("apikey", &self.key)
            .header("X-Client-Info", CLIENT_INFO)
            .json(&payload)
            .send()
            .await?;

        let result = parse_json::<Session>(response).await;
        self.storage.clear_verifier();
        let session = self.accept_session(result?);

        let event = if recovery {
            AuthChangeEvent::PasswordRecovery
        } else {
            AuthChangeEvent::SignedIn
        };
        self.listeners.emit(event, Some(&session));
        Ok(session)
    }

    /// Sign out everywhere and forget the local session.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        if let Some(session) = self.storage.load() {
            let response = self
                .http_client
                .post(self.endpoint("/logout?scope=global"))
                .header("apikey", &self.key)
                .header("X-Client-Info", CLIENT_INFO)
                .bearer_auth(&session.access_token)
                .send()
                .await?;

            if let Err(err) = ensure_success(response).await {
                // The token is already unusable on the server side.
                if !matches!(err.status(), Some(401 | 403 | 404)) {
                    return Err(err);
                }
                log::debug!("logout returned {:?}, clearing local session anyway", err.status());
            }
        }

        self.storage.clear();
        self.storage.clear_verifier();
        self.listeners.emit(AuthChangeEvent::SignedOut, None);
        Ok(())
    }

    /// Update the signed-in user (password, email, metadata).
    pub async fn update_user(&self, attributes: UserAttributes) -> Result<User, AuthError> {
        let mut session = self.get_session().await?.ok_or(AuthError::MissingSession)?;

        let response = self
            .http_client
            .put(self.endpoint("/user"))
            .header("apikey", &self.key)
            .header("X-Client-Info", CLIENT_INFO)
            .bearer_auth(&session.access_token)
            .json(&attributes)
            .send()
            .await?;

        let user: User = parse_json(response).await?;
        session.user = user.clone();
        if self.options.persist_session {
            self.storage.store(&session);
        }
        self.listeners
            .emit(AuthChangeEvent::UserUpdated, Some(&session));
        Ok(user)
    }

    /// Email a password reset link that lands on `redirect_to`.
    pub async fn reset_password_for_email(
        &self,
        email: &str,
        redirect_to: Option<&str>,
    ) -> Result<(), AuthError> {
        let mut payload = serde_json::json!({ "email": email });
        self.attach_challenge(&mut payload, true);

        let url = with_redirect(&self.endpoint("/recover"), redirect_to)?;
        let response = self
            .http_client
            .post(url)
            .header("apikey", &self.key)
            .header("X-Client-Info", CLIENT_INFO)
            .json(&payload)
            .send()
            .await?;

        ensure_success(response).await?;
        Ok(())
    }

    /// Register `callback` for auth events. It is called right away with
    /// [`AuthChangeEvent::InitialSession`] and the stored session.
    pub fn on_auth_state_change<F>(&self, callback: F) -> Subscription
    where
        F: Fn(AuthChangeEvent, Option<&Session>) + Send + Sync + 'static,
    {
        let initial = self.storage.load();
        callback(AuthChangeEvent::InitialSession, initial.as_ref());
        self.listeners.add(Arc::new(callback))
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/auth/v1{}", self.url, path)
    }

    async fn refresh_with_token(&self, refresh_token: &str) -> Result<Session, AuthError> {
        let payload = serde_json::json!({ "refresh_token": refresh_token });

        let response = self
            .http_client
            .post(self.endpoint("/token?grant_type=refresh_token"))
            .header("apikey", &self.key)
            .header("X-Client-Info", CLIENT_INFO)
            .json(&payload)
            .send()
            .await?;

        Ok(self.accept_session(parse_json(response).await?))
    }

    fn accept_session(&self, session: Session) -> Session {
        let session = session.with_expiry_from(now());
        if self.options.persist_session {
            self.storage.store(&session);
        }
        session
    }

    fn attach_challenge(&self, payload: &mut serde_json::Value, recovery: bool) {
        if self.options.flow_type != FlowType::Pkce {
            return;
        }
        let verifier = pkce::generate_verifier();
        let stored = if recovery {
            format!("{}/{}", verifier, pkce::RECOVERY_MARKER)
        } else {
            verifier.clone()
        };
        self.storage.store_verifier(&stored);
        payload["code_challenge"] = serde_json::Value::String(pkce::challenge_for(&verifier));
        payload["code_challenge_method"] =
            serde_json::Value::String(pkce::CHALLENGE_METHOD.to_string());
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

fn with_redirect(endpoint: &str, redirect_to: Option<&str>) -> Result<Url, AuthError> {
    let mut url = Url::parse(endpoint)?;
    if let Some(redirect_to) = redirect_to {
        url.query_pairs_mut().append_pair("redirect_to", redirect_to);
    }
    Ok(url)
}

async fn ensure_success(response: Response) -> Result<Response, AuthError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    Err(api_error(status, &text))
}

async fn parse_json<T: DeserializeOwned>(response: Response) -> Result<T, AuthError> {
    let response = ensure_success(response).await?;
    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn api_error(status: StatusCode, text: &str) -> AuthError {
    let message = serde_json::from_str::<ApiErrorBody>(text)
        .ok()
        .and_then(ApiErrorBody::into_message)
        .unwrap_or_else(|| text.to_string());
    AuthError::ApiError {
        status: status.as_u16(),
        message,
    }
}
