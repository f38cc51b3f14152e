//! In-memory provider and request helpers shared by the router tests.
#![allow(dead_code)]

use async_trait::async_trait;
use atlas::auth::{
    AuthError, CookieMethods, CookieOptions, OAuthProvider, Session, SignUpResponse, User,
    UserAttributes,
};
use atlas::items::{Item, ItemPatch, NewItem};
use atlas::postgrest::PostgrestError;
use atlas::provider::{AuthProvider, Backend, ClientFactory, ItemTable};
use atlas::{AppConfig, AppState};
use axum::body::Body;
use axum::http::header::{CONTENT_TYPE, COOKIE, LOCATION, SET_COOKIE};
use axum::http::{Request, Response};
use axum::Router;
use chrono::{TimeZone, Utc};
use http_body_util::BodyExt;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tower::ServiceExt;

/// Cookie carrying the mock access token.
pub const SESSION_COOKIE: &str = "mock-session";

pub struct Account {
    pub user: User,
    pub password: String,
}

#[derive(Default)]
pub struct World {
    pub accounts: HashMap<String, Account>,
    /// access token -> user id
    pub sessions: HashMap<String, String>,
    /// Tokens that get rotated on their next lookup.
    pub stale: HashSet<String>,
    /// one-time code -> user id
    pub codes: HashMap<String, String>,
    pub items: Vec<Item>,
    pub list_calls: usize,
    pub fail_list: bool,
    pub fail_sign_out: bool,
    pub signups: Vec<(String, String)>,
    pub otp_requests: Vec<(String, String)>,
    pub reset_requests: Vec<(String, String)>,
    next_id: u64,
}

impl World {
    fn next(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn user(&self, user_id: &str) -> Option<User> {
        self.accounts
            .values()
            .find(|account| account.user.id == user_id)
            .map(|account| account.user.clone())
    }

    fn session(&self, token: &str, user_id: &str) -> Option<Session> {
        let user = self.user(user_id)?;
        Some(
            serde_json::from_value(json!({
                "access_token": token,
                "refresh_token": format!("refresh-{}", token),
                "expires_in": 3600,
                "expires_at": Utc::now().timestamp() + 3600,
                "token_type": "bearer",
                "user": user,
            }))
            .unwrap(),
        )
    }

    fn open_session(&mut self, user_id: &str) -> String {
        let token = format!("token-{}", self.next());
        self.sessions.insert(token.clone(), user_id.to_string());
        token
    }
}

/// Factory handing out [`MockBackend`]s over one shared [`World`].
#[derive(Default)]
pub struct MockFactory {
    pub world: Arc<Mutex<World>>,
}

impl MockFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_user(&self, email: &str, password: &str) -> String {
        let mut world = self.world.lock();
        let id = format!("user-{}", world.next());
        let user: User = serde_json::from_value(json!({ "id": id, "email": email })).unwrap();
        world.accounts.insert(
            email.to_string(),
            Account {
                user,
                password: password.to_string(),
            },
        );
        id
    }

    /// Open a session and return the cookie header carrying it.
    pub fn sign_in(&self, user_id: &str) -> String {
        let token = self.world.lock().open_session(user_id);
        format!("{}={}", SESSION_COOKIE, token)
    }

    pub fn issue_code(&self, user_id: &str) -> String {
        let mut world = self.world.lock();
        let code = format!("code-{}", world.next());
        world.codes.insert(code.clone(), user_id.to_string());
        code
    }

    pub fn mark_stale(&self, cookie: &str) {
        let token = cookie.trim_start_matches(&format!("{}=", SESSION_COOKIE));
        self.world.lock().stale.insert(token.to_string());
    }
}

impl ClientFactory for MockFactory {
    fn create(&self, cookies: Arc<dyn CookieMethods>) -> Box<dyn Backend> {
        Box::new(MockBackend {
            world: self.world.clone(),
            cookies,
        })
    }
}

pub struct MockBackend {
    world: Arc<Mutex<World>>,
    cookies: Arc<dyn CookieMethods>,
}

impl MockBackend {
    fn token(&self) -> Option<String> {
        self.cookies.get(SESSION_COOKIE).filter(|t| !t.is_empty())
    }

    // Write failures are ignored, like the real client does on read-only stores.
    fn store_token(&self, token: &str) {
        let _ = self
            .cookies
            .set(SESSION_COOKIE, token, &CookieOptions::default());
    }

    fn user_id(&self) -> Option<String> {
        let token = self.token()?;
        self.world.lock().sessions.get(&token).cloned()
    }
}

fn rejected(status: u16, message: &str) -> AuthError {
    AuthError::ApiError {
        status,
        message: message.to_string(),
    }
}

#[async_trait]
impl AuthProvider for MockBackend {
    async fn get_session(&self) -> Result<Option<Session>, AuthError> {
        let Some(token) = self.token() else {
            return Ok(None);
        };
        let mut world = self.world.lock();
        let Some(user_id) = world.sessions.get(&token).cloned() else {
            return Ok(None);
        };

        if world.stale.remove(&token) {
            world.sessions.remove(&token);
            let fresh = world.open_session(&user_id);
            self.store_token(&fresh);
            return Ok(world.session(&fresh, &user_id));
        }
        Ok(world.session(&token, &user_id))
    }

    async fn get_user(&self) -> Result<Option<User>, AuthError> {
        Ok(self
            .get_session()
            .await?
            .map(|session| session.user))
    }

    async fn exchange_code_for_session(&self, code: &str) -> Result<Session, AuthError> {
        let mut world = self.world.lock();
        let user_id = world
            .codes
            .remove(code)
            .ok_or_else(|| rejected(400, "invalid flow state, no valid flow state found"))?;
        let token = world.open_session(&user_id);
        self.store_token(&token);
        world
            .session(&token, &user_id)
            .ok_or_else(|| rejected(404, "user not found"))
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        let mut world = self.world.lock();
        if world.fail_sign_out {
            return Err(rejected(500, "sign-out is unavailable"));
        }
        if let Some(token) = self.token() {
            world.sessions.remove(&token);
        }
        let _ = self
            .cookies
            .remove(SESSION_COOKIE, &CookieOptions::default().expired());
        Ok(())
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, AuthError> {
        let mut world = self.world.lock();
        let user_id = match world.accounts.get(email) {
            Some(account) if account.password == password => account.user.id.clone(),
            _ => return Err(rejected(400, "Invalid login credentials")),
        };
        let token = world.open_session(&user_id);
        self.store_token(&token);
        world
            .session(&token, &user_id)
            .ok_or_else(|| rejected(404, "user not found"))
    }

    async fn sign_up(
        &self,
        email: &str,
        _password: &str,
        email_redirect_to: &str,
    ) -> Result<SignUpResponse, AuthError> {
        let mut world = self.world.lock();
        if world.accounts.contains_key(email) {
            return Err(rejected(422, "User already registered"));
        }
        world
            .signups
            .push((email.to_string(), email_redirect_to.to_string()));
        Ok(SignUpResponse {
            user: None,
            session: None,
        })
    }

    async fn sign_in_with_otp(&self, email: &str, email_redirect_to: &str) -> Result<(), AuthError> {
        self.world
            .lock()
            .otp_requests
            .push((email.to_string(), email_redirect_to.to_string()));
        Ok(())
    }

    fn sign_in_with_oauth(
        &self,
        provider: OAuthProvider,
        redirect_to: &str,
    ) -> Result<String, AuthError> {
        let redirect: String = url::form_urlencoded::byte_serialize(redirect_to.as_bytes()).collect();
        Ok(format!(
            "https://auth.example.test/authorize?provider={}&redirect_to={}",
            provider.as_str(),
            redirect
        ))
    }

    async fn update_user(&self, attributes: UserAttributes) -> Result<User, AuthError> {
        let user_id = self.user_id().ok_or(AuthError::MissingSession)?;
        let mut world = self.world.lock();
        let account = world
            .accounts
            .values_mut()
            .find(|account| account.user.id == user_id)
            .ok_or_else(|| rejected(404, "user not found"))?;
        if let Some(password) = attributes.password {
            account.password = password;
        }
        Ok(account.user.clone())
    }

    async fn reset_password_for_email(
        &self,
        email: &str,
        redirect_to: &str,
    ) -> Result<(), AuthError> {
        self.world
            .lock()
            .reset_requests
            .push((email.to_string(), redirect_to.to_string()));
        Ok(())
    }
}

#[async_trait]
impl ItemTable for MockBackend {
    async fn list_items(&self) -> Result<Vec<Item>, PostgrestError> {
        let user_id = self.user_id();
        let mut world = self.world.lock();
        world.list_calls += 1;
        if world.fail_list {
            return Err(PostgrestError::UnparsedApiError {
                message: "upstream unavailable".to_string(),
                status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
            });
        }
        let mut items: Vec<Item> = world
            .items
            .iter()
            .filter(|item| Some(&item.user_id) == user_id.as_ref())
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(items)
    }

    async fn insert_item(&self, item: &NewItem) -> Result<Vec<Item>, PostgrestError> {
        let mut world = self.world.lock();
        let n = world.next();
        let created_at = Utc.timestamp_opt(1_700_000_000 + n as i64, 0).unwrap();
        let row = Item {
            id: format!("item-{}", n),
            user_id: item.user_id.clone(),
            title: item.title.clone(),
            description: item.description.clone(),
            is_complete: false,
            created_at,
            updated_at: Some(created_at),
        };
        world.items.push(row.clone());
        Ok(vec![row])
    }

    async fn update_item(&self, id: &str, patch: &ItemPatch) -> Result<Vec<Item>, PostgrestError> {
        let user_id = self.user_id();
        let mut world = self.world.lock();
        let Some(item) = world
            .items
            .iter_mut()
            .find(|item| item.id == id && Some(&item.user_id) == user_id.as_ref())
        else {
            return Ok(Vec::new());
        };
        if let Some(title) = &patch.title {
            item.title = title.clone();
        }
        if let Some(description) = &patch.description {
            item.description = description.clone();
        }
        if let Some(is_complete) = patch.is_complete {
            item.is_complete = is_complete;
        }
        Ok(vec![item.clone()])
    }

    async fn delete_item(&self, id: &str) -> Result<(), PostgrestError> {
        let user_id = self.user_id();
        self.world
            .lock()
            .items
            .retain(|item| !(item.id == id && Some(&item.user_id) == user_id.as_ref()));
        Ok(())
    }
}

pub fn config() -> AppConfig {
    AppConfig::new("http://127.0.0.1:9", "anon-key")
}

pub fn app(factory: &Arc<MockFactory>) -> Router {
    app_with(config(), factory)
}

pub fn app_with(config: AppConfig, factory: &Arc<MockFactory>) -> Router {
    let factory: Arc<dyn ClientFactory> = factory.clone();
    atlas::app(AppState::with_factory(Arc::new(config), factory))
}

pub fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

pub fn post_form(uri: &str, form: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        builder = builder.header(COOKIE, cookie);
    }
    builder.body(Body::from(form.to_string())).unwrap()
}

pub async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.unwrap()
}

pub fn location(response: &Response<Body>) -> &str {
    response
        .headers()
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

pub fn set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(str::to_string)
        .collect()
}

/// `name=value` pairs from the response's `Set-Cookie` headers that are
/// not deletions, ready to send back as a `Cookie` header.
pub fn cookie_header(response: &Response<Body>) -> String {
    set_cookies(response)
        .iter()
        .filter_map(|c| c.split(';').next())
        .filter(|pair| !pair.ends_with('='))
        .map(str::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}
