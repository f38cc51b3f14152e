//! Request-scoped handles to the auth and table APIs.

use atlas_auth::{AuthClient, CookieMethods};
use atlas_postgrest::PostgrestClient;
use reqwest::Client;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::cookies::BrowserCookies;

/// Handle to the provider bound to one cookie store
pub struct SupabaseClient {
    /// The base URL for the project
    pub url: String,
    /// The anonymous API key for the project
    pub key: String,
    /// HTTP client used for requests
    pub http_client: Client,
    /// Auth client, persisting its session through the cookie store
    pub auth: AuthClient,
}

impl SupabaseClient {
    /// Create a client. Nothing is sent until an operation is invoked.
    ///
    /// # Example
    ///
    /// ```
    /// use std::sync::Arc;
    /// use atlas::{AppConfig, SupabaseClient};
    /// use atlas::cookies::BrowserCookies;
    ///
    /// let config = AppConfig::new("https://your-project-url.supabase.co", "your-anon-key");
    /// let supabase = SupabaseClient::new(&config, reqwest::Client::new(), BrowserCookies::isolated());
    /// let query = supabase.from("items").select("*");
    /// ```
    pub fn new(config: &AppConfig, http_client: Client, cookies: Arc<dyn CookieMethods>) -> Self {
        let auth = AuthClient::new(
            &config.supabase_url,
            &config.anon_key,
            http_client.clone(),
            config.client.auth_options(),
            cookies,
        );

        Self {
            url: config.supabase_url.clone(),
            key: config.anon_key.clone(),
            http_client,
            auth,
        }
    }

    /// Get a reference to the auth client
    pub fn auth(&self) -> &AuthClient {
        &self.auth
    }

    /// Table query builder authorised as the stored session's user, or as
    /// the anonymous role when there is no session.
    pub fn from(&self, table: &str) -> PostgrestClient {
        let client = PostgrestClient::new(&self.url, &self.key, table, self.http_client.clone());
        let token = self
            .auth
            .session_from_storage()
            .map(|session| session.access_token)
            .unwrap_or_else(|| self.key.clone());

        match client.clone().with_auth(&token) {
            Ok(authorised) => authorised,
            Err(err) => {
                tracing::warn!(table, error = %err, "unusable access token, querying anonymously");
                client
            }
        }
    }
}

/// Client bound to an explicit per-request cookie store.
pub fn create_server_client(config: &AppConfig, cookies: Arc<dyn CookieMethods>) -> SupabaseClient {
    SupabaseClient::new(config, Client::new(), cookies)
}

/// Client bound to the ambient browser cookie store.
pub fn create_browser_client(config: &AppConfig) -> SupabaseClient {
    SupabaseClient::new(config, Client::new(), BrowserCookies::global())
}
