//! Configuration for the atlas service

use atlas_auth::{AuthOptions, CookieOptions, FlowType};
use std::time::Duration;

/// Options handed to the auth client of every [`crate::SupabaseClient`]
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Whether to refresh the access token when it is about to expire
    pub auto_refresh_token: bool,

    /// Whether sessions are written back to cookies
    pub persist_session: bool,

    /// How redirect-based sign-in flows return to the app
    pub flow_type: FlowType,

    /// Attributes of the session cookies
    pub cookie_options: CookieOptions,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            auto_refresh_token: true,
            persist_session: true,
            flow_type: FlowType::Pkce,
            cookie_options: CookieOptions::default(),
        }
    }
}

impl ClientOptions {
    /// Set the session cookie attributes
    pub fn with_cookie_options(mut self, value: CookieOptions) -> Self {
        self.cookie_options = value;
        self
    }

    pub(crate) fn auth_options(&self) -> AuthOptions {
        AuthOptions {
            auto_refresh_token: self.auto_refresh_token,
            persist_session: self.persist_session,
            flow_type: self.flow_type,
            cookie_options: self.cookie_options.clone(),
            ..AuthOptions::default()
        }
    }
}

/// Service configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Provider base URL (public)
    pub supabase_url: String,

    /// Provider anonymous key (public)
    pub anon_key: String,

    /// HTTP server port
    pub http_port: u16,

    /// Origin used in links the provider emails back to users
    pub site_url: String,

    /// How long a fetched item list stays fresh
    pub items_cache_ttl: Duration,

    /// Paths reachable without a session in addition to the built-in ones
    pub extra_public_paths: Vec<String>,

    /// Auth client options
    pub client: ClientOptions,
}

impl AppConfig {
    /// Minimal configuration, mostly useful for tests and embedding.
    pub fn new(supabase_url: &str, anon_key: &str) -> Self {
        Self {
            supabase_url: supabase_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
            http_port: 3000,
            site_url: "http://localhost:3000".to_string(),
            items_cache_ttl: Duration::from_secs(60),
            extra_public_paths: Vec::new(),
            client: ClientOptions::default(),
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |primary: &'static str, fallback: &'static str| {
            lookup(primary)
                .or_else(|| lookup(fallback))
                .filter(|value| !value.trim().is_empty())
        };

        // Provider
        let supabase_url = var("SUPABASE_URL", "NEXT_PUBLIC_SUPABASE_URL")
            .ok_or(ConfigError::Missing("SUPABASE_URL"))?;
        url::Url::parse(&supabase_url).map_err(|_| ConfigError::Invalid("SUPABASE_URL"))?;

        let anon_key = var("SUPABASE_ANON_KEY", "NEXT_PUBLIC_SUPABASE_ANON_KEY")
            .ok_or(ConfigError::Missing("SUPABASE_ANON_KEY"))?;

        // Server
        let http_port = lookup("ATLAS_HTTP_PORT")
            .unwrap_or_else(|| "3000".to_string())
            .parse()
            .map_err(|_| ConfigError::Invalid("ATLAS_HTTP_PORT"))?;

        let site_url = lookup("ATLAS_SITE_URL")
            .unwrap_or_else(|| format!("http://localhost:{}", http_port));
        url::Url::parse(&site_url).map_err(|_| ConfigError::Invalid("ATLAS_SITE_URL"))?;

        let ttl_secs: u64 = lookup("ATLAS_ITEMS_CACHE_TTL_SECS")
            .unwrap_or_else(|| "60".to_string())
            .parse()
            .map_err(|_| ConfigError::Invalid("ATLAS_ITEMS_CACHE_TTL_SECS"))?;

        let cookie_secure = lookup("ATLAS_COOKIE_SECURE")
            .unwrap_or_else(|| "false".to_string())
            .parse()
            .map_err(|_| ConfigError::Invalid("ATLAS_COOKIE_SECURE"))?;

        let extra_public_paths = lookup("ATLAS_PUBLIC_PATHS")
            .map(|paths| {
                paths
                    .split(',')
                    .map(str::trim)
                    .filter(|path| path.starts_with('/'))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let client = ClientOptions::default()
            .with_cookie_options(CookieOptions::default().with_secure(cookie_secure));

        Ok(Self {
            supabase_url: supabase_url.trim_end_matches('/').to_string(),
            anon_key,
            http_port,
            site_url: site_url.trim_end_matches('/').to_string(),
            items_cache_ttl: Duration::from_secs(ttl_secs),
            extra_public_paths,
            client,
        })
    }

    /// Absolute URL on this site for `path`.
    pub fn site_link(&self, path: &str) -> String {
        format!("{}{}", self.site_url, path)
    }
}

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}
