//! Application state

use std::sync::Arc;

use crate::config::AppConfig;
use crate::guard::RoutePolicy;
use crate::items::QueryCache;
use crate::provider::{ClientFactory, SupabaseFactory};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<AppConfig>,
    /// Builds a provider handle per cookie store
    pub factory: Arc<dyn ClientFactory>,
    /// Which paths need a session
    pub policy: Arc<RoutePolicy>,
    /// Item lists, keyed per user
    pub cache: Arc<QueryCache>,
}

impl AppState {
    /// State backed by the hosted provider
    pub fn new(config: AppConfig) -> Self {
        let config = Arc::new(config);
        let factory = Arc::new(SupabaseFactory::new(config.clone()));
        Self::with_factory(config, factory)
    }

    /// State with a custom provider factory
    pub fn with_factory(config: Arc<AppConfig>, factory: Arc<dyn ClientFactory>) -> Self {
        // Anonymous visitors may switch themes too.
        let mut policy = RoutePolicy::default().with_public_path("/theme");
        for path in &config.extra_public_paths {
            policy = policy.with_public_path(path);
        }
        let cache = QueryCache::new(Some(config.items_cache_ttl));

        Self {
            config,
            factory,
            policy: Arc::new(policy),
            cache: Arc::new(cache),
        }
    }
}
