//! Light/dark/system theme preference.
//!
//! The preference lives in a key-value store handed to [`ThemeSettings`];
//! in the running service that store is a cookie.

use atlas_auth::{CookieMethods, CookieOptions, CookieWriteError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Default storage key of the preference.
pub const THEME_STORAGE_KEY: &str = "atlas-ui-theme";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Theme {
    Light,
    Dark,
    #[default]
    System,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
            Theme::System => "system",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "light" => Some(Theme::Light),
            "dark" => Some(Theme::Dark),
            "system" => Some(Theme::System),
            _ => None,
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted string store
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), CookieWriteError>;
}

/// Theme preference bound to a store
pub struct ThemeSettings<S> {
    store: S,
    storage_key: String,
    default: Theme,
}

impl<S: KeyValueStore> ThemeSettings<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            storage_key: THEME_STORAGE_KEY.to_string(),
            default: Theme::System,
        }
    }

    pub fn with_storage_key(mut self, key: &str) -> Self {
        self.storage_key = key.to_string();
        self
    }

    pub fn with_default(mut self, theme: Theme) -> Self {
        self.default = theme;
        self
    }

    /// Stored preference; unknown values fall back to the default.
    pub fn theme(&self) -> Theme {
        self.store
            .get(&self.storage_key)
            .and_then(|value| Theme::parse(&value))
            .unwrap_or(self.default)
    }

    pub fn set_theme(&self, theme: Theme) -> Result<(), CookieWriteError> {
        self.store.set(&self.storage_key, theme.as_str())
    }

    /// Concrete theme to render, `System` resolved with the client's preference.
    pub fn resolve(&self, prefers_dark: bool) -> Theme {
        match self.theme() {
            Theme::System if prefers_dark => Theme::Dark,
            Theme::System => Theme::Light,
            theme => theme,
        }
    }
}

/// Cookie-backed store
pub struct CookieStore {
    cookies: Arc<dyn CookieMethods>,
    options: CookieOptions,
}

impl CookieStore {
    pub fn new(cookies: Arc<dyn CookieMethods>) -> Self {
        Self {
            cookies,
            options: CookieOptions::default(),
        }
    }
}

impl KeyValueStore for CookieStore {
    fn get(&self, key: &str) -> Option<String> {
        self.cookies.get(key).filter(|value| !value.is_empty())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CookieWriteError> {
        self.cookies.set(key, value, &self.options)
    }
}

/// In-memory store
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CookieWriteError> {
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}
