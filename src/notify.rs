//! User-visible notifications ("toasts").
//!
//! Handlers redirect after every mutation, so notifications raised while
//! handling a POST travel to the next page render in a short-lived flash
//! cookie.

use atlas_auth::{CookieMethods, CookieOptions};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Name of the flash cookie.
pub const FLASH_COOKIE: &str = "atlas-flash";

const FLASH_MAX_AGE_SECS: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub level: Level,
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl Notification {
    pub fn success(title: &str, description: impl Into<String>) -> Self {
        Self {
            level: Level::Success,
            title: title.to_string(),
            description: description.into(),
        }
    }

    pub fn error(title: &str, description: impl Into<String>) -> Self {
        Self {
            level: Level::Error,
            title: title.to_string(),
            description: description.into(),
        }
    }
}

/// Receives notifications raised during a request
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Stores notifications in the flash cookie of the current response.
pub struct FlashNotifier {
    cookies: Arc<dyn CookieMethods>,
    options: CookieOptions,
}

impl FlashNotifier {
    pub fn new(cookies: Arc<dyn CookieMethods>) -> Self {
        let options = CookieOptions {
            max_age: Some(FLASH_MAX_AGE_SECS),
            http_only: true,
            ..CookieOptions::default()
        };
        Self { cookies, options }
    }

    /// Pending notifications, without clearing them.
    pub fn peek(cookies: &dyn CookieMethods) -> Vec<Notification> {
        cookies
            .get(FLASH_COOKIE)
            .filter(|value| !value.is_empty())
            .and_then(|value| decode(&value))
            .unwrap_or_default()
    }

    /// Pending notifications; the cookie is cleared when the store allows it.
    pub fn take(&self) -> Vec<Notification> {
        let pending = Self::peek(self.cookies.as_ref());
        if !pending.is_empty() {
            if let Err(err) = self.cookies.remove(FLASH_COOKIE, &self.options.expired()) {
                tracing::debug!(error = %err, "flash cookie left in place");
            }
        }
        pending
    }
}

impl Notifier for FlashNotifier {
    fn notify(&self, notification: Notification) {
        let mut pending = Self::peek(self.cookies.as_ref());
        pending.push(notification);

        let value = match serde_json::to_string(&pending) {
            Ok(json) => urlencoding::encode(&json).into_owned(),
            Err(err) => {
                tracing::error!(error = %err, "could not encode notifications");
                return;
            }
        };
        if let Err(err) = self.cookies.set(FLASH_COOKIE, &value, &self.options) {
            tracing::warn!(error = %err, "notification dropped");
        }
    }
}

fn decode(value: &str) -> Option<Vec<Notification>> {
    let json = urlencoding::decode(value).ok()?;
    serde_json::from_str(&json).ok()
}

/// Keeps notifications in memory.
#[derive(Default)]
pub struct RecordingNotifier {
    seen: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.seen.lock())
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        tracing::debug!(title = %notification.title, "notification");
        self.seen.lock().push(notification);
    }
}
