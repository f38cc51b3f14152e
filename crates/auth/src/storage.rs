//! Session persistence on top of a [`CookieMethods`] adapter.
//!
//! A session is stored as `base64-<base64url(json)>` under
//! `sb-<project-ref>-auth-token`. Values that would not fit in one cookie
//! are split into `<key>.0`, `<key>.1`, ... chunks.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use std::sync::Arc;

use crate::cookies::{CookieMethods, CookieOptions};
use crate::types::Session;

pub const MAX_CHUNK_SIZE: usize = 3180;

const BASE64_PREFIX: &str = "base64-";

/// Derive `sb-<project-ref>-auth-token` from the project URL.
pub fn default_storage_key(project_url: &str) -> String {
    let project_ref = url::Url::parse(project_url)
        .ok()
        .and_then(|url| url.host_str().map(|host| host.to_string()))
        .and_then(|host| host.split('.').next().map(str::to_string))
        .unwrap_or_else(|| "local".to_string());
    format!("sb-{}-auth-token", project_ref)
}

pub(crate) struct SessionStorage {
    cookies: Arc<dyn CookieMethods>,
    key: String,
    options: CookieOptions,
}

impl SessionStorage {
    pub(crate) fn new(cookies: Arc<dyn CookieMethods>, key: String, options: CookieOptions) -> Self {
        Self {
            cookies,
            key,
            options,
        }
    }

    pub(crate) fn key(&self) -> &str {
        &self.key
    }

    pub(crate) fn verifier_key(&self) -> String {
        format!("{}-code-verifier", self.key)
    }

    pub(crate) fn load(&self) -> Option<Session> {
        let raw = self.read_combined()?;
        let json = match raw.strip_prefix(BASE64_PREFIX) {
            Some(encoded) => match URL_SAFE_NO_PAD.decode(encoded) {
                Ok(bytes) => bytes,
                Err(err) => {
                    log::warn!("discarding undecodable session cookie {}: {}", self.key, err);
                    return None;
                }
            },
            None => raw.into_bytes(),
        };
        match serde_json::from_slice::<Session>(&json) {
            Ok(session) => Some(session),
            Err(err) => {
                log::warn!("discarding malformed session cookie {}: {}", self.key, err);
                None
            }
        }
    }

    pub(crate) fn store(&self, session: &Session) {
        let json = match serde_json::to_vec(session) {
            Ok(json) => json,
            Err(err) => {
                log::error!("failed to serialize session: {}", err);
                return;
            }
        };
        let value = format!("{}{}", BASE64_PREFIX, URL_SAFE_NO_PAD.encode(json));
        let chunks = chunk(&value);

        if chunks.len() == 1 {
            self.write(&self.key, &value);
            self.remove_chunks_from(0);
        } else {
            for (index, part) in chunks.iter().enumerate() {
                self.write(&format!("{}.{}", self.key, index), part);
            }
            self.remove_chunks_from(chunks.len());
            self.erase(&self.key);
        }
    }

    pub(crate) fn clear(&self) {
        if self.present(&self.key) {
            self.erase(&self.key);
        }
        self.remove_chunks_from(0);
    }

    pub(crate) fn load_verifier(&self) -> Option<String> {
        self.cookies
            .get(&self.verifier_key())
            .filter(|value| !value.is_empty())
    }

    pub(crate) fn store_verifier(&self, value: &str) {
        self.write(&self.verifier_key(), value);
    }

    pub(crate) fn clear_verifier(&self) {
        let key = self.verifier_key();
        if self.present(&key) {
            self.erase(&key);
        }
    }

    fn read_combined(&self) -> Option<String> {
        if let Some(value) = self.cookies.get(&self.key).filter(|v| !v.is_empty()) {
            return Some(value);
        }
        let mut combined = String::new();
        let mut index = 0;
        while let Some(part) = self
            .cookies
            .get(&format!("{}.{}", self.key, index))
            .filter(|v| !v.is_empty())
        {
            combined.push_str(&part);
            index += 1;
        }
        if combined.is_empty() {
            None
        } else {
            Some(combined)
        }
    }

    fn present(&self, name: &str) -> bool {
        self.cookies.get(name).is_some_and(|v| !v.is_empty())
    }

    fn remove_chunks_from(&self, start: usize) {
        let mut index = start;
        loop {
            let name = format!("{}.{}", self.key, index);
            if !self.present(&name) {
                break;
            }
            self.erase(&name);
            index += 1;
        }
    }

    fn write(&self, name: &str, value: &str) {
        if let Err(err) = self.cookies.set(name, value, &self.options) {
            log::warn!("could not persist cookie {}: {}", name, err);
        }
    }

    fn erase(&self, name: &str) {
        if let Err(err) = self.cookies.remove(name, &self.options.expired()) {
            log::warn!("could not remove cookie {}: {}", name, err);
        }
    }
}

fn chunk(value: &str) -> Vec<&str> {
    // The encoded value is ASCII, so byte offsets are char boundaries.
    value
        .as_bytes()
        .chunks(MAX_CHUNK_SIZE)
        .map(|part| std::str::from_utf8(part).unwrap_or_default())
        .collect()
}
