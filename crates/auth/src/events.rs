//! Auth state change notifications.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crate::types::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthChangeEvent {
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
    PasswordRecovery,
}

impl AuthChangeEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InitialSession => "INITIAL_SESSION",
            Self::SignedIn => "SIGNED_IN",
            Self::SignedOut => "SIGNED_OUT",
            Self::TokenRefreshed => "TOKEN_REFRESHED",
            Self::UserUpdated => "USER_UPDATED",
            Self::PasswordRecovery => "PASSWORD_RECOVERY",
        }
    }
}

type Callback = Arc<dyn Fn(AuthChangeEvent, Option<&Session>) + Send + Sync>;

#[derive(Default)]
pub(crate) struct Listeners {
    next_id: AtomicU64,
    callbacks: RwLock<Vec<(u64, Callback)>>,
}

impl Listeners {
    pub(crate) fn add(self: &Arc<Self>, callback: Callback) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.callbacks.write().push((id, callback));
        Subscription {
            id,
            listeners: Arc::downgrade(self),
        }
    }

    pub(crate) fn emit(&self, event: AuthChangeEvent, session: Option<&Session>) {
        // Snapshot so a callback may unsubscribe without deadlocking.
        let callbacks: Vec<Callback> = self
            .callbacks
            .read()
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect();
        log::debug!("auth event {} to {} listener(s)", event.as_str(), callbacks.len());
        for callback in callbacks {
            callback(event, session);
        }
    }

    fn remove(&self, id: u64) {
        self.callbacks.write().retain(|(existing, _)| *existing != id);
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.callbacks.read().len()
    }
}

/// Handle returned by `on_auth_state_change`.
pub struct Subscription {
    id: u64,
    listeners: Weak<Listeners>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn unsubscribe(&self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners.remove(self.id);
        }
    }
}
