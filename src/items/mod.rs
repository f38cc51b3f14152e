//! Items owned by the signed-in user.
//!
//! [`Items`] wraps the table operations of a [`Backend`]: lists go through
//! the shared [`QueryCache`] under a per-user key, every mutation invalidates
//! that key on success and reports its outcome to a [`Notifier`].
//!
//! Cache keys always come from the user the provider vouches for
//! (`get_user`), never from the session stored in the cookie.

mod cache;

pub use cache::QueryCache;

use atlas_auth::User;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::notify::{Notification, Notifier};
use crate::provider::Backend;

/// A row of the items table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub is_complete: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Insert payload. Id and timestamps are assigned by the server.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewItem {
    pub title: String,
    pub description: Option<String>,
    pub user_id: String,
}

/// Partial update. `description: Some(None)` clears the description.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ItemPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_complete: Option<bool>,
}

/// Cache key of a user's item list.
pub fn list_key(user_id: &str) -> String {
    format!("items:{}", user_id)
}

/// Item operations for the current request
pub struct Items<'a, B: ?Sized> {
    backend: &'a B,
    cache: &'a QueryCache,
    notifier: &'a dyn Notifier,
}

impl<'a, B: Backend + ?Sized> Items<'a, B> {
    pub fn new(backend: &'a B, cache: &'a QueryCache, notifier: &'a dyn Notifier) -> Self {
        Self {
            backend,
            cache,
            notifier,
        }
    }

    /// The caller's items, newest first.
    pub async fn list(&self) -> Result<Arc<Vec<Item>>> {
        let user = self.current_user().await?;
        self.list_for(&user).await
    }

    /// Items of `user`, who must be the user the provider returned for this
    /// request's session.
    pub async fn list_for(&self, user: &User) -> Result<Arc<Vec<Item>>> {
        let user_id = &user.id;
        let backend = self.backend;
        let result = self
            .cache
            .get_or_fetch(&list_key(user_id), || backend.list_items())
            .await;

        result.map_err(|err| {
            let err = Error::from(err);
            tracing::error!(user_id = %user_id, error = %err, "failed to load items");
            self.notifier
                .notify(Notification::error("Could not load items", err.user_message()));
            err
        })
    }

    /// Create an item owned by the signed-in user.
    pub async fn create(&self, title: &str, description: Option<&str>) -> Result<Item> {
        let user = match self.current_user().await {
            Ok(user) => user,
            Err(err) => return Err(self.failed("Could not create item", err)),
        };

        let new_item = NewItem {
            title: title.to_string(),
            description: description.map(str::to_string),
            user_id: user.id.clone(),
        };

        let created = self
            .backend
            .insert_item(&new_item)
            .await
            .map_err(Error::from)
            .and_then(|rows| rows.into_iter().next().ok_or(Error::NoRowReturned("insert")));

        match created {
            Ok(item) => {
                tracing::info!(user_id = %user.id, item_id = %item.id, "item created");
                self.cache.invalidate(&list_key(&user.id));
                self.notifier
                    .notify(Notification::success("Item created", item.title.clone()));
                Ok(item)
            }
            Err(err) => Err(self.failed("Could not create item", err)),
        }
    }

    /// Apply a partial update to one item.
    pub async fn update(&self, id: &str, patch: &ItemPatch) -> Result<Item> {
        let user_id = match self.current_user().await {
            Ok(user) => user.id,
            Err(err) => return Err(self.failed("Could not update item", err)),
        };

        let updated = self
            .backend
            .update_item(id, patch)
            .await
            .map_err(Error::from)
            .and_then(|rows| rows.into_iter().next().ok_or(Error::NoRowReturned("update")));

        match updated {
            Ok(item) => {
                tracing::info!(user_id = %user_id, item_id = %item.id, "item updated");
                self.cache.invalidate(&list_key(&user_id));
                self.notifier
                    .notify(Notification::success("Item updated", item.title.clone()));
                Ok(item)
            }
            Err(err) => Err(self.failed("Could not update item", err)),
        }
    }

    /// Delete one item, returning its id.
    pub async fn delete(&self, id: &str) -> Result<String> {
        let user_id = match self.current_user().await {
            Ok(user) => user.id,
            Err(err) => return Err(self.failed("Could not delete item", err)),
        };

        match self.backend.delete_item(id).await {
            Ok(()) => {
                tracing::info!(user_id = %user_id, item_id = %id, "item deleted");
                self.cache.invalidate(&list_key(&user_id));
                self.notifier.notify(Notification::success("Item deleted", String::new()));
                Ok(id.to_string())
            }
            Err(err) => Err(self.failed("Could not delete item", err.into())),
        }
    }

    async fn current_user(&self) -> Result<User> {
        self.backend.get_user().await?.ok_or(Error::NotAuthenticated)
    }

    fn failed(&self, title: &str, err: Error) -> Error {
        tracing::error!(error = %err, "{}", title);
        self.notifier
            .notify(Notification::error(title, err.user_message()));
        err
    }
}
