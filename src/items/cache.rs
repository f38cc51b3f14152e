//! Keyed query cache shared by every request.
//!
//! Each key owns a slot with an async lock, so concurrent fetches of the
//! same key run once while other keys proceed. Invalidation bumps the slot's
//! generation; an entry stored under an older generation is never served.

use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

struct Entry {
    value: Arc<dyn Any + Send + Sync>,
    generation: u64,
    fetched_at: Instant,
}

#[derive(Default)]
struct Slot {
    entry: tokio::sync::Mutex<Option<Entry>>,
    generation: AtomicU64,
}

pub struct QueryCache {
    slots: Mutex<HashMap<String, Arc<Slot>>>,
    ttl: Option<Duration>,
}

impl QueryCache {
    /// `ttl` of `None` keeps entries until invalidated.
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    fn slot(&self, key: &str) -> Arc<Slot> {
        self.slots
            .lock()
            .entry(key.to_string())
            .or_default()
            .clone()
    }

    /// Cached value for `key`, or the result of `fetch`. A failed fetch is
    /// retried once before the error is returned.
    pub async fn get_or_fetch<T, E, F, Fut>(&self, key: &str, fetch: F) -> Result<Arc<T>, E>
    where
        T: Send + Sync + 'static,
        E: std::fmt::Display,
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let slot = self.slot(key);
        let mut entry = slot.entry.lock().await;
        let generation = slot.generation.load(Ordering::Acquire);

        if let Some(cached) = entry.as_ref() {
            let fresh = cached.generation == generation
                && self.ttl.map_or(true, |ttl| cached.fetched_at.elapsed() < ttl);
            if fresh {
                if let Ok(value) = cached.value.clone().downcast::<T>() {
                    tracing::debug!(key, "query cache hit");
                    return Ok(value);
                }
            }
        }

        let value = match fetch().await {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(key, error = %err, "query failed, retrying once");
                fetch().await?
            }
        };

        let value = Arc::new(value);
        *entry = Some(Entry {
            value: value.clone(),
            generation,
            fetched_at: Instant::now(),
        });
        Ok(value)
    }

    /// Mark `key` stale. Does not wait for a fetch in flight; its result
    /// is stored under the old generation and refetched on next read.
    pub fn invalidate(&self, key: &str) {
        if let Some(slot) = self.slots.lock().get(key) {
            slot.generation.fetch_add(1, Ordering::AcqRel);
            tracing::debug!(key, "query invalidated");
        }
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn test_concurrent_fetches_are_deduplicated() {
        let cache = Arc::new(QueryCache::default());
        let calls = Arc::new(AtomicUsize::new(0));

        let fetch = |cache: Arc<QueryCache>, calls: Arc<AtomicUsize>| async move {
            cache
                .get_or_fetch("items:u1", || {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok::<_, String>(vec![1, 2, 3])
                    }
                })
                .await
        };

        let (a, b) = tokio::join!(
            fetch(cache.clone(), calls.clone()),
            fetch(cache.clone(), calls.clone())
        );
        assert_eq!(*a.unwrap(), vec![1, 2, 3]);
        assert_eq!(*b.unwrap(), vec![1, 2, 3]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch() {
        let cache = QueryCache::default();
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let fetch = move || async move { Ok::<_, String>(calls.fetch_add(1, Ordering::SeqCst)) };

        assert_eq!(*cache.get_or_fetch("k", fetch).await.unwrap(), 0);
        assert_eq!(*cache.get_or_fetch("k", fetch).await.unwrap(), 0);

        cache.invalidate("k");
        assert_eq!(*cache.get_or_fetch("k", fetch).await.unwrap(), 1);

        // Other keys are untouched.
        cache.invalidate("other");
        assert_eq!(*cache.get_or_fetch("k", fetch).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failed_fetch_is_retried_once() {
        let cache = QueryCache::default();
        let counter = AtomicUsize::new(0);
        let calls = &counter;

        let flaky = move || async move {
            match calls.fetch_add(1, Ordering::SeqCst) {
                0 => Err("timeout".to_string()),
                n => Ok(n),
            }
        };
        assert_eq!(*cache.get_or_fetch("k", flaky).await.unwrap(), 1);

        let broken = || async { Err::<usize, _>("down".to_string()) };
        assert_eq!(cache.get_or_fetch("other", broken).await.unwrap_err(), "down");
    }

    #[tokio::test]
    async fn test_expired_entries_are_refetched() {
        let cache = QueryCache::new(Some(Duration::ZERO));
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let fetch = move || async move { Ok::<_, String>(calls.fetch_add(1, Ordering::SeqCst)) };

        cache.get_or_fetch("k", fetch).await.unwrap();
        cache.get_or_fetch("k", fetch).await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}
