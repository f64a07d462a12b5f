//! Keyed response cache with request de-duplication.
//!
//! Keys are canonical strings (`endpoint?k=v&...`, see
//! `TransactionFilters::cache_key`). For one key at most one request is in
//! flight: later callers join it. A value younger than the dedupe interval is
//! served without a request. The map lock is never held across an await, so
//! different keys proceed independently.

use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::error::{ApiError, ApiResult};

pub const TRANSACTIONS_KEY: &str = "transactions";
pub const CATEGORIES_KEY: &str = "categories";

type Erased = Arc<dyn Any + Send + Sync>;
type InFlight = Shared<BoxFuture<'static, Result<Erased, ApiError>>>;

#[derive(Default)]
struct Entry {
    value: Option<Erased>,
    fetched_at: Option<Instant>,
    inflight: Option<(u64, InFlight)>,
}

#[derive(Default)]
pub struct QueryCache {
    entries: Mutex<HashMap<String, Entry>>,
    next_fetch: AtomicU64,
}

impl std::fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCache")
            .field("keys", &self.len())
            .finish()
    }
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Cached value for `key`, or the result of `fetcher`.
    ///
    /// `fetcher` is only called when nothing is in flight for the key and the
    /// cached value (if any) is older than `dedupe`.
    pub async fn fetch<T, F, Fut>(&self, key: &str, dedupe: Duration, fetcher: F) -> ApiResult<Arc<T>>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = ApiResult<T>> + Send + 'static,
    {
        let (id, fut) = {
            let mut map = self.lock();
            let entry = map.entry(key.to_string()).or_default();

            if let Some((id, fut)) = &entry.inflight {
                debug!(key, "joining in-flight request");
                (*id, fut.clone())
            } else {
                let fresh = entry
                    .fetched_at
                    .map(|at| at.elapsed() < dedupe)
                    .unwrap_or(false);
                if let (true, Some(v)) = (fresh, &entry.value) {
                    debug!(key, "served from cache");
                    return downcast(v.clone());
                }

                let id = self.next_fetch.fetch_add(1, Ordering::Relaxed);
                let request = fetcher();
                let fut: InFlight = async move { request.await.map(|v| Arc::new(v) as Erased) }
                    .boxed()
                    .shared();
                debug!(key, "fetching");
                entry.inflight = Some((id, fut.clone()));
                (id, fut)
            }
        };

        let result = fut.await;
        self.settle(key, id, &result);
        result.and_then(downcast)
    }

    // Record the outcome of fetch `id` unless it was superseded meanwhile.
    fn settle(&self, key: &str, id: u64, result: &Result<Erased, ApiError>) {
        let mut map = self.lock();
        let Some(entry) = map.get_mut(key) else {
            return;
        };
        if entry.inflight.as_ref().map(|(i, _)| *i) != Some(id) {
            return;
        }
        entry.inflight = None;
        // A failure keeps whatever was cached before.
        if let Ok(v) = result {
            entry.value = Some(v.clone());
            entry.fetched_at = Some(Instant::now());
        }
    }

    /// Current value without fetching
    pub fn peek<T: Send + Sync + 'static>(&self, key: &str) -> Option<Arc<T>> {
        let map = self.lock();
        let v = map.get(key)?.value.clone()?;
        downcast(v).ok()
    }

    /// Overwrite the cached value (optimistic local update).
    /// A request still in flight for the key will not overwrite it.
    pub fn set<T: Send + Sync + 'static>(&self, key: &str, value: Arc<T>) {
        let mut map = self.lock();
        let entry = map.entry(key.to_string()).or_default();
        entry.value = Some(value as Erased);
        entry.fetched_at = Some(Instant::now());
        entry.inflight = None;
    }

    /// Mark `key` stale; the next fetch goes to the network.
    pub fn invalidate(&self, key: &str) {
        if let Some(entry) = self.lock().get_mut(key) {
            entry.fetched_at = None;
            entry.inflight = None;
        }
    }

    /// Mark `endpoint` and every `endpoint?...` / `endpoint/...` key stale.
    pub fn invalidate_prefix(&self, endpoint: &str) {
        let mut map = self.lock();
        let mut n = 0;
        for (key, entry) in map.iter_mut() {
            let matches = key == endpoint
                || key
                    .strip_prefix(endpoint)
                    .map(|rest| rest.starts_with('?') || rest.starts_with('/'))
                    .unwrap_or(false);
            if matches {
                entry.fetched_at = None;
                entry.inflight = None;
                n += 1;
            }
        }
        debug!(endpoint, invalidated = n, "cache invalidated");
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn downcast<T: Send + Sync + 'static>(v: Erased) -> ApiResult<Arc<T>> {
    v.downcast::<T>()
        .map_err(|_| ApiError::Decode("cached value has a different type".to_string()))
}
