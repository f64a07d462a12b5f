//! Cached data queries for front-ends.
//!
//! A `Query<T>` is bound to one cache key. Loads go through the shared
//! `QueryCache`, so two queries on the same key within the dedupe window cost
//! one request. Every re-key bumps an epoch; a response that arrives for an
//! older epoch is dropped instead of overwriting newer state.

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tenny_core::{Category, Transaction, TransactionFilters, TransactionsPage};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::api::ApiClient;
use crate::cache::{CATEGORIES_KEY, TRANSACTIONS_KEY};
use crate::error::{ApiError, ApiResult};

pub const TRANSACTIONS_DEDUPE: Duration = Duration::from_secs(10);
pub const CATEGORIES_DEDUPE: Duration = Duration::from_secs(30);

pub type Fetcher<T> = Arc<dyn Fn(ApiClient) -> BoxFuture<'static, ApiResult<T>> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    pub dedupe_interval: Duration,
    pub revalidate_on_focus: bool,
}

impl QueryOptions {
    pub fn deduped(dedupe_interval: Duration) -> Self {
        Self {
            dedupe_interval,
            revalidate_on_focus: false,
        }
    }
}

#[derive(Debug)]
pub struct QueryState<T> {
    pub data: Option<Arc<T>>,
    pub is_loading: bool,
    pub error: Option<ApiError>,
}

/// Nothing fetched yet, so loading
impl<T> Default for QueryState<T> {
    fn default() -> Self {
        Self {
            data: None,
            is_loading: true,
            error: None,
        }
    }
}

impl<T> Clone for QueryState<T> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            is_loading: self.is_loading,
            error: self.error.clone(),
        }
    }
}

struct Slot<T> {
    key: String,
    fetcher: Fetcher<T>,
    state: QueryState<T>,
}

pub struct Query<T> {
    client: ApiClient,
    options: QueryOptions,
    inner: Arc<Mutex<Slot<T>>>,
    epoch: Arc<AtomicU64>,
}

impl<T: Send + Sync + 'static> Query<T> {
    pub fn new(client: ApiClient, key: impl Into<String>, options: QueryOptions, fetcher: Fetcher<T>) -> Self {
        Self {
            client,
            options,
            inner: Arc::new(Mutex::new(Slot {
                key: key.into(),
                fetcher,
                state: QueryState::default(),
            })),
            epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }

    fn lock(&self) -> MutexGuard<'_, Slot<T>> {
        lock(&self.inner)
    }

    pub fn key(&self) -> String {
        self.lock().key.clone()
    }

    pub fn options(&self) -> QueryOptions {
        self.options
    }

    /// Snapshot of data, loading flag and last error
    pub fn state(&self) -> QueryState<T> {
        self.lock().state.clone()
    }

    pub fn data(&self) -> Option<Arc<T>> {
        self.lock().state.data.clone()
    }

    /// Fetch (or join / reuse) the value for the current key
    pub async fn load(&self) -> ApiResult<Arc<T>> {
        self.load_within(self.options.dedupe_interval).await
    }

    /// Fetch ignoring the dedupe window
    pub async fn revalidate(&self) -> ApiResult<Arc<T>> {
        self.load_within(Duration::ZERO).await
    }

    /// Window regained focus; only refetches when the query opted in
    pub async fn focus(&self) -> Option<ApiResult<Arc<T>>> {
        if !self.options.revalidate_on_focus {
            return None;
        }
        Some(self.revalidate().await)
    }

    async fn load_within(&self, dedupe: Duration) -> ApiResult<Arc<T>> {
        let (key, fetcher, epoch) = self.begin();
        let client = self.client.clone();
        let result = self
            .client
            .cache()
            .fetch(&key, dedupe, move || fetcher(client))
            .await;
        finish(&self.inner, &self.epoch, epoch, &result);
        result
    }

    fn begin(&self) -> (String, Fetcher<T>, u64) {
        let mut inner = self.lock();
        inner.state.is_loading = true;
        let epoch = self.epoch.load(Ordering::SeqCst);
        (inner.key.clone(), inner.fetcher.clone(), epoch)
    }

    /// Load on a background task. The result is discarded if this query was
    /// dropped or re-keyed before it arrived.
    pub fn spawn_load(&self) -> JoinHandle<()> {
        let (key, fetcher, epoch) = self.begin();
        let client = self.client.clone();
        let dedupe = self.options.dedupe_interval;
        let weak: Weak<Mutex<Slot<T>>> = Arc::downgrade(&self.inner);
        let epochs = self.epoch.clone();

        tokio::spawn(async move {
            let fetch_client = client.clone();
            let result = client
                .cache()
                .fetch(&key, dedupe, move || fetcher(fetch_client))
                .await;
            match weak.upgrade() {
                Some(inner) => finish(&inner, &epochs, epoch, &result),
                None => debug!(key = %key, "query dropped; discarding response"),
            }
        })
    }

    /// Local update applied immediately and written through to the cache.
    /// The next load past the dedupe window still reconciles with the server.
    pub fn mutate(&self, f: impl FnOnce(&mut T))
    where
        T: Clone,
    {
        let epoch = self.epoch.load(Ordering::SeqCst);
        let Some(mut next) = self.lock().state.data.as_deref().cloned() else {
            return;
        };
        // `f` runs unlocked so it may read this query.
        f(&mut next);

        let mut inner = self.lock();
        if self.epoch.load(Ordering::SeqCst) != epoch {
            debug!(key = %inner.key, "query re-keyed during mutate; dropping update");
            return;
        }
        let next = Arc::new(next);
        self.client.cache().set(&inner.key, next.clone());
        inner.state.data = Some(next);
    }

    /// Point the query at a different key. In-flight results for the old key
    /// will be ignored; cached data for the new key is shown straight away.
    pub fn rekey(&self, key: impl Into<String>, fetcher: Fetcher<T>) {
        let key = key.into();
        self.epoch.fetch_add(1, Ordering::SeqCst);
        let cached = self.client.cache().peek::<T>(&key);
        let mut inner = self.lock();
        inner.key = key;
        inner.fetcher = fetcher;
        inner.state = QueryState {
            is_loading: cached.is_none(),
            data: cached,
            error: None,
        };
    }
}

fn lock<T>(inner: &Mutex<Slot<T>>) -> MutexGuard<'_, Slot<T>> {
    inner.lock().unwrap_or_else(|e| e.into_inner())
}

fn finish<T>(inner: &Mutex<Slot<T>>, epochs: &AtomicU64, epoch: u64, result: &ApiResult<Arc<T>>) {
    let mut inner = lock(inner);
    if epochs.load(Ordering::SeqCst) != epoch {
        debug!(key = %inner.key, "stale response discarded");
        return;
    }
    inner.state.is_loading = false;
    match result {
        Ok(v) => {
            inner.state.data = Some(v.clone());
            inner.state.error = None;
        }
        // Keep showing the last good data alongside the error.
        Err(e) => inner.state.error = Some(e.clone()),
    }
}

fn transactions_fetcher(filters: TransactionFilters) -> Fetcher<TransactionsPage> {
    Arc::new(move |client: ApiClient| {
        let filters = filters.clone();
        async move { client.list_transactions(&filters).await }.boxed()
    })
}

pub fn transaction_key(id: &str) -> String {
    format!("{TRANSACTIONS_KEY}/{id}")
}

impl Query<TransactionsPage> {
    /// Paged transaction list for `filters`
    pub fn transactions(client: ApiClient, filters: TransactionFilters) -> Self {
        let key = filters.cache_key(TRANSACTIONS_KEY);
        Self::new(
            client,
            key,
            QueryOptions::deduped(TRANSACTIONS_DEDUPE),
            transactions_fetcher(filters),
        )
    }

    pub fn set_filters(&self, filters: TransactionFilters) {
        self.rekey(filters.cache_key(TRANSACTIONS_KEY), transactions_fetcher(filters));
    }
}

impl Query<Transaction> {
    pub fn transaction(client: ApiClient, id: impl Into<String>) -> Self {
        let id = id.into();
        let key = transaction_key(&id);
        Self::new(
            client,
            key,
            QueryOptions::deduped(TRANSACTIONS_DEDUPE),
            Arc::new(move |client: ApiClient| {
                let id = id.clone();
                async move { client.get_transaction(&id).await }.boxed()
            }),
        )
    }
}

impl Query<Vec<Category>> {
    pub fn categories(client: ApiClient) -> Self {
        Self::new(
            client,
            CATEGORIES_KEY,
            QueryOptions::deduped(CATEGORIES_DEDUPE),
            Arc::new(|client: ApiClient| async move { client.list_categories().await }.boxed()),
        )
    }
}
