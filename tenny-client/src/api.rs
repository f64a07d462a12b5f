//! Typed client for the Tenny backend HTTP API.
//!
//! One method per endpoint. The bearer token comes from the `Session`; a 401
//! answer expires the session before the error reaches the caller. There is
//! no retry policy: failures are returned as-is.

use chrono::NaiveDate;
use futures_util::stream;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Method, RequestBuilder, Response, StatusCode, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tenny_core::time::to_iso_date;
use tenny_core::{
    AuthResponse, Category, CategoryPatch, Credentials, NewCategory, NewTransaction, OcrEngine,
    OcrResult, Registration, Transaction, TransactionFilters, TransactionPatch, TransactionsPage,
    User, UserPatch,
};
use tracing::{debug, warn};

use crate::cache::{CATEGORIES_KEY, QueryCache, TRANSACTIONS_KEY};
use crate::error::{ApiError, ApiResult};
use crate::session::Session;
use crate::upload::UploadFile;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// OCR runs on the backend while the request is open
pub const OCR_TIMEOUT: Duration = Duration::from_secs(120);

/// Page size for scans that need every matching transaction
pub const SCAN_PAGE_SIZE: u64 = 100;

/// Body chunk size used to report upload progress
const UPLOAD_CHUNK: usize = 16 * 1024;

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Query parameters of `GET /api/users`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserFilters {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub search: Option<String>,
}

impl UserFilters {
    fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(l) = self.limit {
            pairs.push(("limit", l.to_string()));
        }
        if let Some(p) = self.page {
            pairs.push(("page", p.to_string()));
        }
        if let Some(s) = self.search.as_deref().filter(|s| !s.trim().is_empty()) {
            pairs.push(("search", s.trim().to_string()));
        }
        pairs
    }
}

/// Cheap to clone; clones share the HTTP pool, session and cache.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    session: Session,
    cache: Arc<QueryCache>,
}

impl ApiClient {
    pub fn new(config: &ApiConfig, session: Session) -> ApiResult<Self> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| ApiError::Transport(format!("invalid base URL '{}': {e}", config.base_url)))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::Transport(format!(
                "invalid base URL '{}'",
                config.base_url
            )));
        }
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(ApiError::from)?;

        Ok(Self {
            http,
            base_url,
            session,
            cache: Arc::new(QueryCache::new()),
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `base/api/<segments...>`, each segment percent-encoded
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().push("api").extend(segments);
        }
        url
    }

    fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        let url = self.url(segments);
        debug!(%method, %url, "request");
        let req = self.http.request(method, url);
        match self.session.token() {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn send(&self, req: RequestBuilder) -> ApiResult<Response> {
        self.dispatch(req, true).await
    }

    /// A 401 on login/register means bad credentials, not a dead session
    async fn dispatch(&self, req: RequestBuilder, expire_on_401: bool) -> ApiResult<Response> {
        let resp = req.send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        if status == StatusCode::UNAUTHORIZED {
            if !expire_on_401 {
                let body = resp.text().await.unwrap_or_default();
                return Err(ApiError::rejected(&body));
            }
            self.session.expire();
            return Err(ApiError::Unauthorized);
        }

        let body = resp.text().await.unwrap_or_default();
        if status.is_server_error() {
            warn!(%status, "backend error: {}", body);
        }
        Err(ApiError::from_status(status, &body))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, String)],
    ) -> ApiResult<T> {
        let resp = self.send(self.request(Method::GET, segments).query(query)).await?;
        Ok(resp.json().await?)
    }

    async fn exchange_credentials<B: Serialize + ?Sized>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> ApiResult<AuthResponse> {
        let req = self.request(Method::POST, segments).json(body);
        let auth: AuthResponse = self.dispatch(req, false).await?.json().await?;
        self.session.set_token(&auth.token);
        Ok(auth)
    }

    async fn send_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        segments: &[&str],
        body: &B,
    ) -> ApiResult<T> {
        let resp = self.send(self.request(method, segments).json(body)).await?;
        Ok(resp.json().await?)
    }

    async fn delete(&self, segments: &[&str]) -> ApiResult<()> {
        self.send(self.request(Method::DELETE, segments)).await?;
        Ok(())
    }

    // --- auth ---

    /// POST /api/auth/register; stores the returned token
    pub async fn register(&self, registration: &Registration) -> ApiResult<AuthResponse> {
        self.exchange_credentials(&["auth", "register"], registration).await
    }

    /// POST /api/auth/login; stores the returned token
    pub async fn login(&self, credentials: &Credentials) -> ApiResult<AuthResponse> {
        self.exchange_credentials(&["auth", "login"], credentials).await
    }

    /// Local only: forget the token and everything cached for this user
    pub fn logout(&self) {
        self.session.clear();
        self.cache.invalidate_prefix(TRANSACTIONS_KEY);
        self.cache.invalidate_prefix(CATEGORIES_KEY);
    }

    /// GET /api/auth/me
    pub async fn me(&self) -> ApiResult<User> {
        self.get_json(&["auth", "me"], &[]).await
    }

    // --- ocr ---

    /// POST /api/ocr/process as multipart (`image` file, optional `engine`).
    ///
    /// `on_progress` receives the percentage of body bytes handed to the
    /// connection, `round(sent * 100 / total)`.
    pub async fn process_image(
        &self,
        file: &UploadFile,
        engine: Option<OcrEngine>,
        on_progress: impl Fn(u8) + Send + Sync + 'static,
    ) -> ApiResult<OcrResult> {
        let total = file.bytes.len() as u64;
        let chunks: Vec<Vec<u8>> = file.bytes.chunks(UPLOAD_CHUNK).map(<[u8]>::to_vec).collect();

        on_progress(0);
        let mut sent = 0u64;
        let body = stream::iter(chunks.into_iter().map(move |chunk| {
            sent += chunk.len() as u64;
            on_progress(progress_percent(sent, total));
            Ok::<_, std::io::Error>(chunk)
        }));

        let part = Part::stream_with_length(Body::wrap_stream(body), total)
            .file_name(file.name.clone())
            .mime_str(&file.mime)
            .map_err(|e| ApiError::InvalidFile(format!("bad content type '{}': {e}", file.mime)))?;

        let mut form = Form::new().part("image", part);
        if let Some(engine) = engine {
            form = form.text("engine", engine.as_str());
        }

        let resp = self
            .send(
                self.request(Method::POST, &["ocr", "process"])
                    .timeout(OCR_TIMEOUT)
                    .multipart(form),
            )
            .await?;
        Ok(resp.json().await?)
    }

    // --- transactions ---

    /// GET /api/transactions
    pub async fn list_transactions(&self, filters: &TransactionFilters) -> ApiResult<TransactionsPage> {
        self.get_json(&["transactions"], &filters.query_pairs()).await
    }

    /// Every transaction matching `filters`, following `pages` to the end.
    /// `page` and `limit` on `filters` are overridden.
    pub async fn list_all_transactions(&self, filters: &TransactionFilters) -> ApiResult<Vec<Transaction>> {
        let mut out = Vec::new();
        let mut page = 1;
        loop {
            let scan = filters.clone().with_page(page).with_limit(SCAN_PAGE_SIZE);
            let resp = self.list_transactions(&scan).await?;
            let done = resp.transactions.is_empty() || page >= resp.pages;
            out.extend(resp.transactions);
            if done {
                debug!(pages = page, rows = out.len(), "transaction scan complete");
                return Ok(out);
            }
            page += 1;
        }
    }

    /// GET /api/transactions/:id
    pub async fn get_transaction(&self, id: &str) -> ApiResult<Transaction> {
        self.get_json(&["transactions", id], &[]).await
    }

    /// POST /api/transactions
    pub async fn create_transaction(&self, txn: &NewTransaction) -> ApiResult<Transaction> {
        let created = self
            .send_json(Method::POST, &["transactions"], txn)
            .await?;
        self.cache.invalidate_prefix(TRANSACTIONS_KEY);
        Ok(created)
    }

    /// PUT /api/transactions/:id
    pub async fn update_transaction(&self, id: &str, patch: &TransactionPatch) -> ApiResult<Transaction> {
        let updated = self
            .send_json(Method::PUT, &["transactions", id], patch)
            .await?;
        self.cache.invalidate_prefix(TRANSACTIONS_KEY);
        Ok(updated)
    }

    /// DELETE /api/transactions/:id
    pub async fn delete_transaction(&self, id: &str) -> ApiResult<()> {
        self.delete(&["transactions", id]).await?;
        self.cache.invalidate_prefix(TRANSACTIONS_KEY);
        Ok(())
    }

    // --- categories ---

    /// GET /api/categories (a bare array)
    pub async fn list_categories(&self) -> ApiResult<Vec<Category>> {
        self.get_json(&["categories"], &[]).await
    }

    pub async fn get_category(&self, id: &str) -> ApiResult<Category> {
        self.get_json(&["categories", id], &[]).await
    }

    pub async fn create_category(&self, category: &NewCategory) -> ApiResult<Category> {
        let created = self
            .send_json(Method::POST, &["categories"], category)
            .await?;
        self.cache.invalidate_prefix(CATEGORIES_KEY);
        Ok(created)
    }

    pub async fn update_category(&self, id: &str, patch: &CategoryPatch) -> ApiResult<Category> {
        let updated = self
            .send_json(Method::PUT, &["categories", id], patch)
            .await?;
        self.cache.invalidate_prefix(CATEGORIES_KEY);
        Ok(updated)
    }

    pub async fn delete_category(&self, id: &str) -> ApiResult<()> {
        self.delete(&["categories", id]).await?;
        self.cache.invalidate_prefix(CATEGORIES_KEY);
        Ok(())
    }

    // --- users ---

    pub async fn list_users(&self, filters: &UserFilters) -> ApiResult<Vec<User>> {
        self.get_json(&["users"], &filters.query_pairs()).await
    }

    pub async fn get_user(&self, id: &str) -> ApiResult<User> {
        self.get_json(&["users", id], &[]).await
    }

    pub async fn create_user(&self, registration: &Registration) -> ApiResult<User> {
        self.send_json(Method::POST, &["users"], registration).await
    }

    pub async fn update_user(&self, id: &str, patch: &UserPatch) -> ApiResult<User> {
        self.send_json(Method::PUT, &["users", id], patch).await
    }

    pub async fn delete_user(&self, id: &str) -> ApiResult<()> {
        self.delete(&["users", id]).await
    }

    /// GET /api/users/profile
    pub async fn profile(&self) -> ApiResult<User> {
        self.get_json(&["users", "profile"], &[]).await
    }

    /// PUT /api/users/profile
    pub async fn update_profile(&self, patch: &UserPatch) -> ApiResult<User> {
        self.send_json(Method::PUT, &["users", "profile"], patch).await
    }

    // --- reports (shape decided by the backend) ---

    pub async fn spending_by_category(&self, start: NaiveDate, end: NaiveDate) -> ApiResult<serde_json::Value> {
        let query = [("startDate", to_iso_date(start)), ("endDate", to_iso_date(end))];
        self.get_json(&["reports", "spending-by-category"], &query).await
    }

    pub async fn monthly_spending(&self, year: i32) -> ApiResult<serde_json::Value> {
        self.get_json(&["reports", "monthly-spending"], &[("year", year.to_string())])
            .await
    }

    pub async fn transaction_trends(&self, period: &str) -> ApiResult<serde_json::Value> {
        self.get_json(&["reports", "transaction-trends"], &[("period", period.to_string())])
            .await
    }
}

/// `round(sent * 100 / total)`, 100 for an empty body
pub fn progress_percent(sent: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let pct = (sent.min(total) as f64 * 100.0 / total as f64).round();
    pct as u8
}
