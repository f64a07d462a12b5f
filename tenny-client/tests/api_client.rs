use axum::body::Bytes;
use axum::extract::{Query as Params, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::NaiveDate;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tenny_client::{
    ApiClient, ApiConfig, ApiError, AuthStatus, Query, Session, UploadFile, UploadFlow, UploadState,
};
use tenny_core::{Credentials, OcrEngine, TransactionFilters, TransactionForm};

const TOKEN: &str = "tok-1";

#[derive(Default)]
struct Backend {
    list_calls: AtomicUsize,
    /// When non-zero, the list endpoint pages through this many rows
    stored_rows: AtomicUsize,
    ocr_calls: AtomicUsize,
    fail_ocr: AtomicBool,
    created: Mutex<Option<Value>>,
    upload_body: Mutex<Vec<u8>>,
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == format!("Bearer {TOKEN}"))
        .unwrap_or(false)
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({"message": "invalid token"}))).into_response()
}

fn transaction(id: &str, amount: f64) -> Value {
    json!({
        "id": id,
        "amount": amount,
        "date": "2026-03-02",
        "merchant": "Corner Cafe",
        "category": "Food",
        "createdAt": "2026-03-02T10:00:00Z"
    })
}

async fn login(Json(body): Json<Value>) -> Response {
    if body["password"] != "secret" {
        return (StatusCode::UNAUTHORIZED, Json(json!({"message": "Invalid credentials"}))).into_response();
    }
    Json(json!({
        "token": TOKEN,
        "user": {"id": "u1", "email": body["email"], "name": "Ada"}
    }))
    .into_response()
}

async fn me(headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    Json(json!({"id": "u1", "email": "ada@example.com", "name": "Ada"})).into_response()
}

async fn list_transactions(
    State(b): State<Arc<Backend>>,
    Params(params): Params<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    b.list_calls.fetch_add(1, Ordering::SeqCst);
    let stored = b.stored_rows.load(Ordering::SeqCst);
    if stored > 0 {
        let num = |k: &str, default: usize| params.get(k).and_then(|v| v.parse().ok()).unwrap_or(default);
        let (page, limit) = (num("page", 1), num("limit", 10));
        let rows: Vec<Value> = (0..stored)
            .skip((page - 1) * limit)
            .take(limit)
            .map(|i| transaction(&format!("t{i}"), 1.0))
            .collect();
        return Json(json!({
            "transactions": rows,
            "total": stored,
            "page": page,
            "pages": stored.div_ceil(limit)
        }))
        .into_response();
    }
    Json(json!({
        "transactions": [transaction("t1", 4.5)],
        "total": 1,
        "page": 1,
        "pages": 1
    }))
    .into_response()
}

async fn create_transaction(
    State(b): State<Arc<Backend>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    let amount = body["amount"].as_f64().unwrap_or_default();
    *b.created.lock().unwrap() = Some(body);
    (StatusCode::CREATED, Json(transaction("t2", amount))).into_response()
}

async fn process(State(b): State<Arc<Backend>>, headers: HeaderMap, body: Bytes) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    b.ocr_calls.fetch_add(1, Ordering::SeqCst);
    *b.upload_body.lock().unwrap() = body.to_vec();
    if b.fail_ocr.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "").into_response();
    }
    Json(json!({
        "text": "CORNER CAFE\nTOTAL 12.50",
        "extractedData": {"total": 12.5, "merchant": "Corner Cafe", "date": null, "items": null},
        "confidence": 0.87,
        "processingTime": 412,
        "source": "tesseract"
    }))
    .into_response()
}

async fn spawn_backend() -> (Arc<Backend>, String) {
    let backend = Arc::new(Backend::default());
    let app = Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/me", get(me))
        .route("/api/transactions", get(list_transactions).post(create_transaction))
        .route("/api/ocr/process", post(process))
        .with_state(backend.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (backend, format!("http://{addr}"))
}

fn client_for(base_url: &str) -> ApiClient {
    let config = ApiConfig {
        base_url: base_url.to_string(),
        ..ApiConfig::default()
    };
    ApiClient::new(&config, Session::in_memory()).unwrap()
}

async fn signed_in(base_url: &str) -> ApiClient {
    let client = client_for(base_url);
    client
        .login(&Credentials {
            email: "ada@example.com".into(),
            password: "secret".into(),
        })
        .await
        .unwrap();
    client
}

fn receipt_png(len: usize) -> UploadFile {
    let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    bytes.resize(len, 7);
    UploadFile::new("receipt.png", "image/png", bytes)
}

#[tokio::test]
async fn test_login_stores_token_and_sends_bearer() {
    let (_, url) = spawn_backend().await;
    let client = signed_in(&url).await;

    assert_eq!(client.session().status(), AuthStatus::SignedIn);
    assert_eq!(client.session().token().as_deref(), Some(TOKEN));
    let me = client.me().await.unwrap();
    assert_eq!(me.name, "Ada");
}

#[tokio::test]
async fn test_bad_credentials_surface_backend_message() {
    let (_, url) = spawn_backend().await;
    let client = client_for(&url);
    let err = client
        .login(&Credentials {
            email: "ada@example.com".into(),
            password: "wrong".into(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.user_message(), "Invalid credentials");
    assert!(!client.session().is_signed_in());
}

#[tokio::test]
async fn test_bad_credentials_leave_existing_session_alone() {
    let (_, url) = spawn_backend().await;
    let client = signed_in(&url).await;
    let status = client.session().subscribe();

    let err = client
        .login(&Credentials {
            email: "ada@example.com".into(),
            password: "wrong".into(),
        })
        .await
        .unwrap_err();
    assert_eq!(err, ApiError::Rejected("Invalid credentials".into()));
    assert_eq!(client.session().token().as_deref(), Some(TOKEN));
    assert_eq!(*status.borrow(), AuthStatus::SignedIn);
    client.me().await.unwrap();
}

#[tokio::test]
async fn test_unauthorized_response_expires_session() {
    let (_, url) = spawn_backend().await;
    let client = client_for(&url);
    client.session().set_token("stale");
    let status = client.session().subscribe();

    let err = client.me().await.unwrap_err();
    assert_eq!(err, ApiError::Unauthorized);
    assert!(client.session().token().is_none());
    assert_eq!(*status.borrow(), AuthStatus::LoginRequired);
}

#[tokio::test]
async fn test_equal_queries_within_window_hit_backend_once() {
    let (backend, url) = spawn_backend().await;
    let client = signed_in(&url).await;
    let filters = TransactionFilters::recent(5);

    let a = Query::transactions(client.clone(), filters.clone());
    let b = Query::transactions(client.clone(), filters);
    let (ra, rb) = tokio::join!(a.load(), b.load());

    assert_eq!(ra.unwrap().transactions.len(), 1);
    assert_eq!(rb.unwrap().total, 1);
    assert_eq!(backend.list_calls.load(Ordering::SeqCst), 1);

    a.load().await.unwrap();
    assert_eq!(backend.list_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_full_scan_follows_every_page() {
    let (backend, url) = spawn_backend().await;
    backend.stored_rows.store(150, Ordering::SeqCst);
    let client = signed_in(&url).await;
    let today = NaiveDate::from_ymd_opt(2026, 3, 15).unwrap();

    let all = client
        .list_all_transactions(&TransactionFilters::current_month(today))
        .await
        .unwrap();
    assert_eq!(all.len(), 150);
    assert_eq!(all.iter().map(|t| t.amount).sum::<f64>(), 150.0);
    assert_eq!(all.last().unwrap().id, "t149");
    assert_eq!(backend.list_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_create_sends_numeric_amount_and_invalidates_lists() {
    let (backend, url) = spawn_backend().await;
    let client = signed_in(&url).await;
    let query = Query::transactions(client.clone(), TransactionFilters::new());
    query.load().await.unwrap();

    let mut form = TransactionForm::new(NaiveDate::from_ymd_opt(2026, 3, 2).unwrap());
    form.amount = "12.5".into();
    form.merchant = "Corner Cafe".into();
    form.category = "Food".into();
    let created = client.create_transaction(&form.submit().unwrap()).await.unwrap();
    assert_eq!(created.amount, 12.5);

    let sent = backend.created.lock().unwrap().clone().unwrap();
    assert_eq!(sent["amount"], json!(12.5));
    assert_eq!(sent["date"], "2026-03-02");
    assert!(sent.get("notes").is_none());

    query.load().await.unwrap();
    assert_eq!(backend.list_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_upload_sends_multipart_with_engine_and_reports_progress() {
    let (backend, url) = spawn_backend().await;
    let client = signed_in(&url).await;
    let mut flow = UploadFlow::default();
    flow.select(receipt_png(40 * 1024)).unwrap();
    let progress = flow.subscribe_progress();

    let result = flow.submit(&client, OcrEngine::Tesseract).await.unwrap();
    assert_eq!(result.confidence_percent(), 87);
    assert_eq!(result.extracted_data.total, Some(12.5));
    assert!(result.extracted_data.items.is_empty());
    assert_eq!(*progress.borrow(), 100);
    assert!(matches!(flow.state(), UploadState::Processed(_)));

    let body = String::from_utf8_lossy(&backend.upload_body.lock().unwrap()).into_owned();
    assert!(body.contains(r#"name="image"; filename="receipt.png""#));
    assert!(body.contains(r#"name="engine""#));
    assert!(body.contains("tesseract"));
}

#[tokio::test]
async fn test_failed_upload_keeps_file_for_retry() {
    let (backend, url) = spawn_backend().await;
    let client = signed_in(&url).await;
    backend.fail_ocr.store(true, Ordering::SeqCst);

    let mut flow = UploadFlow::default();
    flow.select(receipt_png(64)).unwrap();
    assert!(flow.submit(&client, OcrEngine::Hybrid).await.is_err());
    assert_eq!(flow.error(), Some("Failed to process the image"));
    assert!(flow.file().is_some());

    backend.fail_ocr.store(false, Ordering::SeqCst);
    flow.submit(&client, OcrEngine::Hybrid).await.unwrap();
    assert_eq!(backend.ocr_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_rejected_file_never_reaches_backend() {
    let (backend, url) = spawn_backend().await;
    let client = signed_in(&url).await;

    let mut flow = UploadFlow::default();
    let gif = UploadFile::new("receipt.gif", "image/gif", b"GIF89a....".to_vec());
    assert!(flow.select(gif).is_err());
    assert!(flow.submit(&client, OcrEngine::Hybrid).await.is_err());
    assert_eq!(*flow.state(), UploadState::Idle);
    assert_eq!(backend.ocr_calls.load(Ordering::SeqCst), 0);
}
