//! Local forwarding proxy for browser front-ends.
//!
//! `/api/proxy/<path>` goes to `<target>/<path>` and `/api/ocr/<path>` goes
//! to `<target>/api/ocr/<path>`. Method, query, body and end-to-end headers
//! pass through unchanged in both directions.

use anyhow::{Context, Result};
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderName, StatusCode, header};
use axum::response::{IntoResponse, Response};
use reqwest::Url;
use tracing::{debug, info, warn};

const PROXY_PREFIX: &str = "/api/proxy";
const OCR_PREFIX: &str = "/api/ocr";
const MAX_BODY: usize = 16 * 1024 * 1024;

const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    header::HOST,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

#[derive(Clone)]
struct ProxyState {
    http: reqwest::Client,
    target: Url,
}

/// Backend path for an incoming request path, or `None` if it is not proxied
pub fn rewrite_path(path: &str) -> Option<String> {
    if let Some(rest) = path.strip_prefix(PROXY_PREFIX) {
        return match rest {
            "" => Some("/".to_string()),
            r if r.starts_with('/') => Some(r.to_string()),
            _ => None,
        };
    }
    let rest = path.strip_prefix(OCR_PREFIX)?;
    (rest.is_empty() || rest.starts_with('/')).then(|| path.to_string())
}

/// `path` appended to the target's own base path
pub fn upstream_url(target: &Url, path: &str, query: Option<&str>) -> Url {
    let mut url = target.clone();
    let base = target.path().trim_end_matches('/');
    url.set_path(&format!("{base}{path}"));
    url.set_query(query);
    url
}

fn forwardable(headers: &HeaderMap) -> HeaderMap {
    let mut out = headers.clone();
    for name in HOP_BY_HOP.iter().chain([&header::CONTENT_LENGTH]) {
        out.remove(name);
    }
    out.remove("keep-alive");
    out
}

pub fn router(target: Url) -> Router {
    let state = ProxyState {
        http: reqwest::Client::new(),
        target,
    };
    Router::new().fallback(forward).with_state(state)
}

async fn forward(State(state): State<ProxyState>, req: Request) -> Response {
    let Some(path) = rewrite_path(req.uri().path()) else {
        return (StatusCode::NOT_FOUND, "not a proxied route").into_response();
    };
    let url = upstream_url(&state.target, &path, req.uri().query());
    let (parts, body) = req.into_parts();

    let body = match to_bytes(body, MAX_BODY).await {
        Ok(b) => b,
        Err(e) => return (StatusCode::PAYLOAD_TOO_LARGE, e.to_string()).into_response(),
    };

    debug!(method = %parts.method, %url, "forwarding");
    let upstream = state
        .http
        .request(parts.method, url.clone())
        .headers(forwardable(&parts.headers))
        .body(body)
        .send()
        .await;

    let resp = match upstream {
        Ok(r) => r,
        Err(e) => {
            warn!(%url, "upstream unreachable: {e}");
            return (StatusCode::BAD_GATEWAY, format!("upstream error: {e}")).into_response();
        }
    };

    let status = resp.status();
    let headers = forwardable(resp.headers());
    match resp.bytes().await {
        Ok(bytes) => {
            let mut out = Response::new(Body::from(bytes));
            *out.status_mut() = status;
            *out.headers_mut() = headers;
            out
        }
        Err(e) => {
            warn!(%url, "upstream body failed: {e}");
            (StatusCode::BAD_GATEWAY, format!("upstream error: {e}")).into_response()
        }
    }
}

pub async fn serve(listen: &str, target: &str) -> Result<()> {
    let target = Url::parse(target).with_context(|| format!("invalid proxy target '{target}'"))?;
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .with_context(|| format!("bind {listen}"))?;
    info!(listen, %target, "proxy listening");
    println!("Proxying http://{listen}{PROXY_PREFIX}/* and {OCR_PREFIX}/* -> {target}");
    axum::serve(listener, router(target)).await.context("proxy server")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;
    use axum::http::{Method, Uri};
    use serde_json::{Value, json};

    #[test]
    fn test_rewrite_path() {
        assert_eq!(rewrite_path("/api/proxy/api/transactions").as_deref(), Some("/api/transactions"));
        assert_eq!(rewrite_path("/api/proxy").as_deref(), Some("/"));
        assert_eq!(rewrite_path("/api/proxyx/a"), None);
        assert_eq!(rewrite_path("/api/ocr/process").as_deref(), Some("/api/ocr/process"));
        assert_eq!(rewrite_path("/api/transactions"), None);
    }

    #[test]
    fn test_upstream_url_keeps_target_base() {
        let target = Url::parse("http://backend:8080/v1/").unwrap();
        let url = upstream_url(&target, "/api/ocr/process", Some("engine=google"));
        assert_eq!(url.as_str(), "http://backend:8080/v1/api/ocr/process?engine=google");

        let target = Url::parse("http://backend:8080").unwrap();
        assert_eq!(upstream_url(&target, "/health", None).as_str(), "http://backend:8080/health");
    }

    async fn echo(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Response {
        let mut resp = axum::Json(json!({
            "method": method.as_str(),
            "path": uri.path(),
            "query": uri.query(),
            "auth": headers.get("authorization").and_then(|v| v.to_str().ok()),
            "body": String::from_utf8_lossy(&body),
        }))
        .into_response();
        *resp.status_mut() = StatusCode::CREATED;
        resp.headers_mut().insert("x-upstream", "yes".parse().unwrap());
        resp
    }

    async fn spawn(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_forwards_method_query_body_and_headers() {
        let upstream = spawn(Router::new().fallback(echo)).await;
        let proxy = spawn(router(Url::parse(&upstream).unwrap())).await;

        let resp = reqwest::Client::new()
            .put(format!("{proxy}/api/proxy/api/transactions/t1?x=1"))
            .bearer_auth("tok")
            .body("{\"amount\":3}")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        assert_eq!(resp.headers().get("x-upstream").unwrap(), "yes");

        let v: Value = resp.json().await.unwrap();
        assert_eq!(v["method"], "PUT");
        assert_eq!(v["path"], "/api/transactions/t1");
        assert_eq!(v["query"], "x=1");
        assert_eq!(v["auth"], "Bearer tok");
        assert_eq!(v["body"], "{\"amount\":3}");
    }

    #[tokio::test]
    async fn test_ocr_path_is_not_stripped() {
        let upstream = spawn(Router::new().fallback(echo)).await;
        let proxy = spawn(router(Url::parse(&upstream).unwrap())).await;

        let v: Value = reqwest::Client::new()
            .post(format!("{proxy}/api/ocr/process"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(v["path"], "/api/ocr/process");
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_bad_gateway() {
        let proxy = spawn(router(Url::parse("http://127.0.0.1:1").unwrap())).await;
        let resp = reqwest::get(format!("{proxy}/api/proxy/health")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);

        let resp = reqwest::get(format!("{proxy}/elsewhere")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
