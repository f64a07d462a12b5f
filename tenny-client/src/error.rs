//! Error taxonomy for backend calls.

use reqwest::StatusCode;
use thiserror::Error;

/// Anything that can go wrong talking to the backend.
///
/// `Clone` so one failed request can be handed to every caller that was
/// waiting on it.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ApiError {
    #[error("network error: {0}")]
    Transport(String),
    #[error("request timed out")]
    Timeout,
    /// Session expired or token rejected; the session has already been cleared
    #[error("not signed in (session expired)")]
    Unauthorized,
    /// Login or registration refused; the session is untouched
    #[error("credentials rejected: {0}")]
    Rejected(String),
    #[error("invalid request ({status}): {message}")]
    Validation { status: u16, message: String },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("{0}")]
    InvalidFile(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    /// Map a non-2xx response onto the taxonomy. 401 is handled by the caller.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let message = extract_message(body);
        let code = status.as_u16();
        match code {
            401 => ApiError::Unauthorized,
            400 | 422 => ApiError::Validation { status: code, message },
            404 => ApiError::NotFound(message),
            500..=599 => ApiError::Server { status: code, message },
            _ => ApiError::Status { status: code, message },
        }
    }

    /// 401 from the credential exchange, carrying the backend's message
    pub fn rejected(body: &str) -> Self {
        ApiError::Rejected(extract_message(body))
    }

    /// Text suitable for showing to the user
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Transport(_) | ApiError::Timeout => {
                "Could not reach the server. Check your connection and try again.".to_string()
            }
            ApiError::Unauthorized => "Your session has expired. Please log in again.".to_string(),
            ApiError::Validation { message, .. } | ApiError::Server { message, .. } | ApiError::Status { message, .. }
                if !message.is_empty() =>
            {
                message.clone()
            }
            ApiError::Rejected(msg) if !msg.is_empty() => msg.clone(),
            ApiError::Rejected(_) => "Invalid credentials".to_string(),
            ApiError::NotFound(what) if !what.is_empty() => what.clone(),
            ApiError::NotFound(_) => "Not found.".to_string(),
            ApiError::InvalidFile(msg) => msg.clone(),
            other => other.to_string(),
        }
    }

    /// Message for a failed OCR upload
    pub fn upload_message(&self) -> String {
        match self {
            ApiError::Validation { message, .. }
            | ApiError::Server { message, .. }
            | ApiError::Status { message, .. }
                if !message.is_empty() =>
            {
                message.clone()
            }
            ApiError::Validation { .. } | ApiError::Server { .. } | ApiError::Status { .. } | ApiError::NotFound(_) => {
                "Failed to process the image".to_string()
            }
            ApiError::Unauthorized | ApiError::InvalidFile(_) => self.user_message(),
            _ => "An unexpected error occurred during upload".to_string(),
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ApiError::Timeout
        } else if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else {
            ApiError::Transport(e.to_string())
        }
    }
}

/// Prefer the JSON `message`/`error` field; fall back to the raw body.
fn extract_message(body: &str) -> String {
    if let Ok(v) = serde_json::from_str::<serde_json::Value>(body) {
        for field in ["message", "error"] {
            if let Some(m) = v.get(field).and_then(|m| m.as_str()) {
                return m.to_string();
            }
        }
    }
    body.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::from_status(StatusCode::BAD_REQUEST, r#"{"message":"amount required"}"#),
            ApiError::Validation { status: 400, message: "amount required".into() }
        );
        assert_eq!(
            ApiError::from_status(StatusCode::NOT_FOUND, r#"{"error":"no such transaction"}"#),
            ApiError::NotFound("no such transaction".into())
        );
        assert_eq!(
            ApiError::from_status(StatusCode::BAD_GATEWAY, "upstream down"),
            ApiError::Server { status: 502, message: "upstream down".into() }
        );
        assert_eq!(
            ApiError::from_status(StatusCode::CONFLICT, ""),
            ApiError::Status { status: 409, message: String::new() }
        );
        assert!(ApiError::from_status(StatusCode::UNAUTHORIZED, "").is_unauthorized());
    }

    #[test]
    fn test_rejected_credentials_keep_backend_message() {
        let e = ApiError::rejected(r#"{"message":"Wrong email or password"}"#);
        assert_eq!(e.user_message(), "Wrong email or password");
        assert!(!e.is_unauthorized());
        assert_eq!(ApiError::rejected("").user_message(), "Invalid credentials");
    }

    #[test]
    fn test_upload_messages() {
        let e = ApiError::Server { status: 500, message: String::new() };
        assert_eq!(e.upload_message(), "Failed to process the image");

        let e = ApiError::Validation { status: 400, message: "No image file found in the request".into() };
        assert_eq!(e.upload_message(), "No image file found in the request");

        assert_eq!(
            ApiError::Transport("connection refused".into()).upload_message(),
            "An unexpected error occurred during upload"
        );
    }

    #[test]
    fn test_user_message_never_empty() {
        let errors = [
            ApiError::Transport("x".into()),
            ApiError::Timeout,
            ApiError::Unauthorized,
            ApiError::Validation { status: 422, message: String::new() },
            ApiError::NotFound(String::new()),
            ApiError::Decode("bad json".into()),
            ApiError::rejected(""),
        ];
        for e in errors {
            assert!(!e.user_message().is_empty(), "{e:?}");
        }
    }
}
