//! Bill upload: file selection, local preview, OCR submission.
//!
//! States: `Idle -> Selected -> Uploading -> Processed | Failed`.
//! Selection is fully local; only `submit` touches the network, and only
//! with a file that passed the `UploadPolicy`.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use std::path::Path;
use std::sync::Arc;
use tenny_core::{OcrEngine, OcrResult};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::api::ApiClient;
use crate::error::{ApiError, ApiResult};

pub const MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

pub const MIME_JPEG: &str = "image/jpeg";
pub const MIME_PNG: &str = "image/png";
pub const MIME_PDF: &str = "application/pdf";

/// A file picked by the user, fully read into memory
#[derive(Debug, Clone, PartialEq)]
pub struct UploadFile {
    pub name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
            bytes,
        }
    }

    /// Read a file; the content type comes from its magic bytes, else its extension.
    pub fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let mime = sniff_mime(&bytes)
            .or_else(|| mime_from_name(&name))
            .unwrap_or("application/octet-stream");
        Ok(Self::new(name, mime, bytes))
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// Content type from the leading bytes
pub fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some(MIME_JPEG)
    } else if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        Some(MIME_PNG)
    } else if bytes.starts_with(b"%PDF") {
        Some(MIME_PDF)
    } else {
        None
    }
}

/// Content type from the file extension
pub fn mime_from_name(name: &str) -> Option<&'static str> {
    let ext = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some(MIME_JPEG),
        "png" => Some(MIME_PNG),
        "pdf" => Some(MIME_PDF),
        _ => None,
    }
}

/// Why a file was refused before upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    TooLarge { size: usize, max: usize },
    InvalidType(String),
    Empty,
}

impl Rejection {
    pub fn message(&self) -> String {
        match self {
            Rejection::TooLarge { max, .. } => format!(
                "File is too large. Max size is {}MB",
                *max as f64 / 1024.0 / 1024.0
            ),
            Rejection::InvalidType(_) => {
                "Invalid file type. Please upload an image (JPEG, PNG) or PDF.".to_string()
            }
            Rejection::Empty => "Error uploading file. Please try again.".to_string(),
        }
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message())
    }
}

impl std::error::Error for Rejection {}

#[derive(Debug, Error)]
pub enum OpenError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Rejected(#[from] Rejection),
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadPolicy {
    pub max_bytes: usize,
    pub accepted: Vec<String>,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_bytes: MAX_UPLOAD_BYTES,
            accepted: vec![MIME_JPEG.into(), MIME_PNG.into(), MIME_PDF.into()],
        }
    }
}

impl UploadPolicy {
    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn check(&self, file: &UploadFile) -> Result<(), Rejection> {
        if !self.accepted.iter().any(|m| m.eq_ignore_ascii_case(&file.mime)) {
            return Err(Rejection::InvalidType(file.mime.clone()));
        }
        if file.bytes.is_empty() {
            return Err(Rejection::Empty);
        }
        if file.size() > self.max_bytes {
            return Err(Rejection::TooLarge {
                size: file.size(),
                max: self.max_bytes,
            });
        }
        Ok(())
    }

    /// Read `path` for upload. Oversized files are refused from their
    /// metadata without reading the contents.
    pub fn read(&self, path: impl AsRef<Path>) -> Result<UploadFile, OpenError> {
        let path = path.as_ref();
        let size = usize::try_from(std::fs::metadata(path)?.len()).unwrap_or(usize::MAX);
        if size > self.max_bytes {
            return Err(Rejection::TooLarge {
                size,
                max: self.max_bytes,
            }
            .into());
        }
        Ok(UploadFile::from_path(path)?)
    }
}

/// Local rendition of the selected file
#[derive(Debug, Clone, PartialEq)]
pub struct Preview {
    pub name: String,
    pub mime: String,
    pub size: usize,
    /// `data:<mime>;base64,...`
    pub data_url: String,
}

impl Preview {
    pub fn of(file: &UploadFile) -> Self {
        Self {
            name: file.name.clone(),
            mime: file.mime.clone(),
            size: file.size(),
            data_url: format!("data:{};base64,{}", file.mime, STANDARD.encode(&file.bytes)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UploadState {
    Idle,
    Selected,
    Uploading,
    Processed(OcrResult),
    Failed(String),
}

pub struct UploadFlow {
    policy: UploadPolicy,
    file: Option<UploadFile>,
    preview: Option<Preview>,
    state: UploadState,
    error: Option<String>,
    progress: Arc<watch::Sender<u8>>,
}

impl Default for UploadFlow {
    fn default() -> Self {
        Self::new(UploadPolicy::default())
    }
}

impl UploadFlow {
    pub fn new(policy: UploadPolicy) -> Self {
        let (progress, _) = watch::channel(0);
        Self {
            policy,
            file: None,
            preview: None,
            state: UploadState::Idle,
            error: None,
            progress: Arc::new(progress),
        }
    }

    pub fn state(&self) -> &UploadState {
        &self.state
    }

    pub fn preview(&self) -> Option<&Preview> {
        self.preview.as_ref()
    }

    pub fn file(&self) -> Option<&UploadFile> {
        self.file.as_ref()
    }

    /// Last user-visible error (rejection or failed upload)
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn result(&self) -> Option<&OcrResult> {
        match &self.state {
            UploadState::Processed(r) => Some(r),
            _ => None,
        }
    }

    pub fn is_uploading(&self) -> bool {
        self.state == UploadState::Uploading
    }

    /// Latest upload percentage
    pub fn progress(&self) -> u8 {
        *self.progress.borrow()
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<u8> {
        self.progress.subscribe()
    }

    /// Choose a file. The preview is built immediately; a rejected file leaves
    /// the previous selection in place and records an error instead.
    pub fn select(&mut self, file: UploadFile) -> Result<&Preview, Rejection> {
        if let Err(rejection) = self.policy.check(&file) {
            warn!(name = %file.name, "file rejected: {}", rejection);
            self.error = Some(rejection.message());
            return Err(rejection);
        }

        self.error = None;
        self.progress.send_replace(0);
        self.state = UploadState::Selected;
        let preview = Preview::of(&file);
        self.file = Some(file);
        Ok(self.preview.insert(preview))
    }

    /// Upload the selected file for OCR. On failure the file stays selected
    /// so the user can retry.
    pub async fn submit(&mut self, client: &ApiClient, engine: OcrEngine) -> ApiResult<OcrResult> {
        let Some(file) = self.file.as_ref() else {
            let msg = "Select a file first".to_string();
            self.error = Some(msg.clone());
            return Err(ApiError::InvalidFile(msg));
        };

        self.state = UploadState::Uploading;
        self.error = None;
        let progress = self.progress.clone();
        progress.send_replace(0);

        info!(name = %file.name, size = file.size(), %engine, "uploading bill");
        let outcome = client
            .process_image(file, Some(engine), move |pct| {
                progress.send_replace(pct);
            })
            .await;

        match outcome {
            Ok(result) => {
                self.progress.send_replace(100);
                self.state = UploadState::Processed(result.clone());
                Ok(result)
            }
            Err(e) => {
                let msg = e.upload_message();
                self.error = Some(msg.clone());
                self.state = UploadState::Failed(msg);
                Err(e)
            }
        }
    }

    /// Back to `Idle`, forgetting the file and any result
    pub fn reset(&mut self) {
        self.file = None;
        self.preview = None;
        self.error = None;
        self.state = UploadState::Idle;
        self.progress.send_replace(0);
    }
}
