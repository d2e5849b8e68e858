//! Upload intake: accept one image, reject everything else before any
//! network call is made.
//!
//! An upload arrives either from the HTTP service (multipart field with a
//! declared content type) or from the CLI (a local path or an HTTP/HTTPS URL).
//! Both paths converge on [`Upload`] and pass through [`validate_upload`],
//! which is the only gate in front of the model call.
//!
//! Declared content types are trusted when they name an image type. When the
//! type is missing or generic (`application/octet-stream`), the magic bytes
//! decide.

use crate::error::ReceiptError;
use std::path::PathBuf;
use tracing::{debug, info};

/// Name used when the caller did not supply one.
pub const DEFAULT_FILENAME: &str = "upload";

/// A file as received from the caller, not yet validated.
#[derive(Debug, Clone, Default)]
pub struct Upload {
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(
        filename: Option<String>,
        content_type: Option<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            filename,
            content_type,
            bytes: bytes.into(),
        }
    }
}

/// A validated image ready for encoding.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub filename: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Validate an upload, resolving its MIME type.
///
/// # Errors
/// [`ReceiptError::InvalidInput`] when the file is absent or empty, larger
/// than `max_bytes`, declared as a non-image type, or undeclared and not
/// recognisable as an image.
pub fn validate_upload(upload: Upload, max_bytes: usize) -> Result<ImageUpload, ReceiptError> {
    if upload.bytes.is_empty() {
        return Err(ReceiptError::invalid_input("no file provided"));
    }
    if upload.bytes.len() > max_bytes {
        return Err(ReceiptError::invalid_input(format!(
            "file is {} bytes; the limit is {} bytes",
            upload.bytes.len(),
            max_bytes
        )));
    }

    let declared = upload.content_type.as_deref().map(essence).filter(|t| {
        !t.is_empty() && t != "application/octet-stream"
    });

    let mime_type = match declared {
        Some(t) if t.starts_with("image/") => t,
        Some(t) => {
            return Err(ReceiptError::invalid_input(format!(
                "expected an image upload, got '{t}'"
            )))
        }
        None => sniff_mime(&upload.bytes)
            .map(str::to_string)
            .ok_or_else(|| ReceiptError::invalid_input("file is not a recognised image"))?,
    };

    let filename = upload
        .filename
        .filter(|f| !f.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_FILENAME.to_string());

    debug!(
        "Accepted upload '{}' ({}, {} bytes)",
        filename,
        mime_type,
        upload.bytes.len()
    );

    Ok(ImageUpload {
        filename,
        mime_type,
        bytes: upload.bytes,
    })
}

/// Detect an image MIME type from magic bytes.
pub fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    image::guess_format(bytes).ok().map(|f| f.to_mime_type())
}

/// Strip parameters and normalise case: `"Image/JPEG; q=1"` → `"image/jpeg"`.
fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Load a local path or HTTP/HTTPS URL into an [`Upload`].
///
/// The result still has to pass [`validate_upload`].
pub async fn load_input(input: &str, timeout_secs: u64) -> Result<Upload, ReceiptError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        load_local(input).await
    }
}

async fn load_local(path_str: &str) -> Result<Upload, ReceiptError> {
    let path = PathBuf::from(path_str);

    let bytes = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => ReceiptError::PermissionDenied { path: path.clone() },
        _ => ReceiptError::FileNotFound { path: path.clone() },
    })?;

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string());

    debug!("Read local image: {}", path.display());
    // No declared type: the bytes decide.
    Ok(Upload::new(filename, None, bytes))
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<Upload, ReceiptError> {
    info!("Downloading image from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ReceiptError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            ReceiptError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            ReceiptError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(ReceiptError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let bytes = response
        .bytes()
        .await
        .map_err(|e| ReceiptError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    info!("Downloaded {} bytes", bytes.len());

    Ok(Upload::new(
        Some(filename_from_url(url)),
        content_type,
        bytes.to_vec(),
    ))
}

/// Last path segment of a URL, or a fixed fallback.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded-receipt".to_string()
}
