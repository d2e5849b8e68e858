//! Error types for the edgequake-receipt library.
//!
//! Every failure is terminal for the request that produced it: the pipeline
//! is a single linear pass (intake → extraction → presentation) with no
//! partial results, so one error enum covers the whole crate.
//!
//! Variants fall into two classes, exposed through
//! [`ReceiptError::is_client_error`]:
//!
//! * **Client**: the caller sent something unusable (no file, not an image,
//!   unreadable path). The HTTP boundary answers these with a 4xx.
//! * **Server**: configuration, model, transport or parse problems. These
//!   map to a 5xx. [`ReceiptError::Parse`] additionally carries the model's
//!   raw text so the caller can inspect what was actually returned.

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the edgequake-receipt library.
#[derive(Debug, Error)]
pub enum ReceiptError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The upload is missing, empty, too large or not an image.
    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    /// Input file was not found at the given path.
    #[error("Image file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Config errors ─────────────────────────────────────────────────────
    /// The inference provider cannot be used (missing API key etc.).
    #[error("{detail}")]
    Configuration { detail: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Model errors ──────────────────────────────────────────────────────
    /// Transport or provider failure while calling the model.
    #[error("Model request failed: {message}")]
    Upstream { message: String },

    /// The model did not answer within the configured bound.
    #[error("Model request timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The model answered with no text at all.
    #[error("No content in model response")]
    EmptyResponse,

    /// No recovery tier produced a usable JSON record.
    #[error("Failed to parse receipt data: {detail}")]
    Parse { raw_text: String, detail: String },

    // ── Export errors ─────────────────────────────────────────────────────
    /// Serialising the record into an export format failed.
    #[error("Failed to export receipt as {format}: {detail}")]
    Export { format: String, detail: String },

    /// Could not create or write the export file.
    #[error("Failed to write output file '{path}': {source}")]
    ExportWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ReceiptError {
    /// Shorthand for [`ReceiptError::InvalidInput`].
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }

    /// `true` when the caller, not the service, is at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput { .. }
                | Self::FileNotFound { .. }
                | Self::PermissionDenied { .. }
                | Self::DownloadFailed { .. }
                | Self::DownloadTimeout { .. }
        )
    }

    /// Only transport-level failures are worth a second attempt; a parse
    /// failure is deterministic for the same text.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Upstream { .. })
    }

    /// The model's raw text, when the failure happened after the model answered.
    pub fn raw_text(&self) -> Option<&str> {
        match self {
            Self::Parse { raw_text, .. } => Some(raw_text),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_exposes_raw_text() {
        let e = ReceiptError::Parse {
            raw_text: "sorry, I cannot read this".into(),
            detail: "expected value at line 1 column 1".into(),
        };
        assert_eq!(e.raw_text(), Some("sorry, I cannot read this"));
        assert!(e.to_string().contains("Failed to parse receipt data"));
        assert!(!e.is_client_error());
    }

    #[test]
    fn invalid_input_is_client_error() {
        let e = ReceiptError::invalid_input("no file provided");
        assert!(e.is_client_error());
        assert_eq!(e.to_string(), "Invalid input: no file provided");
        assert_eq!(e.raw_text(), None);
    }

    #[test]
    fn only_upstream_is_retryable() {
        assert!(ReceiptError::Upstream {
            message: "connection reset".into()
        }
        .is_retryable());
        assert!(!ReceiptError::Timeout { secs: 60 }.is_retryable());
        assert!(!ReceiptError::EmptyResponse.is_retryable());
        assert!(!ReceiptError::Parse {
            raw_text: String::new(),
            detail: String::new()
        }
        .is_retryable());
    }

    #[test]
    fn timeout_display() {
        let e = ReceiptError::Timeout { secs: 45 };
        assert!(e.to_string().contains("45s"), "got: {e}");
    }

    #[test]
    fn configuration_display_is_verbatim() {
        let e = ReceiptError::Configuration {
            detail: "api key not configured".into(),
        };
        assert_eq!(e.to_string(), "api key not configured");
    }
}
