//! # edgequake-receipt
//!
//! Turn a photo of a retail receipt into structured JSON using a Vision
//! Language Model (VLM), then render or export it.
//!
//! ## Why this crate?
//!
//! Classic OCR gives you a bag of text lines; a receipt needs fields. Here
//! the VLM reads the image as a person would and answers with a JSON record
//! (store identity, fiscal data, one row per purchased item, totals and
//! payment breakdown). The model's answer is free-form text, so the crate
//! recovers the JSON from it, normalises string-or-number money fields into
//! decimals and keeps the raw answer around when recovery fails.
//!
//! ## Pipeline Overview
//!
//! ```text
//! image (upload, path or URL)
//!  │
//!  ├─ 1. Intake   image types only, size ceiling, MIME sniffing
//!  ├─ 2. Encode   bytes → base64 ImageData
//!  ├─ 3. VLM      one call, bounded timeout, one transport retry
//!  ├─ 4. Recover  array span → object span → raw text
//!  └─ 5. Present  typed view, text layout, JSON / CSV export
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_receipt::{extract_file, render, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Reads GEMINI_API_KEY from the environment.
//!     let config = ExtractionConfig::default();
//!     let record = extract_file("receipt.jpg", &config).await?;
//!     println!("{}", render(&record));
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `server` | via cli | axum router for the HTTP service |
//! | `cli`    | on      | the `receipt2json` binary (clap, anyhow, tracing-subscriber, indicatif) |
//!
//! Library only:
//! ```toml
//! edgequake-receipt = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod export;
pub mod extract;
pub mod pipeline;
pub mod prompts;
pub mod receipt;
pub mod render;
#[cfg(feature = "server")]
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder, ReceiptSchema};
pub use error::ReceiptError;
pub use export::{export_as, export_filename, write_export, ExportFormat};
pub use extract::{extract, extract_file, extract_sync, resolve_model, submit};
pub use pipeline::intake::Upload;
pub use pipeline::llm::{ModelReply, VisionModel};
pub use receipt::{format_amount, parse_amount, ExtractedRecord, FormattedAmount, LineItem, ReceiptSummary};
pub use render::{render, render_with_currency, ReceiptView};
