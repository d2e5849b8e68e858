//! Pipeline stages for receipt extraction.
//!
//! Each submodule implements exactly one step, so each is testable on its
//! own against literal fixtures.
//!
//! ## Data Flow
//!
//! ```text
//! intake ──▶ encode ──▶ llm ──▶ recover
//! (upload)   (base64)   (VLM)   (text → JSON)
//! ```
//!
//! 1. [`intake`]  — validate the upload (image types only), or load one from
//!    a path or URL
//! 2. [`encode`]  — base64-wrap the bytes for the multimodal request body
//! 3. [`llm`]     — the only stage with network I/O; bounded by a timeout,
//!    one transport retry
//! 4. [`recover`] — tiered JSON recovery from free-form model text

pub mod encode;
pub mod intake;
pub mod llm;
pub mod recover;
