//! Image encoding: raw upload bytes → base64 `ImageData`.
//!
//! Vision APIs accept images as base64 payloads embedded in the JSON request
//! body. The upload is forwarded as-is under its declared MIME type: receipts
//! are already photographs or scans, and re-encoding would only add
//! artefacts to small print.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use tracing::debug;

/// Encode raw image bytes for the model request.
///
/// `detail: "high"` asks tiling models to read the full-resolution image;
/// receipt line items are small print.
pub fn encode_image(bytes: &[u8], mime_type: &str) -> ImageData {
    let b64 = STANDARD.encode(bytes);
    debug!("Encoded {} → {} bytes base64", mime_type, b64.len());

    ImageData::new(b64, mime_type).with_detail("high")
}
