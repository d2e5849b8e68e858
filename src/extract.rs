//! Extraction entry points: one receipt image in, one structured record out.
//!
//! Each call is a single linear pass with no partial results:
//!
//! ```text
//! validate ─▶ resolve model ─▶ encode ─▶ model call ─▶ recover ─▶ attach filename
//! ```
//!
//! Validation runs before the model is resolved, so a bad upload is
//! rejected without touching the network or the credential.

use crate::config::ExtractionConfig;
use crate::error::ReceiptError;
use crate::pipeline::intake::{self, Upload};
use crate::pipeline::llm::{self, ProviderModel, VisionModel};
use crate::pipeline::{encode, recover};
use crate::prompts;
use crate::receipt::ExtractedRecord;
use edgequake_llm::ProviderFactory;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Validate an upload and extract its receipt.
///
/// This is the primary entry point for the library; the HTTP service calls
/// it for every `POST /api/extract`.
///
/// # Errors
/// - [`ReceiptError::InvalidInput`] for a missing, oversized or non-image
///   upload (no model call is made)
/// - [`ReceiptError::Configuration`] when no credential is available
/// - [`ReceiptError::Upstream`], [`ReceiptError::Timeout`],
///   [`ReceiptError::EmptyResponse`] or [`ReceiptError::Parse`] from the
///   model round trip
pub async fn submit(upload: Upload, config: &ExtractionConfig) -> Result<ExtractedRecord, ReceiptError> {
    let image = intake::validate_upload(upload, config.max_upload_bytes)?;
    let model = resolve_model(config)?;

    info!(
        "Extracting '{}' ({}, {} bytes) as {}",
        image.filename,
        image.mime_type,
        image.bytes.len(),
        config.schema
    );

    let (value, raw) = run_extraction(model.as_ref(), &image.bytes, &image.mime_type, config).await?;
    let mut record = ExtractedRecord::from_value(value, &raw)?;
    record.attach_filename(&image.filename);

    info!("Extracted {} record(s) from '{}'", record.len(), image.filename);
    Ok(record)
}

/// Extract structured data from image bytes of a known MIME type.
///
/// Returns the recovered JSON as-is: no filename is attached and the value
/// is not checked for a record shape. Use [`submit`] for the full pass.
pub async fn extract(
    image_bytes: &[u8],
    mime_type: &str,
    config: &ExtractionConfig,
) -> Result<Value, ReceiptError> {
    let model = resolve_model(config)?;
    run_extraction(model.as_ref(), image_bytes, mime_type, config)
        .await
        .map(|(value, _)| value)
}

/// Load a local path or HTTP/HTTPS URL and extract its receipt.
pub async fn extract_file(
    input: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<ExtractedRecord, ReceiptError> {
    let upload = intake::load_input(input.as_ref(), config.download_timeout_secs).await?;
    submit(upload, config).await
}

/// Synchronous wrapper around [`extract_file`].
///
/// Creates a temporary tokio runtime internally.
pub fn extract_sync(
    input: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<ExtractedRecord, ReceiptError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ReceiptError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(extract_file(input, config))
}

/// Resolve the model, from most-specific to least-specific:
///
/// 1. an injected client (`config.model_client`), used as-is;
/// 2. the named provider and model, once the credential in
///    `config.api_key_env` is confirmed present.
pub fn resolve_model(config: &ExtractionConfig) -> Result<Arc<dyn VisionModel>, ReceiptError> {
    if let Some(ref client) = config.model_client {
        return Ok(Arc::clone(client));
    }

    let key_present = std::env::var(&config.api_key_env)
        .map(|v| !v.trim().is_empty())
        .unwrap_or(false);
    if !key_present {
        return Err(ReceiptError::Configuration {
            detail: format!("api key not configured: set {}", config.api_key_env),
        });
    }

    let provider = ProviderFactory::create_llm_provider(config.provider(), config.model_name())
        .map_err(|e| ReceiptError::Configuration {
            detail: format!("provider '{}' is not available: {e}", config.provider()),
        })?;
    debug!("Using provider {} / {}", config.provider(), config.model_name());

    Ok(Arc::new(ProviderModel::new(provider, config)))
}

/// Encode, call the model, recover JSON. Returns the value and the raw text
/// it came from.
async fn run_extraction(
    model: &dyn VisionModel,
    image_bytes: &[u8],
    mime_type: &str,
    config: &ExtractionConfig,
) -> Result<(Value, String), ReceiptError> {
    let start = Instant::now();
    let image = encode::encode_image(image_bytes, mime_type);
    let prompt = config
        .system_prompt
        .as_deref()
        .unwrap_or_else(|| prompts::prompt_for(config.schema));

    let reply = llm::request_extraction(model, prompt, image, config).await?;
    if reply.content.trim().is_empty() {
        return Err(ReceiptError::EmptyResponse);
    }

    let recovered = recover::recover(&reply.content)?;
    debug!(
        "Recovered {:?} in {}ms",
        recovered.tier,
        start.elapsed().as_millis()
    );
    Ok((recovered.value, reply.content))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReceiptSchema;
    use crate::pipeline::llm::ModelReply;
    use async_trait::async_trait;
    use edgequake_llm::ImageData;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    /// Always answers with the same text; remembers the last prompt.
    struct Canned {
        reply: String,
        calls: AtomicUsize,
        last_prompt: Mutex<Option<String>>,
    }

    impl Canned {
        fn new(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.to_string(),
                calls: AtomicUsize::new(0),
                last_prompt: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl VisionModel for Canned {
        async fn complete(&self, prompt: &str, _image: ImageData) -> Result<ModelReply, ReceiptError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_prompt.lock().unwrap() = Some(prompt.to_string());
            Ok(ModelReply::text(self.reply.clone()))
        }
    }

    fn config_with(model: Arc<Canned>) -> ExtractionConfig {
        ExtractionConfig::builder().model_client(model).build().unwrap()
    }

    fn png_upload(name: &str) -> Upload {
        Upload::new(Some(name.into()), Some("image/png".into()), PNG.to_vec())
    }

    #[tokio::test]
    async fn pure_json_reply_equals_direct_parse() {
        let raw = r#"[{"item_name": "Milk", "line_total": "1.80"}]"#;
        let config = config_with(Canned::new(raw));
        let value = extract(PNG, "image/png", &config).await.unwrap();
        assert_eq!(value, serde_json::from_str::<Value>(raw).unwrap());
    }

    #[tokio::test]
    async fn filename_is_attached_to_every_item() {
        let model = Canned::new("```json\n[{\"item_name\": \"A\"}, {\"item_name\": \"B\"}]\n```");
        let config = config_with(Arc::clone(&model));
        let record = submit(png_upload("till.png"), &config).await.unwrap();
        assert_eq!(record.len(), 2);
        assert!(record.rows().iter().all(|r| r["filename"] == "till.png"));
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn non_image_upload_makes_no_model_call() {
        let model = Canned::new("{}");
        let config = config_with(Arc::clone(&model));
        let upload = Upload::new(Some("a.txt".into()), Some("text/plain".into()), b"hello".to_vec());
        let err = submit(upload, &config).await.unwrap_err();
        assert!(matches!(err, ReceiptError::InvalidInput { .. }));
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn whitespace_reply_is_empty_response() {
        let config = config_with(Canned::new("  \n "));
        let err = submit(png_upload("r.png"), &config).await.unwrap_err();
        assert!(matches!(err, ReceiptError::EmptyResponse));
    }

    #[tokio::test]
    async fn unrecoverable_reply_keeps_raw_text() {
        let config = config_with(Canned::new("The photo is too dark to read."));
        let err = submit(png_upload("r.png"), &config).await.unwrap_err();
        assert_eq!(err.raw_text(), Some("The photo is too dark to read."));
    }

    #[tokio::test]
    async fn scalar_reply_is_a_parse_error() {
        let config = config_with(Canned::new("\"just a string\""));
        let err = submit(png_upload("r.png"), &config).await.unwrap_err();
        assert!(matches!(err, ReceiptError::Parse { .. }));
        assert_eq!(err.raw_text(), Some("\"just a string\""));
    }

    #[tokio::test]
    async fn prompt_follows_schema_unless_overridden() {
        let model = Canned::new("{}");
        let config = ExtractionConfig::builder()
            .model_client(Arc::clone(&model) as Arc<dyn VisionModel>)
            .schema(ReceiptSchema::Summary)
            .build()
            .unwrap();
        submit(png_upload("r.png"), &config).await.unwrap();
        let prompt = model.last_prompt.lock().unwrap().clone().unwrap();
        assert_eq!(prompt, prompts::SUMMARY_PROMPT);

        let config = ExtractionConfig::builder()
            .model_client(Arc::clone(&model) as Arc<dyn VisionModel>)
            .system_prompt("custom")
            .build()
            .unwrap();
        submit(png_upload("r.png"), &config).await.unwrap();
        assert_eq!(model.last_prompt.lock().unwrap().as_deref(), Some("custom"));
    }

    #[test]
    fn missing_key_is_a_configuration_error() {
        let config = ExtractionConfig::builder()
            .api_key_env("RECEIPT2JSON_TEST_KEY_NEVER_SET")
            .build()
            .unwrap();
        let err = resolve_model(&config).err().unwrap();
        assert!(matches!(err, ReceiptError::Configuration { .. }));
        assert!(err.to_string().starts_with("api key not configured"));
    }

    #[tokio::test]
    async fn object_reply_gets_filename_once() {
        let config = config_with(Canned::new(r#"{"merchant_name": "Araz", "total": 3}"#));
        let record = submit(png_upload("araz.png"), &config).await.unwrap();
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({"merchant_name": "Araz", "total": 3, "filename": "araz.png"})
        );
    }
}
