//! Configuration types for receipt extraction.
//!
//! All extraction behaviour is controlled through [`ExtractionConfig`], built
//! via its [`ExtractionConfigBuilder`]. The config is immutable once built and
//! cheap to clone, so the HTTP service shares one instance across requests
//! without any locking.

use crate::error::ReceiptError;
use crate::pipeline::llm::VisionModel;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Configuration for a receipt extraction.
///
/// # Example
/// ```rust
/// use edgequake_receipt::{ExtractionConfig, ReceiptSchema};
///
/// let config = ExtractionConfig::builder()
///     .schema(ReceiptSchema::LineItems)
///     .model("gemini-2.0-flash")
///     .api_timeout_secs(30)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Which record shape the model is asked to produce. Default: [`ReceiptSchema::LineItems`].
    pub schema: ReceiptSchema,

    /// Model identifier, e.g. "gemini-2.0-flash", "gpt-4.1-mini".
    /// If None, uses [`DEFAULT_MODEL`].
    pub model: Option<String>,

    /// Provider name (e.g. "gemini", "openai"). If None, uses [`DEFAULT_PROVIDER`].
    pub provider_name: Option<String>,

    /// Pre-constructed model client. Takes precedence over `provider_name`
    /// and skips the credential check.
    pub model_client: Option<Arc<dyn VisionModel>>,

    /// Environment variable holding the provider credential. Default: `GEMINI_API_KEY`.
    ///
    /// Checked before any network call so a missing key surfaces as a
    /// configuration error rather than an opaque provider failure.
    pub api_key_env: String,

    /// Sampling temperature. Default: 0.1.
    ///
    /// Transcription wants the model faithful to the image, not creative.
    pub temperature: f32,

    /// Maximum tokens the model may generate. Default: 8192.
    ///
    /// Line-item records repeat every header field per item; a 30-line
    /// receipt easily produces 6 000 tokens of JSON. Truncated JSON is
    /// unrecoverable, so err on the generous side.
    pub max_tokens: usize,

    /// Retries on a transport failure. 0 or 1; default: 1.
    ///
    /// Parse failures, empty responses and timeouts are never retried.
    pub max_retries: u32,

    /// Delay before the transport retry, in milliseconds. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-model-call timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Custom extraction prompt. If None, uses the built-in prompt for `schema`.
    pub system_prompt: Option<String>,

    /// Largest accepted upload in bytes. Default: 10 MiB.
    pub max_upload_bytes: usize,

    /// Currency label appended to amounts in the text view. Default: "AZN".
    pub currency: String,
}

/// Default inference provider.
pub const DEFAULT_PROVIDER: &str = "gemini";

/// Default vision model.
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Default credential variable.
pub const DEFAULT_API_KEY_ENV: &str = "GEMINI_API_KEY";

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            schema: ReceiptSchema::default(),
            model: None,
            provider_name: None,
            model_client: None,
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            temperature: 0.1,
            max_tokens: 8192,
            max_retries: 1,
            retry_backoff_ms: 500,
            api_timeout_secs: 60,
            download_timeout_secs: 120,
            system_prompt: None,
            max_upload_bytes: 10 * 1024 * 1024,
            currency: "AZN".to_string(),
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("schema", &self.schema)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field(
                "model_client",
                &self.model_client.as_ref().map(|_| "<dyn VisionModel>"),
            )
            .field("api_key_env", &self.api_key_env)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("system_prompt", &self.system_prompt)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("currency", &self.currency)
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// The model identifier that will be requested.
    pub fn model_name(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    /// The provider that will be used when no client is injected.
    pub fn provider(&self) -> &str {
        self.provider_name.as_deref().unwrap_or(DEFAULT_PROVIDER)
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn schema(mut self, schema: ReceiptSchema) -> Self {
        self.config.schema = schema;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn model_client(mut self, client: Arc<dyn VisionModel>) -> Self {
        self.config.model_client = Some(client);
        self
    }

    pub fn api_key_env(mut self, var: impl Into<String>) -> Self {
        self.config.api_key_env = var.into();
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    /// At most one retry is ever made.
    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n.min(1);
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn max_upload_bytes(mut self, n: usize) -> Self {
        self.config.max_upload_bytes = n;
        self
    }

    pub fn currency(mut self, label: impl Into<String>) -> Self {
        self.config.currency = label.into();
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, ReceiptError> {
        let c = &self.config;
        if c.api_timeout_secs == 0 {
            return Err(ReceiptError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        if c.max_tokens == 0 {
            return Err(ReceiptError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        if c.max_upload_bytes == 0 {
            return Err(ReceiptError::InvalidConfig(
                "max_upload_bytes must be ≥ 1".into(),
            ));
        }
        if c.api_key_env.trim().is_empty() && c.model_client.is_none() {
            return Err(ReceiptError::InvalidConfig(
                "api_key_env must name an environment variable".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Record shape requested from the model.
///
/// Two shapes exist because the service went through two iterations. Both
/// stay available as versioned modes; the line-item shape is the canonical
/// one and the default.
///
/// | Schema | Shape |
/// |--------|-------|
/// | `LineItems` | array of flat records, one per purchased item, header fields repeated |
/// | `Summary` | one object per receipt with a nested `items` array (legacy) |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReceiptSchema {
    /// Flattened per-item records (default).
    #[default]
    LineItems,
    /// Single summary object with nested items.
    Summary,
}

impl fmt::Display for ReceiptSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReceiptSchema::LineItems => f.write_str("line-items"),
            ReceiptSchema::Summary => f.write_str("summary"),
        }
    }
}
