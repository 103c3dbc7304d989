//! Configuration types for amount extraction.
//!
//! All extraction behaviour is controlled through [`ExtractionConfig`], built
//! via its [`ExtractionConfigBuilder`]. API keys, model identifiers and retry
//! knobs live here instead of in process-wide state, so every pipeline stage
//! can be constructed and tested in isolation.

use crate::error::AmountError;
use crate::pipeline::llm::LlmBackend;
use crate::pipeline::ocr::TextDetector;
use crate::progress::ProgressCallback;
use std::fmt;
use std::sync::Arc;

/// Default Gemini model used for normalisation and classification.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash-preview-05-20";

/// Base URL of the Gemini `generateContent` REST API.
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Cloud Vision `images:annotate` endpoint.
pub const DEFAULT_VISION_ENDPOINT: &str = "https://vision.googleapis.com/v1/images:annotate";

/// Largest accepted image upload (10 MiB).
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// Configuration for an extraction run.
///
/// Built via [`ExtractionConfig::builder()`] or using
/// [`ExtractionConfig::default()`].
///
/// # Example
/// ```rust
/// use amount_scan::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .gemini_api_key("AIza...")
///     .max_retries(3)
///     .retry_backoff_ms(1000)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Gemini API key. When set (and no other backend is), normalisation and
    /// classification call Gemini with a strict response schema.
    pub gemini_api_key: Option<String>,

    /// LLM model identifier. If None, uses [`DEFAULT_GEMINI_MODEL`] for Gemini
    /// and `gpt-4.1-nano` for a named edgequake-llm provider.
    pub model: Option<String>,

    /// Base URL for Gemini model endpoints. Overridable for proxies and tests.
    pub gemini_base_url: String,

    /// edgequake-llm provider name (e.g. "openai", "anthropic", "ollama").
    /// Takes precedence over the Gemini key.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM backend. Takes precedence over everything else.
    pub llm: Option<Arc<dyn LlmBackend>>,

    /// Pre-constructed OCR capability. Takes precedence over `vision_api_key`.
    pub ocr: Option<Arc<dyn TextDetector>>,

    /// Google Cloud Vision API key for image input.
    pub vision_api_key: Option<String>,

    /// Cloud Vision endpoint.
    pub vision_endpoint: String,

    /// Sampling temperature for LLM completions. Default: 0.1.
    pub temperature: f32,

    /// Maximum attempts per LLM call; 3 means at most three requests.
    /// Default: 3. Never below 1.
    pub max_retries: u32,

    /// Base retry delay in milliseconds. Default: 1000.
    ///
    /// The wait before retry `n` (zero-indexed) is `retry_backoff_ms * 2^n`:
    /// 1 s → 2 s with the defaults. No wait follows the final attempt.
    pub retry_backoff_ms: u64,

    /// Per-HTTP-request timeout in seconds, enforced by the transport. Default: 60.
    pub api_timeout_secs: u64,

    /// Largest accepted image in bytes. Default: 10 MiB.
    pub max_image_bytes: usize,

    /// Number of documents processed at once by
    /// [`crate::stream::extract_stream`]. Default: 4.
    pub concurrency: usize,

    /// Optional stage-progress observer.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            model: None,
            gemini_base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            provider_name: None,
            llm: None,
            ocr: None,
            vision_api_key: None,
            vision_endpoint: DEFAULT_VISION_ENDPOINT.to_string(),
            temperature: 0.1,
            max_retries: 3,
            retry_backoff_ms: 1000,
            api_timeout_secs: 60,
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
            concurrency: 4,
            progress_callback: None,
        }
    }
}

fn redact(key: &Option<String>) -> Option<&'static str> {
    key.as_ref().map(|_| "<redacted>")
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("gemini_api_key", &redact(&self.gemini_api_key))
            .field("model", &self.model)
            .field("gemini_base_url", &self.gemini_base_url)
            .field("provider_name", &self.provider_name)
            .field("llm", &self.llm.as_ref().map(|_| "<dyn LlmBackend>"))
            .field("ocr", &self.ocr.as_ref().map(|_| "<dyn TextDetector>"))
            .field("vision_api_key", &redact(&self.vision_api_key))
            .field("vision_endpoint", &self.vision_endpoint)
            .field("temperature", &self.temperature)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("max_image_bytes", &self.max_image_bytes)
            .field("concurrency", &self.concurrency)
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
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn gemini_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.gemini_api_key = Some(key.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn gemini_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.gemini_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn llm(mut self, backend: Arc<dyn LlmBackend>) -> Self {
        self.config.llm = Some(backend);
        self
    }

    pub fn ocr(mut self, detector: Arc<dyn TextDetector>) -> Self {
        self.config.ocr = Some(detector);
        self
    }

    pub fn vision_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.vision_api_key = Some(key.into());
        self
    }

    pub fn vision_endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.vision_endpoint = url.into();
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n.max(1);
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

    pub fn max_image_bytes(mut self, n: usize) -> Self {
        self.config.max_image_bytes = n;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, AmountError> {
        let c = &self.config;
        if c.max_retries == 0 {
            return Err(AmountError::InvalidConfig(
                "max_retries must be ≥ 1".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(AmountError::InvalidConfig(
                "api_timeout_secs must be ≥ 1".into(),
            ));
        }
        if c.max_image_bytes == 0 {
            return Err(AmountError::InvalidConfig(
                "max_image_bytes must be > 0".into(),
            ));
        }
        if !c.gemini_base_url.starts_with("http://") && !c.gemini_base_url.starts_with("https://") {
            return Err(AmountError::InvalidConfig(format!(
                "gemini_base_url must be an HTTP(S) URL, got '{}'",
                c.gemini_base_url
            )));
        }
        Ok(self.config)
    }
}
