//! Extraction entry points: run one document through all four stages.
//!
//! [`Extractor`] resolves the LLM backend and OCR detector once and can be
//! cloned cheaply and reused across requests. The free functions
//! ([`extract`], [`extract_text`], …) build a throwaway `Extractor` for
//! one-off calls. For many documents at once see [`crate::stream`].

use crate::config::ExtractionConfig;
use crate::error::AmountError;
use crate::output::{CompletedReport, ExtractionReport, IngestSummary};
use crate::pipeline::ingest::{ingest_image, ingest_text, validate_image, Halt, IngestResult, RawInput};
use crate::pipeline::llm::{resolve_backend, LlmBackend};
use crate::pipeline::ocr::{TextDetector, VisionDetector};
use crate::pipeline::{classify, normalize, reconcile};
use crate::progress::{ExtractionProgressCallback, Stage};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// A configured pipeline.
#[derive(Clone)]
pub struct Extractor {
    config: ExtractionConfig,
    llm: Arc<dyn LlmBackend>,
    ocr: Option<Arc<dyn TextDetector>>,
}

impl fmt::Debug for Extractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extractor")
            .field("llm", &self.llm.name())
            .field("ocr", &self.ocr.as_ref().map(|o| o.name().to_string()))
            .finish()
    }
}

impl Extractor {
    /// Resolve capabilities from `config`.
    ///
    /// # Errors
    /// [`AmountError::ProviderNotConfigured`] when a named LLM provider cannot
    /// be created. A missing OCR key is not an error until an image arrives.
    pub fn new(config: ExtractionConfig) -> Result<Self, AmountError> {
        let llm = resolve_backend(&config)?;
        let ocr = resolve_detector(&config)?;
        debug!("Extractor ready: {:?}", config);
        Ok(Self { config, llm, ocr })
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Run the full pipeline on `input`.
    ///
    /// # Returns
    /// `Ok(report)` for every request the pipeline could look at, including
    /// early terminations (`no_amounts_found`, OCR `error`).
    ///
    /// # Errors
    /// Only for inputs that never reach a stage: oversized or unrecognised
    /// images, or image input with no OCR provider.
    pub async fn run(&self, input: RawInput) -> Result<ExtractionReport, AmountError> {
        let start = Instant::now();
        info!("Starting extraction ({} input)", input.modality());

        // ── Step 1: Ingest ───────────────────────────────────────────────────
        self.notify(|cb| cb.on_stage_start(Stage::Ingest));
        let ingested = match input {
            RawInput::Text(text) => ingest_text(&text),
            RawInput::Image(bytes) => {
                let format = validate_image(&bytes, self.config.max_image_bytes)?;
                debug!("Image: {:?}, {} bytes", format, bytes.len());
                let detector = self.ocr.as_deref().ok_or_else(|| {
                    AmountError::ProviderNotConfigured {
                        provider: "Google Cloud Vision".to_string(),
                        hint: "Set GOOGLE_VISION_API_KEY or inject a TextDetector via \
                               ExtractionConfigBuilder::ocr"
                            .to_string(),
                    }
                })?;
                ingest_image(detector, &bytes).await
            }
        };
        let ingested = match ingested {
            Ok(r) => r,
            Err(halt) => return Ok(self.halt(halt)),
        };
        self.notify(|cb| cb.on_stage_complete(Stage::Ingest, Some(ingested.confidence)));
        info!(
            "Step 1: {} tokens, currency {:?}, confidence {}",
            ingested.raw_tokens.len(),
            ingested.currency_hint,
            ingested.confidence
        );

        let report = self.run_stages(ingested).await;
        info!("Extraction finished in {}ms", start.elapsed().as_millis());
        self.notify(|cb| cb.on_extraction_complete(report.status().as_str()));
        Ok(report)
    }

    /// Steps 2–4 on an already-ingested document.
    async fn run_stages(&self, ingested: IngestResult) -> ExtractionReport {
        // ── Step 2: Normalize ────────────────────────────────────────────────
        self.notify(|cb| cb.on_stage_start(Stage::Normalize));
        let normalized = normalize::normalize(self.llm.as_ref(), &ingested).await;
        if let Some(ref reason) = normalized.fallback_reason {
            self.notify(|cb| cb.on_fallback(Stage::Normalize, reason));
        }
        self.notify(|cb| {
            cb.on_stage_complete(Stage::Normalize, Some(normalized.normalization_confidence))
        });

        // ── Step 3: Classify ─────────────────────────────────────────────────
        self.notify(|cb| cb.on_stage_start(Stage::Classify));
        let classified = classify::classify(self.llm.as_ref(), &ingested, &normalized).await;
        if let Some(ref reason) = classified.fallback_reason {
            self.notify(|cb| cb.on_fallback(Stage::Classify, reason));
        }
        self.notify(|cb| cb.on_stage_complete(Stage::Classify, Some(classified.confidence)));

        // ── Step 4: Reconcile ────────────────────────────────────────────────
        self.notify(|cb| cb.on_stage_start(Stage::Reconcile));
        let step4 = reconcile::reconcile(&ingested, &classified);
        let found = step4.amounts.iter().filter(|a| a.source.is_some()).count();
        info!(
            "Step 4: {}/{} amounts traced to source, currency {}",
            found,
            step4.amounts.len(),
            step4.currency
        );
        self.notify(|cb| cb.on_stage_complete(Stage::Reconcile, None));

        ExtractionReport::Completed(Box::new(CompletedReport {
            step1: IngestSummary::from(&ingested),
            step2: normalized,
            step3: classified,
            step4,
        }))
    }

    fn halt(&self, halt: Halt) -> ExtractionReport {
        info!("Extraction halted: {} ({})", halt.status, halt.reason);
        self.notify(|cb| cb.on_extraction_complete(halt.status.as_str()));
        halt.into()
    }

    fn notify(&self, f: impl FnOnce(&dyn ExtractionProgressCallback)) {
        if let Some(ref cb) = self.config.progress_callback {
            f(cb.as_ref());
        }
    }
}

/// Injected detector, else Cloud Vision when a key is configured.
fn resolve_detector(
    config: &ExtractionConfig,
) -> Result<Option<Arc<dyn TextDetector>>, AmountError> {
    if let Some(ref detector) = config.ocr {
        return Ok(Some(Arc::clone(detector)));
    }
    match config.vision_api_key {
        Some(ref key) if !key.is_empty() => {
            let detector = VisionDetector::new(
                config.vision_endpoint.as_str(),
                key.as_str(),
                config.api_timeout_secs,
            )
            .map_err(|e| AmountError::Internal(format!("Vision client: {e}")))?;
            Ok(Some(Arc::new(detector)))
        }
        _ => Ok(None),
    }
}

/// Run one document through the pipeline.
///
/// # Example
/// ```rust,no_run
/// use amount_scan::{extract, ExtractionConfig, RawInput};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ExtractionConfig::builder().gemini_api_key("AIza...").build()?;
/// let report = extract(RawInput::Text("Total: Rs. 1,250.00".into()), &config).await?;
/// println!("{}", serde_json::to_string_pretty(&report)?);
/// # Ok(())
/// # }
/// ```
pub async fn extract(
    input: RawInput,
    config: &ExtractionConfig,
) -> Result<ExtractionReport, AmountError> {
    Extractor::new(config.clone())?.run(input).await
}

/// Extract amounts from plain text.
pub async fn extract_text(
    text: impl Into<String>,
    config: &ExtractionConfig,
) -> Result<ExtractionReport, AmountError> {
    extract(RawInput::Text(text.into()), config).await
}

/// Extract amounts from image bytes (PNG, JPEG, …).
pub async fn extract_image(
    bytes: impl Into<Vec<u8>>,
    config: &ExtractionConfig,
) -> Result<ExtractionReport, AmountError> {
    extract(RawInput::Image(bytes.into()), config).await
}

/// Read an image from disk and extract amounts from it.
pub async fn extract_image_file(
    path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<ExtractionReport, AmountError> {
    let path = path.as_ref();
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| AmountError::InvalidInput {
            reason: format!("cannot read {}: {}", path.display(), e),
        })?;
    extract_image(bytes, config).await
}

/// Synchronous wrapper around [`extract`].
///
/// Creates a temporary tokio runtime internally.
pub fn extract_sync(
    input: RawInput,
    config: &ExtractionConfig,
) -> Result<ExtractionReport, AmountError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| AmountError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(extract(input, config))
}
