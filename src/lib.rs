//! # amount-scan
//!
//! Extract monetary amounts from bills and receipts, given as plain text or
//! as an image, with per-stage confidence scores and the excerpt of the
//! document each amount came from.
//!
//! ## Why this crate?
//!
//! A regex finds numbers, but not which of them are money, what `175,00`
//! really means after a bad scan, or whether `550` is the total or the amount
//! due. This crate lets an LLM answer those questions under a strict response
//! schema, and keeps a deterministic answer ready for every stage so a
//! request still completes when the model is slow, down or unconfigured.
//!
//! ## Pipeline Overview
//!
//! ```text
//! text / image
//!  │
//!  ├─ 1. Ingest     trim text, or OCR the image and regroup words into lines;
//!  │                tokenise numbers, spot the currency, score confidence
//!  ├─ 2. Normalize  tokens → numbers (LLM, else strip-and-parse fallback)
//!  ├─ 3. Classify   numbers → labelled amounts (LLM, else "unclassified")
//!  └─ 4. Reconcile  find each amount's source text, pick the currency
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use amount_scan::{extract_text, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ExtractionConfig::builder()
//!         .gemini_api_key(std::env::var("GEMINI_API_KEY")?)
//!         .build()?;
//!     let report = extract_text("Total: Rs. 1,250.00, Tax: Rs. 125.00", &config).await?;
//!     println!("{}", serde_json::to_string_pretty(&report)?);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `amountscan` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! amount-scan = { version = "0.1", default-features = false }
//! ```
//!
//! ## Choosing an LLM
//!
//! | Backend | Configure with | Schema enforcement |
//! |---------|----------------|--------------------|
//! | Gemini (`gemini-2.5-flash-preview-05-20`) | `gemini_api_key` | native `responseSchema` |
//! | Any edgequake-llm provider | `provider_name` + `model` | schema in the prompt |
//! | Your own | `llm(Arc<dyn LlmBackend>)` | up to you |
//! | None | — | deterministic fallbacks only |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder};
pub use error::{AmountError, CallFailure, OcrError, StageError};
pub use extract::{
    extract, extract_image, extract_image_file, extract_sync, extract_text, Extractor,
};
pub use output::{
    CompletedReport, ExtractionReport, FinalAmount, FinalOutput, IngestSummary, ReportStatus,
};
pub use pipeline::classify::{ClassificationResult, ClassifiedAmount};
pub use pipeline::ingest::RawInput;
pub use pipeline::llm::{LlmBackend, StructuredRequest};
pub use pipeline::normalize::NormalizationResult;
pub use pipeline::ocr::{BoundingPoly, TextAnnotation, TextDetector, Vertex};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback, Stage};
pub use stream::{extract_batch, extract_stream};
