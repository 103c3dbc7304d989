//! Progress-callback trait for per-stage extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! events as the pipeline moves through its four stages.
//!
//! # Example
//!
//! ```rust
//! use amount_scan::{ExtractionConfig, ExtractionProgressCallback, Stage};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct FallbackCounter {
//!     fallbacks: AtomicUsize,
//! }
//!
//! impl ExtractionProgressCallback for FallbackCounter {
//!     fn on_fallback(&self, stage: Stage, reason: &str) {
//!         self.fallbacks.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{stage} fell back: {reason}");
//!     }
//! }
//!
//! let counter = Arc::new(FallbackCounter { fallbacks: AtomicUsize::new(0) });
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ExtractionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// The four pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Text or OCR ingestion, tokenisation and confidence.
    Ingest,
    /// Token → number normalisation.
    Normalize,
    /// Amount labelling.
    Classify,
    /// Source-text lookup and final assembly.
    Reconcile,
}

impl Stage {
    pub fn number(self) -> usize {
        match self {
            Stage::Ingest => 1,
            Stage::Normalize => 2,
            Stage::Classify => 3,
            Stage::Reconcile => 4,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Ingest => "input",
            Stage::Normalize => "normalization",
            Stage::Classify => "classification",
            Stage::Reconcile => "final output",
        };
        f.write_str(name)
    }
}

/// Called by the pipeline as each stage runs.
///
/// Implementations must be `Send + Sync`; [`crate::stream::extract_stream`]
/// drives several documents at once and shares one callback between them.
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called before a stage begins.
    fn on_stage_start(&self, stage: Stage) {
        let _ = stage;
    }

    /// Called when a stage finishes. `confidence` is `None` for the
    /// reconciliation stage, which carries no score.
    fn on_stage_complete(&self, stage: Stage, confidence: Option<f64>) {
        let _ = (stage, confidence);
    }

    /// Called when an LLM-assisted stage takes its deterministic fallback.
    fn on_fallback(&self, stage: Stage, reason: &str) {
        let _ = (stage, reason);
    }

    /// Called once per document with the final report status
    /// (`ok`, `no_amounts_found` or `error`).
    fn on_extraction_complete(&self, status: &str) {
        let _ = status;
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no callback is configured.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;
