//! Report types returned by the extraction pipeline.
//!
//! Everything here is `serde`-serialisable and mirrors the JSON contract:
//!
//! ```text
//! { "step1": { raw_tokens, currency_hint, confidence },
//!   "step2": { normalized_amounts, normalization_confidence },
//!   "step3": { amounts: [{type, value}], confidence },
//!   "step4": { currency, amounts: [{type, value, source}], status } }
//! ```
//!
//! or, when ingestion ends the request early, `{ status, reason }`.

use crate::pipeline::classify::ClassificationResult;
use crate::pipeline::ingest::{Halt, IngestResult};
use crate::pipeline::normalize::NormalizationResult;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Sentinel written for amounts whose source text could not be located.
pub const SOURCE_NOT_FOUND: &str = "source text not found";

/// Currency reported when no currency marker was seen.
pub const UNKNOWN_CURRENCY: &str = "UNKNOWN";

/// Outcome status shared by early-termination and final reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Ok,
    NoAmountsFound,
    Error,
}

impl ReportStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReportStatus::Ok => "ok",
            ReportStatus::NoAmountsFound => "no_amounts_found",
            ReportStatus::Error => "error",
        }
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Per-step sections ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestSummary {
    pub raw_tokens: Vec<String>,
    pub currency_hint: Option<String>,
    pub confidence: f64,
}

impl From<&IngestResult> for IngestSummary {
    fn from(r: &IngestResult) -> Self {
        Self {
            raw_tokens: r.raw_tokens.clone(),
            currency_hint: r.currency_hint.clone(),
            confidence: r.confidence,
        }
    }
}

/// A classified amount with the excerpt of the document it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalAmount {
    #[serde(rename = "type")]
    pub label: String,
    pub value: f64,
    /// `None` serialises as [`SOURCE_NOT_FOUND`].
    #[serde(with = "source_format")]
    pub source: Option<String>,
}

/// Step 4: reconciled amounts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalOutput {
    pub currency: String,
    pub amounts: Vec<FinalAmount>,
    pub status: ReportStatus,
}

/// Full four-step report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedReport {
    pub step1: IngestSummary,
    pub step2: NormalizationResult,
    pub step3: ClassificationResult,
    pub step4: FinalOutput,
}

/// What a request produces: a full report, or a status and reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtractionReport {
    Completed(Box<CompletedReport>),
    Halted { status: ReportStatus, reason: String },
}

impl ExtractionReport {
    pub fn status(&self) -> ReportStatus {
        match self {
            ExtractionReport::Completed(report) => report.step4.status,
            ExtractionReport::Halted { status, .. } => *status,
        }
    }

    /// `Some(reason)` for halted reports.
    pub fn reason(&self) -> Option<&str> {
        match self {
            ExtractionReport::Completed(_) => None,
            ExtractionReport::Halted { reason, .. } => Some(reason),
        }
    }

    pub fn completed(&self) -> Option<&CompletedReport> {
        match self {
            ExtractionReport::Completed(report) => Some(report),
            ExtractionReport::Halted { .. } => None,
        }
    }

    /// Generic `error` report for a failure outside the stage pipeline.
    pub fn processing_failure(message: impl fmt::Display) -> Self {
        ExtractionReport::Halted {
            status: ReportStatus::Error,
            reason: format!("Processing failed: {message}"),
        }
    }
}

impl From<Halt> for ExtractionReport {
    fn from(h: Halt) -> Self {
        ExtractionReport::Halted {
            status: h.status,
            reason: h.reason,
        }
    }
}

/// `Some(s)` ↔ `"text: '<s>'"`, `None` ↔ [`SOURCE_NOT_FOUND`].
mod source_format {
    use super::*;

    pub fn serialize<S: Serializer>(source: &Option<String>, s: S) -> Result<S::Ok, S::Error> {
        match source {
            Some(text) => s.serialize_str(&format!("text: '{text}'")),
            None => s.serialize_str(SOURCE_NOT_FOUND),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        let raw = String::deserialize(d)?;
        Ok(raw
            .strip_prefix("text: '")
            .and_then(|rest| rest.strip_suffix('\''))
            .map(str::to_string))
    }
}
