//! Error types for the amount-scan library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`AmountError`] — **Fatal**: the extraction cannot proceed at all
//!   (oversized or unreadable image, no OCR provider configured, bad
//!   configuration). Returned as `Err(AmountError)` from the top-level
//!   `extract*` functions.
//!
//! * [`StageError`] — **Non-fatal**: an LLM-assisted stage failed (network
//!   error, retries exhausted, malformed structured output). The stage logs it
//!   and falls back to its deterministic path, so it never reaches the caller.
//!
//! Two leaf errors sit underneath: [`CallFailure`] for a single resilient HTTP
//! call and [`OcrError`] for the text-detection capability. An OCR failure
//! ends the request with a `status: "error"` report rather than an `Err`.

use thiserror::Error;

/// All fatal errors returned by the amount-scan library.
///
/// LLM-stage failures use [`StageError`] and are recovered inside the
/// pipeline rather than propagated here.
#[derive(Debug, Error)]
pub enum AmountError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The input cannot be processed (wrong type, unreadable file, …).
    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    /// Image payload exceeds the configured upload limit.
    #[error("Image is {size} bytes; the limit is {limit} bytes")]
    ImageTooLarge { size: usize, limit: usize },

    /// The bytes are not an image format we can hand to the OCR provider.
    #[error("Unsupported image format{}", detail.as_deref().map(|d| format!(": {d}")).unwrap_or_default())]
    UnsupportedImage { detail: Option<String> },

    // ── Provider errors ───────────────────────────────────────────────────
    /// The OCR or LLM provider is not initialised (missing API key etc.).
    #[error("Provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal failure of an LLM-assisted stage.
///
/// Always recovered by the stage's deterministic fallback.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum StageError {
    /// The call to the LLM failed after every retry.
    #[error("LLM call failed: {detail}")]
    CallFailed { detail: String },

    /// The response had no structured payload where one was required.
    #[error("LLM returned no structured data for {stage}")]
    MissingPayload { stage: String },

    /// The structured payload did not match the requested schema.
    #[error("LLM returned malformed {stage} data: {detail}")]
    MalformedPayload { stage: String, detail: String },

    /// No LLM backend is available; the stage runs on its fallback.
    #[error("no LLM backend configured")]
    Disabled,
}

/// Failure of a single resilient HTTP call.
#[derive(Debug, Error)]
pub enum CallFailure {
    /// Connection, TLS, timeout or body-read error. Stored without its URL.
    #[error("request failed: {0}")]
    Transport(reqwest::Error),

    /// The server answered with a non-success status.
    #[error("HTTP {status}")]
    Status { status: u16 },

    /// The final attempt still returned a non-success status.
    #[error("API call failed after {attempts} attempts. Status: {status}")]
    Exhausted { attempts: u32, status: u16 },

    /// The body of a successful response was not JSON.
    #[error("response body is not valid JSON: {0}")]
    InvalidBody(String),
}

impl From<reqwest::Error> for CallFailure {
    fn from(e: reqwest::Error) -> Self {
        CallFailure::Transport(e.without_url())
    }
}

/// Failure of the text-detection capability.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum OcrError {
    /// The provider raised or returned an error payload.
    #[error("{0}")]
    Provider(String),

    /// Only the whole-image annotation (or nothing) came back.
    #[error("no text detected")]
    NoText,
}
