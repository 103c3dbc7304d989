//! Stage 2: raw tokens → numeric amounts.
//!
//! The LLM is asked to fix OCR confusions and decide grouping separators.
//! Any failure (transport, missing payload, malformed JSON) falls back to a
//! deterministic cleaner so the stage always produces a result.

use crate::error::StageError;
use crate::pipeline::confidence::{round2, score_normalization_confidence};
use crate::pipeline::ingest::IngestResult;
use crate::pipeline::llm::{LlmBackend, StructuredRequest};
use crate::pipeline::tokenize::parse_leading_float;
use crate::progress::Stage;
use crate::prompts::{normalization_query, normalization_schema, NORMALIZATION_SYSTEM_PROMPT};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationResult {
    pub normalized_amounts: Vec<f64>,
    /// Rounded to two decimals.
    pub normalization_confidence: f64,
    /// Why the fallback ran, if it did.
    #[serde(skip)]
    pub fallback_reason: Option<String>,
}

impl NormalizationResult {
    pub fn llm_succeeded(&self) -> bool {
        self.fallback_reason.is_none()
    }
}

/// Normalise the tokens of `input`, falling back to [`clean_token`].
pub async fn normalize(llm: &dyn LlmBackend, input: &IngestResult) -> NormalizationResult {
    let request = StructuredRequest {
        stage: Stage::Normalize,
        system_instruction: NORMALIZATION_SYSTEM_PROMPT.to_string(),
        user_prompt: normalization_query(&input.raw_text, &input.raw_tokens),
        schema: normalization_schema(),
    };

    let (normalized_amounts, fallback_reason) = match request_amounts(llm, &request).await {
        Ok(amounts) => {
            info!("Normalization: {} amounts from {}", amounts.len(), llm.name());
            (amounts, None)
        }
        Err(e) => {
            warn!("LLM normalization failed: {}, using fallback", e);
            (fallback_normalize(&input.raw_tokens), Some(e.to_string()))
        }
    };

    let confidence = score_normalization_confidence(
        &input.raw_tokens,
        &normalized_amounts,
        fallback_reason.is_none(),
    );

    NormalizationResult {
        normalized_amounts,
        normalization_confidence: round2(confidence),
        fallback_reason,
    }
}

async fn request_amounts(
    llm: &dyn LlmBackend,
    request: &StructuredRequest,
) -> Result<Vec<f64>, StageError> {
    let text = llm.generate(request).await?;
    serde_json::from_str(&text).map_err(|e| StageError::MalformedPayload {
        stage: request.stage.to_string(),
        detail: e.to_string(),
    })
}

/// Deterministic cleaner: drop commas, keep digits and dots, parse the
/// leading number.
pub fn clean_token(token: &str) -> Option<f64> {
    let cleaned: String = token
        .trim()
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    parse_leading_float(&cleaned)
}

/// Apply [`clean_token`] to every token, dropping the unparseable ones.
pub fn fallback_normalize(tokens: &[String]) -> Vec<f64> {
    tokens.iter().filter_map(|t| clean_token(t)).collect()
}
