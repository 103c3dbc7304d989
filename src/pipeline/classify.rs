//! Stage 3: attach a semantic label to each normalised amount.

use crate::error::StageError;
use crate::pipeline::confidence::{round2, score_classification_confidence};
use crate::pipeline::ingest::IngestResult;
use crate::pipeline::llm::{LlmBackend, StructuredRequest};
use crate::pipeline::normalize::NormalizationResult;
use crate::progress::Stage;
use crate::prompts::{classification_query, classification_schema, CLASSIFICATION_SYSTEM_PROMPT};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Label used when no classification is available.
pub const UNCLASSIFIED: &str = "unclassified";

/// A labelled amount, serialised as `{"type": …, "value": …}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedAmount {
    #[serde(rename = "type")]
    pub label: String,
    pub value: f64,
}

impl ClassifiedAmount {
    pub fn new(label: impl Into<String>, value: f64) -> Self {
        Self {
            label: label.into(),
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub amounts: Vec<ClassifiedAmount>,
    /// Rounded to two decimals.
    pub confidence: f64,
    #[serde(skip)]
    pub fallback_reason: Option<String>,
}

impl ClassificationResult {
    pub fn llm_succeeded(&self) -> bool {
        self.fallback_reason.is_none()
    }
}

/// Label every normalised amount; on failure everything is [`UNCLASSIFIED`].
pub async fn classify(
    llm: &dyn LlmBackend,
    input: &IngestResult,
    normalized: &NormalizationResult,
) -> ClassificationResult {
    let request = StructuredRequest {
        stage: Stage::Classify,
        system_instruction: CLASSIFICATION_SYSTEM_PROMPT.to_string(),
        user_prompt: classification_query(&input.raw_text, &normalized.normalized_amounts),
        schema: classification_schema(),
    };

    let (amounts, fallback_reason) = match request_labels(llm, &request).await {
        Ok(amounts) => {
            info!("Classification: {} labelled amounts from {}", amounts.len(), llm.name());
            (amounts, None)
        }
        Err(e) => {
            warn!("LLM classification failed: {}, using fallback", e);
            (
                fallback_classify(&normalized.normalized_amounts),
                Some(e.to_string()),
            )
        }
    };

    let confidence =
        score_classification_confidence(&amounts, &input.raw_text, fallback_reason.is_none());

    ClassificationResult {
        amounts,
        confidence: round2(confidence),
        fallback_reason,
    }
}

async fn request_labels(
    llm: &dyn LlmBackend,
    request: &StructuredRequest,
) -> Result<Vec<ClassifiedAmount>, StageError> {
    let text = llm.generate(request).await?;
    serde_json::from_str(&text).map_err(|e| StageError::MalformedPayload {
        stage: request.stage.to_string(),
        detail: e.to_string(),
    })
}

/// Pair every value with [`UNCLASSIFIED`], preserving order.
pub fn fallback_classify(values: &[f64]) -> Vec<ClassifiedAmount> {
    values
        .iter()
        .map(|v| ClassifiedAmount::new(UNCLASSIFIED, *v))
        .collect()
}
