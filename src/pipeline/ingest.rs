//! Stage 1: turn text or an image into raw numeric tokens.
//!
//! Text input is trimmed and tokenised directly. Image input goes through the
//! [`TextDetector`], its words are regrouped into lines, and the joined lines
//! are tokenised. Either way the stage either produces an [`IngestResult`] or
//! a [`Halt`] that ends the request early with a status and a reason.

use crate::error::{AmountError, OcrError};
use crate::output::ReportStatus;
use crate::pipeline::confidence::{round2, score_ocr_confidence, score_text_confidence};
use crate::pipeline::ocr::{detect_text, group_words_into_lines, TextAnnotation, TextDetector};
use crate::pipeline::tokenize::tokenize;
use image::ImageFormat;
use tracing::{debug, info};

/// A document handed to the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum RawInput {
    Text(String),
    Image(Vec<u8>),
}

impl RawInput {
    /// Classify raw bytes: recognised image formats become [`RawInput::Image`],
    /// valid UTF-8 becomes [`RawInput::Text`].
    pub fn sniff(bytes: Vec<u8>) -> Result<Self, AmountError> {
        if image::guess_format(&bytes).is_ok() {
            return Ok(RawInput::Image(bytes));
        }
        String::from_utf8(bytes)
            .map(RawInput::Text)
            .map_err(|_| AmountError::InvalidInput {
                reason: "input is neither a supported image nor UTF-8 text".into(),
            })
    }

    pub fn modality(&self) -> &'static str {
        match self {
            RawInput::Text(_) => "text",
            RawInput::Image(_) => "image",
        }
    }
}

/// Output of a successful ingest.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestResult {
    pub raw_text: String,
    pub raw_tokens: Vec<String>,
    pub currency_hint: Option<String>,
    /// Rounded to two decimals.
    pub confidence: f64,
    /// Present only for image input.
    pub detections: Option<Vec<TextAnnotation>>,
}

/// Early termination of a request.
#[derive(Debug, Clone, PartialEq)]
pub struct Halt {
    pub status: ReportStatus,
    pub reason: String,
}

impl Halt {
    fn no_amounts(reason: impl Into<String>) -> Self {
        Self {
            status: ReportStatus::NoAmountsFound,
            reason: reason.into(),
        }
    }
}

/// Reject oversized payloads and bytes that are not a known image format.
pub fn validate_image(bytes: &[u8], max_bytes: usize) -> Result<ImageFormat, AmountError> {
    if bytes.len() > max_bytes {
        return Err(AmountError::ImageTooLarge {
            size: bytes.len(),
            limit: max_bytes,
        });
    }
    image::guess_format(bytes).map_err(|e| AmountError::UnsupportedImage {
        detail: Some(e.to_string()),
    })
}

/// Ingest plain text.
pub fn ingest_text(text: &str) -> Result<IngestResult, Halt> {
    let raw_text = text.trim();
    if raw_text.is_empty() {
        return Err(Halt::no_amounts("Empty text provided"));
    }

    let tokens = tokenize(raw_text);
    if tokens.tokens.is_empty() {
        return Err(Halt::no_amounts("document contains text but no numbers"));
    }

    let confidence = round2(score_text_confidence(raw_text, &tokens.tokens));
    debug!("text ingest: {} tokens", tokens.tokens.len());

    Ok(IngestResult {
        raw_text: raw_text.to_string(),
        raw_tokens: tokens.tokens,
        currency_hint: tokens.currency_hint,
        confidence,
        detections: None,
    })
}

/// Ingest an image through the OCR capability.
pub async fn ingest_image(detector: &dyn TextDetector, image: &[u8]) -> Result<IngestResult, Halt> {
    let detections = match detect_text(detector, image).await {
        Ok(d) => d,
        Err(OcrError::NoText) => {
            return Err(Halt::no_amounts(format!(
                "No structured text detected by {}",
                detector.name()
            )))
        }
        Err(OcrError::Provider(msg)) => {
            return Err(Halt {
                status: ReportStatus::Error,
                reason: format!("{} failed: {}", detector.name(), msg),
            })
        }
    };

    let lines = group_words_into_lines(&detections[1..]);
    let raw_text = lines
        .iter()
        .map(|l| l.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    info!("OCR: {} words in {} lines", detections.len() - 1, lines.len());

    let tokens = tokenize(&raw_text);
    if tokens.tokens.is_empty() {
        return Err(Halt::no_amounts("document contains text but no numbers"));
    }

    let confidence = round2(score_ocr_confidence(&detections, &tokens.tokens));

    Ok(IngestResult {
        raw_text,
        raw_tokens: tokens.tokens,
        currency_hint: tokens.currency_hint,
        confidence,
        detections: Some(detections),
    })
}
