//! OCR adapter: text-detection capability and word-to-line grouping.
//!
//! The detector is a trait object so tests (and alternative providers) can
//! stand in for Google Cloud Vision. Whatever the provider, its output follows
//! the Vision `textAnnotations` shape: index 0 is the text of the whole image,
//! every following entry is one word with a four-corner bounding polygon.

use crate::error::OcrError;
use crate::pipeline::rpc::API_KEY_HEADER;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::time::Duration;
use tracing::{debug, info};

/// Vertical distance (in image pixels) under which two words share a line.
pub const LINE_TOLERANCE: i32 = 10;

/// A corner of a bounding polygon. Vision omits zero coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vertex {
    #[serde(default)]
    pub x: i32,
    #[serde(default)]
    pub y: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingPoly {
    #[serde(default)]
    pub vertices: Vec<Vertex>,
}

/// One OCR annotation: the whole-image text (index 0) or a single word.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextAnnotation {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub bounding_poly: BoundingPoly,
}

impl TextAnnotation {
    /// Top-left corner, or the origin when the polygon is empty.
    pub fn anchor(&self) -> Vertex {
        self.bounding_poly.vertices.first().copied().unwrap_or_default()
    }
}

/// A reconstructed line of text in reading order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrLine {
    pub text: String,
}

/// External text-detection capability.
#[async_trait]
pub trait TextDetector: Send + Sync {
    /// Provider name used in status reasons, e.g. "Google Cloud Vision".
    fn name(&self) -> &str;

    /// Run text detection on raw image bytes.
    async fn detect(&self, image: &[u8]) -> Result<Vec<TextAnnotation>, OcrError>;
}

/// Invoke the detector and require at least one word annotation.
///
/// A result with only the whole-image entry (or nothing) is
/// [`OcrError::NoText`]; provider failures pass through unchanged.
pub async fn detect_text(
    detector: &dyn TextDetector,
    image: &[u8],
) -> Result<Vec<TextAnnotation>, OcrError> {
    let detections = detector.detect(image).await?;
    debug!("{}: {} annotations", detector.name(), detections.len());
    if detections.len() <= 1 {
        return Err(OcrError::NoText);
    }
    Ok(detections)
}

/// Group word annotations into lines, top-to-bottom then left-to-right.
///
/// Words whose top edges are within [`LINE_TOLERANCE`] are ordered by x;
/// a new line starts whenever a word drifts more than the tolerance from the
/// first word of the current line.
pub fn group_words_into_lines(words: &[TextAnnotation]) -> Vec<OcrLine> {
    if words.is_empty() {
        return Vec::new();
    }

    let mut sorted: Vec<&TextAnnotation> = words.iter().collect();
    band_sort(&mut sorted);

    let mut lines = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_y = sorted[0].anchor().y;

    for word in sorted {
        if word.description.is_empty() {
            continue;
        }
        let y = word.anchor().y;
        if (y - current_y).abs() > LINE_TOLERANCE {
            lines.push(OcrLine {
                text: current.join(" "),
            });
            current = vec![word.description.as_str()];
            current_y = y;
        } else {
            current.push(word.description.as_str());
        }
    }
    lines.push(OcrLine {
        text: current.join(" "),
    });

    lines
}

/// Order by band: same band (|Δy| < tolerance) compares x, otherwise y.
///
/// The comparison is not transitive across neighbouring bands, which the
/// standard sorts may reject, so this is a stable insertion sort.
fn band_sort(words: &mut [&TextAnnotation]) {
    fn compare(a: &TextAnnotation, b: &TextAnnotation) -> Ordering {
        let (pa, pb) = (a.anchor(), b.anchor());
        if (pa.y - pb.y).abs() < LINE_TOLERANCE {
            pa.x.cmp(&pb.x)
        } else {
            pa.y.cmp(&pb.y)
        }
    }

    for i in 1..words.len() {
        let mut j = i;
        while j > 0 && compare(words[j - 1], words[j]) == Ordering::Greater {
            words.swap(j - 1, j);
            j -= 1;
        }
    }
}

// ── Google Cloud Vision ──────────────────────────────────────────────────────

/// [`TextDetector`] backed by the Cloud Vision `images:annotate` REST API.
pub struct VisionDetector {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl VisionDetector {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, OcrError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| OcrError::Provider(e.without_url().to_string()))?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        })
    }
}

#[derive(Deserialize)]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<AnnotateImageResponse>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateImageResponse {
    #[serde(default)]
    text_annotations: Vec<TextAnnotation>,
    error: Option<VisionStatus>,
}

#[derive(Deserialize)]
struct VisionStatus {
    #[serde(default)]
    message: String,
}

#[async_trait]
impl TextDetector for VisionDetector {
    fn name(&self) -> &str {
        "Google Cloud Vision"
    }

    async fn detect(&self, image: &[u8]) -> Result<Vec<TextAnnotation>, OcrError> {
        let body = serde_json::json!({
            "requests": [{
                "image": { "content": STANDARD.encode(image) },
                "features": [{ "type": "TEXT_DETECTION" }]
            }]
        });
        info!("Sending {} bytes to Cloud Vision", image.len());

        let response = self
            .http
            .post(&self.endpoint)
            .header(API_KEY_HEADER, self.api_key.as_str())
            .json(&body)
            .send()
            .await
            .map_err(|e| OcrError::Provider(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(OcrError::Provider(format!("HTTP {status}: {detail}")));
        }

        let parsed: AnnotateResponse = response
            .json()
            .await
            .map_err(|e| OcrError::Provider(format!("invalid response: {}", e.without_url())))?;

        let first = parsed.responses.into_iter().next();
        match first {
            Some(AnnotateImageResponse {
                error: Some(err), ..
            }) => Err(OcrError::Provider(err.message)),
            Some(r) => Ok(r.text_annotations),
            None => Ok(Vec::new()),
        }
    }
}
