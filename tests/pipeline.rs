//! Pipeline integration tests with in-process LLM and OCR stand-ins.
//!
//! No network: every external capability is a fake injected through
//! `ExtractionConfigBuilder::llm` / `::ocr`.

use amount_scan::{
    extract, extract_image, extract_text, BoundingPoly, ExtractionConfig,
    ExtractionProgressCallback, ExtractionReport, LlmBackend, OcrError, RawInput, ReportStatus,
    Stage, StageError, StructuredRequest, TextAnnotation, TextDetector, Vertex,
};
use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio_test::assert_ok;

const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Answers each stage with a canned reply, or fails when none is set.
#[derive(Default)]
struct ScriptedLlm {
    normalize: Option<&'static str>,
    classify: Option<&'static str>,
    calls: AtomicUsize,
}

#[async_trait]
impl LlmBackend for ScriptedLlm {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: &StructuredRequest) -> Result<String, StageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = match request.stage {
            Stage::Normalize => self.normalize,
            Stage::Classify => self.classify,
            _ => None,
        };
        reply.map(str::to_string).ok_or(StageError::CallFailed {
            detail: "API call failed after 3 attempts. Status: 503".into(),
        })
    }
}

struct FakeOcr(Result<Vec<TextAnnotation>, OcrError>);

#[async_trait]
impl TextDetector for FakeOcr {
    fn name(&self) -> &str {
        "Google Cloud Vision"
    }

    async fn detect(&self, _image: &[u8]) -> Result<Vec<TextAnnotation>, OcrError> {
        self.0.clone()
    }
}

fn word(text: &str, x: i32, y: i32) -> TextAnnotation {
    TextAnnotation {
        description: text.to_string(),
        bounding_poly: BoundingPoly {
            vertices: vec![
                Vertex { x, y },
                Vertex { x: x + 30, y },
                Vertex { x: x + 30, y: y + 10 },
                Vertex { x, y: y + 10 },
            ],
        },
    }
}

fn config_with(llm: Arc<ScriptedLlm>) -> ExtractionConfig {
    ExtractionConfig::builder()
        .llm(llm as Arc<dyn LlmBackend>)
        .build()
        .unwrap()
}

#[derive(Default)]
struct EventLog(Mutex<Vec<String>>);

impl ExtractionProgressCallback for EventLog {
    fn on_stage_start(&self, stage: Stage) {
        self.0.lock().unwrap().push(format!("start:{}", stage.number()));
    }
    fn on_stage_complete(&self, stage: Stage, _confidence: Option<f64>) {
        self.0.lock().unwrap().push(format!("done:{}", stage.number()));
    }
    fn on_fallback(&self, stage: Stage, _reason: &str) {
        self.0.lock().unwrap().push(format!("fallback:{}", stage.number()));
    }
    fn on_extraction_complete(&self, status: &str) {
        self.0.lock().unwrap().push(format!("end:{status}"));
    }
}

// ── Text input ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn hospital_bill_without_llm() {
    let llm = Arc::new(ScriptedLlm::default());
    let text = "Hospital Bill\nConsultation: 500\nTax: 50\nTotal: 550";
    let report = assert_ok!(extract_text(text, &config_with(llm.clone())).await);

    let done = report.completed().expect("completed report");
    assert_eq!(done.step1.raw_tokens, vec!["500", "50", "550"]);
    assert_eq!(done.step1.currency_hint, None);
    assert_eq!(done.step2.normalized_amounts, vec![500.0, 50.0, 550.0]);
    assert_eq!(done.step2.normalization_confidence, 0.7);
    assert!(done.step3.amounts.iter().all(|a| a.label == "unclassified"));

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(
        json["step4"],
        json!({
            "currency": "UNKNOWN",
            "amounts": [
                {"type": "unclassified", "value": 500.0, "source": "text: 'Consultation: 500'"},
                {"type": "unclassified", "value": 50.0, "source": "text: 'Tax: 50'"},
                {"type": "unclassified", "value": 550.0, "source": "text: 'Total: 550'"}
            ],
            "status": "ok"
        })
    );
    // one attempt per LLM stage
    assert_eq!(llm.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn llm_success_path() {
    let llm = Arc::new(ScriptedLlm {
        normalize: Some("[1250, 125]"),
        classify: Some(r#"[{"type":"total_bill","value":1250},{"type":"tax","value":125}]"#),
        ..Default::default()
    });
    let report = extract_text("Total: Rs. 1,250.00, Tax: Rs. 125.00", &config_with(llm))
        .await
        .unwrap();

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["step1"]["raw_tokens"], json!(["1,250.00", "125.00"]));
    assert_eq!(json["step1"]["currency_hint"], "Rs.");
    assert_eq!(json["step2"]["normalization_confidence"], 0.95);
    assert_eq!(
        json["step3"]["amounts"],
        json!([{"type": "total_bill", "value": 1250.0}, {"type": "tax", "value": 125.0}])
    );
    assert_eq!(json["step4"]["currency"], "Rs.");
    assert_eq!(json["step4"]["amounts"][0]["source"], "text: 'Total: Rs. 1,250.00'");
    assert_eq!(json["step4"]["amounts"][1]["source"], "text: 'Tax: Rs. 125.00'");

    let c = json["step3"]["confidence"].as_f64().unwrap();
    assert!((0.1..=0.95).contains(&c));
}

#[tokio::test]
async fn classification_may_drop_amounts() {
    let llm = Arc::new(ScriptedLlm {
        normalize: Some("[500, 50, 550]"),
        classify: Some(r#"[{"type":"total_bill","value":550}]"#),
        ..Default::default()
    });
    let report = extract_text("Consultation: 500\nTax: 50\nTotal: 550", &config_with(llm))
        .await
        .unwrap();
    let done = report.completed().unwrap();
    assert_eq!(done.step2.normalized_amounts.len(), 3);
    assert_eq!(done.step4.amounts.len(), 1);
    assert_eq!(done.step4.amounts[0].source.as_deref(), Some("Total: 550"));
}

#[tokio::test]
async fn empty_input_stops_at_ingest() {
    let llm = Arc::new(ScriptedLlm::default());
    let report = extract_text("   ", &config_with(llm.clone())).await.unwrap();
    assert_eq!(
        serde_json::to_value(&report).unwrap(),
        json!({"status": "no_amounts_found", "reason": "Empty text provided"})
    );
    assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn text_without_numbers_never_reaches_the_llm() {
    let llm = Arc::new(ScriptedLlm::default());
    let report = extract_text("Thank you for your visit", &config_with(llm.clone()))
        .await
        .unwrap();
    assert_eq!(report.status(), ReportStatus::NoAmountsFound);
    assert_eq!(report.reason(), Some("document contains text but no numbers"));
    assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn malformed_llm_output_falls_back_per_stage() {
    let llm = Arc::new(ScriptedLlm {
        normalize: Some("not json"),
        classify: Some(r#"[{"type":"paid","value":20}]"#),
        ..Default::default()
    });
    let log = Arc::new(EventLog::default());
    let config = ExtractionConfig::builder()
        .llm(llm as Arc<dyn LlmBackend>)
        .progress_callback(log.clone() as Arc<dyn ExtractionProgressCallback>)
        .build()
        .unwrap();

    let report = extract_text("Paid: 20", &config).await.unwrap();
    let done = report.completed().unwrap();
    assert_eq!(done.step2.normalized_amounts, vec![20.0]);
    assert_eq!(done.step3.amounts[0].label, "paid");

    assert_eq!(
        *log.0.lock().unwrap(),
        vec![
            "start:1", "done:1", "start:2", "fallback:2", "done:2", "start:3", "done:3",
            "start:4", "done:4", "end:ok"
        ]
    );
}

// ── Image input ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn receipt_image_end_to_end() {
    let ocr = FakeOcr(Ok(vec![
        word("Fee 20\nFee 20\nTotal 40", 0, 0),
        word("Total", 0, 60),
        word("40", 60, 61),
        word("Fee", 0, 0),
        word("20", 60, 1),
        word("Fee", 0, 30),
        word("20", 60, 31),
    ]));
    let llm = Arc::new(ScriptedLlm {
        normalize: Some("[20, 20, 40]"),
        classify: Some(
            r#"[{"type":"fee","value":20},{"type":"fee","value":20},{"type":"fee","value":20},{"type":"total_bill","value":40}]"#,
        ),
        ..Default::default()
    });
    let config = ExtractionConfig::builder()
        .llm(llm as Arc<dyn LlmBackend>)
        .ocr(Arc::new(ocr))
        .build()
        .unwrap();

    let report = extract_image(PNG, &config).await.unwrap();
    let done = report.completed().unwrap();
    assert_eq!(done.step1.raw_tokens, vec!["20", "20", "40"]);

    let sources: Vec<Option<&str>> = done
        .step4
        .amounts
        .iter()
        .map(|a| a.source.as_deref())
        .collect();
    // two "Fee 20" spans exist; a third 20 has nowhere left to go
    assert_eq!(
        sources,
        vec![Some("Fee 20"), Some("Fee 20"), None, Some("Total 40")]
    );
}

#[tokio::test]
async fn one_annotation_ocr_result_is_no_amounts_found() {
    let llm = Arc::new(ScriptedLlm::default());
    let config = ExtractionConfig::builder()
        .llm(llm.clone() as Arc<dyn LlmBackend>)
        .ocr(Arc::new(FakeOcr(Ok(vec![word("smudge", 0, 0)]))))
        .build()
        .unwrap();

    let report = extract(RawInput::Image(PNG.to_vec()), &config).await.unwrap();
    assert_eq!(
        report,
        ExtractionReport::Halted {
            status: ReportStatus::NoAmountsFound,
            reason: "No structured text detected by Google Cloud Vision".into(),
        }
    );
    assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn ocr_provider_failure_is_reported_not_raised() {
    let config = ExtractionConfig::builder()
        .ocr(Arc::new(FakeOcr(Err(OcrError::Provider("PERMISSION_DENIED".into())))))
        .build()
        .unwrap();

    let report = extract_image(PNG, &config).await.unwrap();
    assert_eq!(report.status(), ReportStatus::Error);
    assert_eq!(
        report.reason(),
        Some("Google Cloud Vision failed: PERMISSION_DENIED")
    );
}

#[tokio::test]
async fn oversized_image_is_rejected() {
    let config = ExtractionConfig::builder()
        .ocr(Arc::new(FakeOcr(Ok(Vec::new()))))
        .max_image_bytes(8)
        .build()
        .unwrap();
    let err = extract_image(PNG, &config).await.unwrap_err();
    assert!(err.to_string().contains("limit is 8 bytes"), "got: {err}");
}
