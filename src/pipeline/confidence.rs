//! Heuristic confidence scores for every pipeline stage.
//!
//! None of these are calibrated probabilities. Each score starts from a base
//! value, accumulates small lexical/structural adjustments and is clamped to
//! a stage-specific range. Degenerate inputs short-circuit to a fixed minimum
//! that sits *below* the clamp floor so callers can tell "nothing to score"
//! apart from "scored poorly".
//!
//! All functions here are pure; rounding to two decimals happens in the
//! stages via [`round2`].

use crate::pipeline::classify::ClassifiedAmount;
use crate::pipeline::ocr::TextAnnotation;
use crate::pipeline::tokenize::parse_leading_float;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

/// Keywords suggesting the text is a bill or receipt.
const DOCUMENT_KEYWORDS: &[&str] = &[
    "total",
    "amount",
    "bill",
    "receipt",
    "invoice",
    "paid",
    "due",
    "tax",
    "subtotal",
    "discount",
    "fee",
    "charge",
    "balance",
    "prescription",
    "consultation",
    "treatment",
];

/// Keywords that make contextual labelling of amounts plausible.
const CLASSIFICATION_KEYWORDS: &[&str] = &[
    "bill",
    "total",
    "amount",
    "paid",
    "due",
    "tax",
    "fee",
    "charge",
    "prescription",
    "consultation",
    "treatment",
    "hospital",
    "clinic",
    "medical",
    "doctor",
    "patient",
    "invoice",
];

/// Label fragments of well-known financial categories.
const COMMON_LABELS: &[&str] = &["total", "paid", "due", "tax", "fee", "copay"];

static RE_GROUPED: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{1,3}(?:,\d{3})*(?:\.\d{2})?$").unwrap());
static RE_PLAIN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+(?:\.\d{1,2})?$").unwrap());

/// Round to two decimal places, the precision every score is surfaced at.
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Confidence that plain `text` is a financial document with usable amounts.
///
/// Range `[0.2, 0.95]`; 0.1 for blank text and 0.15 when no tokens were found.
pub fn score_text_confidence(text: &str, tokens: &[String]) -> f64 {
    if text.trim().is_empty() {
        return 0.1;
    }
    if tokens.is_empty() {
        return 0.15;
    }

    let mut confidence = 0.4;

    let lines = non_empty_lines(text);
    let total_words = text.split_whitespace().count();
    let avg_words_per_line = total_words as f64 / lines.len().max(1) as f64;

    if (2.0..=15.0).contains(&avg_words_per_line) {
        confidence += 0.15;
    } else if avg_words_per_line < 1.0 {
        confidence -= 0.1;
    }

    confidence += 0.2;
    confidence += token_format_bonus(tokens);

    let lower = text.to_lowercase();
    let found_keywords = DOCUMENT_KEYWORDS
        .iter()
        .filter(|k| lower.contains(*k))
        .count();
    if found_keywords >= 2 {
        confidence += 0.15;
    } else if found_keywords == 1 {
        confidence += 0.05;
    }

    let total_chars = text.chars().count();
    if total_chars < 20 {
        confidence -= 0.2;
    } else if (50..=2000).contains(&total_chars) {
        confidence += 0.1;
    }

    let lines_with_numbers = lines
        .iter()
        .filter(|l| l.chars().any(|c| c.is_ascii_digit()))
        .count();
    if lines_with_numbers as f64 / lines.len().max(1) as f64 >= 0.3 {
        confidence += 0.1;
    }

    let special = text.chars().filter(|c| is_noise_char(*c)).count();
    if special as f64 / total_chars.max(1) as f64 > 0.3 {
        confidence -= 0.1;
    }

    confidence.clamp(0.2, 0.95)
}

/// Confidence for OCR output, weighted for recognition noise.
///
/// `detections[0]` is the whole-image annotation; the rest are words.
/// Range `[0.05, 0.98]`; 0.1 when there is at most one detection.
pub fn score_ocr_confidence(detections: &[TextAnnotation], tokens: &[String]) -> f64 {
    if detections.len() <= 1 {
        return 0.1;
    }

    let full_text = &detections[0].description;
    let words = detections.len() - 1;

    let mut confidence = 0.3;

    let lines = non_empty_lines(full_text);
    let avg_words_per_line = words as f64 / lines.len().max(1) as f64;

    if (2.0..=15.0).contains(&avg_words_per_line) {
        confidence += 0.15;
    } else if avg_words_per_line < 1.0 {
        confidence -= 0.2;
    }

    if tokens.is_empty() {
        confidence -= 0.3;
    } else {
        confidence += 0.2;
        confidence += token_format_bonus(tokens);
    }

    confidence.clamp(0.05, 0.98)
}

/// Confidence in the normalised amounts.
///
/// Range `[0.1, 0.95]`; 0.1 when there are no raw tokens to compare against.
pub fn score_normalization_confidence(
    raw_tokens: &[String],
    normalized_amounts: &[f64],
    llm_succeeded: bool,
) -> f64 {
    if raw_tokens.is_empty() {
        return 0.1;
    }

    let mut confidence = 0.3;

    if llm_succeeded {
        confidence += 0.4;
    }

    let token_ratio = normalized_amounts.len() as f64 / raw_tokens.len() as f64;
    if (0.5..=1.0).contains(&token_ratio) {
        confidence += 0.2;
    } else if token_ratio < 0.2 {
        confidence -= 0.2;
    }

    if !normalized_amounts.is_empty() {
        let valid = normalized_amounts
            .iter()
            .filter(|n| n.is_finite() && **n > 0.0 && **n < 1_000_000.0)
            .count();
        confidence += valid as f64 / normalized_amounts.len() as f64 * 0.2;

        let unique: HashSet<u64> = normalized_amounts.iter().map(|n| n.to_bits()).collect();
        if (unique.len() as f64) < normalized_amounts.len() as f64 * 0.8 {
            confidence -= 0.1;
        }
    }

    confidence.clamp(0.1, 0.95)
}

/// Confidence in the semantic labels.
///
/// Range `[0.1, 0.95]`; exactly 0.1 when there are no amounts.
pub fn score_classification_confidence(
    amounts: &[ClassifiedAmount],
    raw_text: &str,
    llm_succeeded: bool,
) -> f64 {
    if amounts.is_empty() {
        return 0.1;
    }

    let mut confidence = 0.2;

    if llm_succeeded {
        confidence += 0.3;
    }

    let text = raw_text.to_lowercase();
    let keyword_matches = CLASSIFICATION_KEYWORDS
        .iter()
        .filter(|k| text.contains(*k))
        .count();
    confidence += (keyword_matches as f64 * 0.05).min(0.3);

    let unique_labels: HashSet<&str> = amounts.iter().map(|a| a.label.as_str()).collect();
    if unique_labels.len() > 1 && unique_labels.len() as f64 <= amounts.len() as f64 * 0.8 {
        confidence += 0.15;
    }

    let unclassified = amounts
        .iter()
        .filter(|a| a.label == "unclassified" || a.label == "unknown")
        .count();
    confidence -= unclassified as f64 / amounts.len() as f64 * 0.2;

    let has_common_label = amounts.iter().any(|a| {
        let label = a.label.to_lowercase();
        COMMON_LABELS.iter().any(|c| label.contains(c))
    });
    if has_common_label {
        confidence += 0.1;
    }

    confidence.clamp(0.1, 0.95)
}

// ── Shared signals ───────────────────────────────────────────────────────────

fn non_empty_lines(text: &str) -> Vec<&str> {
    text.split('\n').filter(|l| !l.trim().is_empty()).collect()
}

/// Everything outside letters, digits, whitespace and `.,-:()`.
fn is_noise_char(c: char) -> bool {
    !(c.is_ascii_alphanumeric() || c.is_whitespace() || matches!(c, '.' | ',' | '-' | ':' | '(' | ')'))
}

/// Grouped-format ratio bonus (up to 0.2) plus 0.1 when any token is a
/// plausible amount. Shared by text and OCR scoring.
fn token_format_bonus(tokens: &[String]) -> f64 {
    let mut bonus = 0.0;

    let valid = tokens.iter().filter(|t| is_valid_numeric_format(t)).count();
    bonus += valid as f64 / tokens.len().max(1) as f64 * 0.2;

    let has_reasonable = tokens.iter().any(|t| {
        let digits: String = t.chars().filter(|c| c.is_ascii_digit() || *c == '.').collect();
        parse_leading_float(&digits).is_some_and(|n| (0.01..=100_000.0).contains(&n))
    });
    if has_reasonable {
        bonus += 0.1;
    }

    bonus
}

fn is_valid_numeric_format(token: &str) -> bool {
    let cleaned: String = token
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();
    RE_GROUPED.is_match(&cleaned) || RE_PLAIN.is_match(&cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ocr::{BoundingPoly, Vertex};

    fn toks(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn word(text: &str) -> TextAnnotation {
        TextAnnotation {
            description: text.to_string(),
            bounding_poly: BoundingPoly {
                vertices: vec![Vertex { x: 0, y: 0 }; 4],
            },
        }
    }

    #[test]
    fn text_short_circuits() {
        assert_eq!(score_text_confidence("   ", &[]), 0.1);
        assert_eq!(score_text_confidence("hello world", &[]), 0.15);
    }

    #[test]
    fn bill_text_scores_high() {
        let text = "Hospital Bill\nConsultation: 500\nTax: 50\nTotal: 550";
        let score = score_text_confidence(text, &toks(&["500", "50", "550"]));
        assert!(score >= 0.9, "got {score}");
        assert!(score <= 0.95);
    }

    #[test]
    fn noisy_short_text_scores_at_floor() {
        let score = score_text_confidence("@@##5$$", &toks(&["5"]));
        assert!((0.2..=0.95).contains(&score), "got {score}");
    }

    #[test]
    fn text_scores_stay_in_range() {
        let samples = [
            ("1", vec!["1"]),
            ("¤¤¤¤¤¤¤¤¤¤¤¤ 99999999", vec!["99999999"]),
            ("total amount bill receipt invoice paid due tax 12", vec!["12"]),
            ("a\n\n\n\n\n\n\n\n\n\n7", vec!["7"]),
        ];
        for (text, tokens) in samples {
            let s = score_text_confidence(text, &toks(&tokens));
            assert!((0.2..=0.95).contains(&s), "{text:?} → {s}");
        }
    }

    #[test]
    fn ocr_short_circuit() {
        assert_eq!(score_ocr_confidence(&[], &toks(&["5"])), 0.1);
        assert_eq!(score_ocr_confidence(&[word("x")], &toks(&["5"])), 0.1);
    }

    #[test]
    fn ocr_without_tokens_is_penalised() {
        let dets = vec![word("Thank you"), word("Thank"), word("you")];
        let with = score_ocr_confidence(&dets, &toks(&["5"]));
        let without = score_ocr_confidence(&dets, &[]);
        assert!(without < with);
        assert!((0.05..=0.98).contains(&without));
    }

    #[test]
    fn ocr_typical_receipt() {
        let dets = vec![
            word("Total: 550\nTax: 50"),
            word("Total:"),
            word("550"),
            word("Tax:"),
            word("50"),
        ];
        let s = score_ocr_confidence(&dets, &toks(&["550", "50"]));
        // 0.3 + 0.15 + 0.2 + 0.2 + 0.1
        assert!((s - 0.95).abs() < 1e-9, "got {s}");
    }

    #[test]
    fn normalization_llm_success_bonus() {
        let raw = toks(&["500", "50", "550"]);
        let amounts = [500.0, 50.0, 550.0];
        let with = score_normalization_confidence(&raw, &amounts, true);
        let without = score_normalization_confidence(&raw, &amounts, false);
        assert!((with - 0.95).abs() < 1e-9, "got {with}");
        assert!((without - 0.7).abs() < 1e-9, "got {without}");
    }

    #[test]
    fn normalization_duplicates_and_loss_penalised() {
        let raw = toks(&["1", "1", "1", "1", "1", "1"]);
        let s = score_normalization_confidence(&raw, &[1.0], false);
        // ratio 1/6 < 0.2 → −0.2; valid +0.2; unique 1 ≥ 0.8 → no penalty
        assert!((s - 0.3).abs() < 1e-9, "got {s}");
        let dup = score_normalization_confidence(&toks(&["5", "5", "5"]), &[5.0, 5.0, 5.0], false);
        // 0.3 + 0.2 + 0.2 − 0.1
        assert!((dup - 0.6).abs() < 1e-9, "got {dup}");
    }

    #[test]
    fn normalization_empty_inputs() {
        assert_eq!(score_normalization_confidence(&[], &[1.0], true), 0.1);
        let s = score_normalization_confidence(&toks(&["x"]), &[], false);
        assert!((0.1..=0.95).contains(&s));
    }

    #[test]
    fn classification_short_circuit() {
        assert_eq!(score_classification_confidence(&[], "total", true), 0.1);
    }

    #[test]
    fn classification_all_unclassified_fallback() {
        let amounts = vec![
            ClassifiedAmount::new("unclassified", 500.0),
            ClassifiedAmount::new("unclassified", 50.0),
            ClassifiedAmount::new("unclassified", 550.0),
        ];
        let s = score_classification_confidence(
            &amounts,
            "Hospital Bill\nConsultation: 500\nTax: 50\nTotal: 550",
            false,
        );
        // 0.2 + min(0.3, 5 × 0.05) − 0.2
        assert!((s - 0.25).abs() < 1e-9, "got {s}");
    }

    #[test]
    fn classification_diverse_labels() {
        let amounts = vec![
            ClassifiedAmount::new("tax", 50.0),
            ClassifiedAmount::new("tax", 18.0),
            ClassifiedAmount::new("total_bill", 550.0),
            ClassifiedAmount::new("paid", 550.0),
            ClassifiedAmount::new("paid", 100.0),
        ];
        let s = score_classification_confidence(&amounts, "invoice total tax paid", true);
        // 0.2 + 0.3 + 0.2 + 0.15 + 0.1 = 0.95
        assert!((s - 0.95).abs() < 1e-9, "got {s}");
    }

    #[test]
    fn round2_rounds_half_up() {
        assert_eq!(round2(0.456), 0.46);
        assert_eq!(round2(0.1), 0.1);
    }
}
