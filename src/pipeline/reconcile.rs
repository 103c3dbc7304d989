//! Stage 4: find where in the document each classified amount came from.
//!
//! Two strategies, tried in order for every amount:
//!
//! 1. **Delimited segments** (text input only): split the text on `|`, on a
//!    comma followed by a letter, on `;`, then on newlines; the first split
//!    that yields several segments is searched for a matching number and the
//!    whole segment is the source.
//! 2. **Lines**: non-empty lines, longest first; each numeric run is tried
//!    and a match claims its `(line, offset)` span so no later amount can be
//!    attributed to the same place.

use crate::output::{FinalAmount, FinalOutput, ReportStatus, UNKNOWN_CURRENCY};
use crate::pipeline::classify::ClassificationResult;
use crate::pipeline::ingest::IngestResult;
use crate::pipeline::tokenize::parse_leading_float;
use once_cell::sync::Lazy;
use regex::Regex;
use std::cmp::Reverse;
use std::collections::HashSet;
use tracing::debug;

/// Two numbers closer than this are the same amount.
const MATCH_TOLERANCE: f64 = 0.01;

static RE_PIPE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*\|\s*").unwrap());
static RE_COMMA: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*,\s*").unwrap());
static RE_SEMICOLON: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*;\s*").unwrap());
static RE_SEGMENT_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+(?:[.,]\d+)?").unwrap());
static RE_LINE_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\d,.]+").unwrap());
static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Spans already attributed during one reconciliation pass:
/// `(original line index, byte offset within the trimmed line)`.
pub type UsedSourceSet = HashSet<(usize, usize)>;

/// Attach sources to every classified amount and pick the currency.
pub fn reconcile(input: &IngestResult, classified: &ClassificationResult) -> FinalOutput {
    let mut used = UsedSourceSet::new();

    let amounts: Vec<FinalAmount> = classified
        .amounts
        .iter()
        .map(|item| {
            let mut source = None;
            if input.detections.is_none() {
                source = find_in_segments(item.value, &input.raw_text);
            }
            if source.is_none() {
                source = find_in_lines(item.value, &input.raw_text, &mut used);
            }
            if source.is_none() {
                debug!("no source for {} = {}", item.label, item.value);
            }
            FinalAmount {
                label: item.label.clone(),
                value: item.value,
                source,
            }
        })
        .collect();

    FinalOutput {
        currency: input
            .currency_hint
            .clone()
            .unwrap_or_else(|| UNKNOWN_CURRENCY.to_string()),
        amounts,
        status: ReportStatus::Ok,
    }
}

/// Strategy 1: the first delimiter split with more than one segment that
/// contains `value`. Does not consult or update any used-span set.
pub fn find_in_segments(value: f64, raw_text: &str) -> Option<String> {
    let splits: [Vec<&str>; 4] = [
        RE_PIPE.split(raw_text).collect(),
        split_comma_before_letter(raw_text),
        RE_SEMICOLON.split(raw_text).collect(),
        raw_text.split('\n').collect(),
    ];

    for split in splits {
        let segments: Vec<&str> = split
            .into_iter()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        if segments.len() <= 1 {
            continue;
        }
        for segment in segments {
            let hit = RE_SEGMENT_NUMBER
                .find_iter(segment)
                .filter_map(|m| parse_number(m.as_str()))
                .any(|n| (n - value).abs() < MATCH_TOLERANCE);
            if hit {
                return Some(segment.to_string());
            }
        }
    }
    None
}

/// Strategy 2: longest lines first, skipping and then claiming spans in `used`.
pub fn find_in_lines(value: f64, raw_text: &str, used: &mut UsedSourceSet) -> Option<String> {
    let mut lines: Vec<(usize, &str)> = raw_text
        .split('\n')
        .map(str::trim)
        .enumerate()
        .filter(|(_, line)| !line.is_empty())
        .collect();
    // character length, not bytes (`₹` is one character); stable, so equal
    // lengths keep document order
    lines.sort_by_key(|(_, line)| Reverse(line.chars().count()));

    for (index, line) in lines {
        for m in RE_LINE_NUMBER.find_iter(line) {
            let key = (index, m.start());
            if used.contains(&key) {
                continue;
            }
            let Some(n) = parse_number(m.as_str()) else {
                continue;
            };
            if (n - value).abs() < MATCH_TOLERANCE {
                used.insert(key);
                return Some(RE_WHITESPACE.replace_all(line, " ").into_owned());
            }
        }
    }
    None
}

/// Split on commas (and surrounding whitespace) that are followed by an
/// ASCII letter.
fn split_comma_before_letter(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    for m in RE_COMMA.find_iter(text) {
        let next = text[m.end()..].chars().next();
        if next.is_some_and(|c| c.is_ascii_alphabetic()) {
            parts.push(&text[start..m.start()]);
            start = m.end();
        }
    }
    parts.push(&text[start..]);
    parts
}

fn parse_number(s: &str) -> Option<f64> {
    parse_leading_float(&s.replace(',', ""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::classify::{ClassifiedAmount, UNCLASSIFIED};
    use crate::pipeline::ocr::TextAnnotation;

    fn ingest(text: &str, image: bool) -> IngestResult {
        IngestResult {
            raw_text: text.into(),
            raw_tokens: vec![],
            currency_hint: None,
            confidence: 0.5,
            detections: image.then(|| vec![TextAnnotation::default(); 2]),
        }
    }

    fn classified(values: &[f64]) -> ClassificationResult {
        ClassificationResult {
            amounts: values
                .iter()
                .map(|v| ClassifiedAmount::new(UNCLASSIFIED, *v))
                .collect(),
            confidence: 0.1,
            fallback_reason: Some("disabled".into()),
        }
    }

    fn sources(out: &FinalOutput) -> Vec<Option<&str>> {
        out.amounts.iter().map(|a| a.source.as_deref()).collect()
    }

    #[test]
    fn hospital_bill_lines() {
        let input = ingest("Hospital Bill\nConsultation: 500\nTax: 50\nTotal: 550", false);
        let out = reconcile(&input, &classified(&[500.0, 50.0, 550.0]));
        assert_eq!(
            sources(&out),
            vec![Some("Consultation: 500"), Some("Tax: 50"), Some("Total: 550")]
        );
        assert_eq!(out.currency, "UNKNOWN");
        assert_eq!(out.status, ReportStatus::Ok);
    }

    #[test]
    fn pipe_delimited_segments() {
        let input = ingest("Total: 1200 | Paid: 1000 | Due: 200", false);
        let out = reconcile(&input, &classified(&[1000.0, 200.0]));
        assert_eq!(sources(&out), vec![Some("Paid: 1000"), Some("Due: 200")]);
    }

    #[test]
    fn comma_before_letter_splits_but_grouping_commas_do_not() {
        let input = ingest("Total: 1,250.00, Tax: 125.00", false);
        let out = reconcile(&input, &classified(&[1250.0, 125.0]));
        assert_eq!(sources(&out), vec![Some("Total: 1,250.00"), Some("Tax: 125.00")]);
    }

    #[test]
    fn segment_matching_is_skipped_for_ocr_input() {
        let input = ingest("Total: 1200 | Paid: 1000", true);
        let out = reconcile(&input, &classified(&[1000.0]));
        assert_eq!(sources(&out), vec![Some("Total: 1200 | Paid: 1000")]);
    }

    #[test]
    fn line_spans_are_not_reused() {
        let input = ingest("Fee 20\nFee 20", true);
        let out = reconcile(&input, &classified(&[20.0, 20.0, 20.0]));
        assert_eq!(sources(&out), vec![Some("Fee 20"), Some("Fee 20"), None]);
    }

    #[test]
    fn longest_line_wins_and_whitespace_collapses() {
        let mut used = UsedSourceSet::new();
        let text = "Tax 5\nService   charge\t 5 total";
        assert_eq!(
            find_in_lines(5.0, text, &mut used).as_deref(),
            Some("Service charge 5 total")
        );
        assert!(used.contains(&(1, 18)));
        assert_eq!(find_in_lines(5.0, text, &mut used).as_deref(), Some("Tax 5"));
    }

    #[test]
    fn lines_rank_by_characters_not_bytes() {
        // "₹ 550 due" is 11 bytes but only 9 characters
        let mut used = UsedSourceSet::new();
        let src = find_in_lines(550.0, "₹ 550 due\nTotal: 550", &mut used);
        assert_eq!(src.as_deref(), Some("Total: 550"));
        assert!(used.contains(&(1, 7)));

        let second = find_in_lines(550.0, "₹ 550 due\nTotal: 550", &mut used);
        assert_eq!(second.as_deref(), Some("₹ 550 due"));
    }

    #[test]
    fn unmatched_value_has_no_source() {
        let input = ingest("Fee 20", false);
        let out = reconcile(&input, &classified(&[99.0]));
        assert_eq!(sources(&out), vec![None]);
    }

    #[test]
    fn currency_hint_is_carried() {
        let mut input = ingest("Fee 20", false);
        input.currency_hint = Some("₹".into());
        assert_eq!(reconcile(&input, &classified(&[20.0])).currency, "₹");
    }

    #[test]
    fn comma_split_requires_letter() {
        assert_eq!(split_comma_before_letter("a, b ,1,c"), vec!["a", "b ,1", "c"]);
    }
}
