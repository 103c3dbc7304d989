//! Numeric token and currency-hint extraction.
//!
//! Tokens are deliberately permissive: `1,250.00`, `1.250,00` and `17500`
//! all come through verbatim. Deciding what they *mean* (grouping vs decimal
//! separator, OCR confusions) is the normalisation stage's job.

use once_cell::sync::Lazy;
use regex::Regex;

/// First currency marker in the text: ISO code, rupee abbreviation or glyph.
///
/// `Rs.` keeps its dot; a bare `Rs` must end on a word boundary.
static RE_CURRENCY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bINR\b|\bRs(?:\.|\b)|\$|€|₹").unwrap());

/// Optional currency prefix, then a grouped amount or a plain decimal.
///
/// The grouped form needs at least one three-digit group; otherwise the
/// leftmost alternative would cut `17500` into `175` and `00`.
static RE_AMOUNT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:[$€₹]|INR|Rs\.?)?\s*(\d{1,3}(?:[.,]\d{3})+(?:[.,]\d{2})?|\d+(?:[.,]\d+)?)")
        .unwrap()
});

/// Result of scanning raw text.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Tokens {
    /// Numeric substrings in order of appearance.
    pub tokens: Vec<String>,
    /// First currency marker found anywhere in the text.
    pub currency_hint: Option<String>,
}

/// Extract numeric tokens and a currency hint from `text`.
///
/// The two scans are independent: the hint is the first currency marker in
/// the whole text, not necessarily one attached to a token.
pub fn tokenize(text: &str) -> Tokens {
    let currency_hint = RE_CURRENCY.find(text).map(|m| m.as_str().to_string());

    let tokens = RE_AMOUNT
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();

    Tokens {
        tokens,
        currency_hint,
    }
}

/// Parse the longest leading decimal number in `s` (`"12.5abc"` → 12.5).
///
/// Accepts an optional sign, digits, and at most one `.` fraction. Returns
/// `None` when no digit is found before the first non-numeric character.
pub fn parse_leading_float(s: &str) -> Option<f64> {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        end = 1;
    }
    let mut digits = 0;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
        digits += 1;
    }
    if end < bytes.len() && bytes[end] == b'.' {
        let mut frac_end = end + 1;
        let mut frac_digits = 0;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
            frac_digits += 1;
        }
        if frac_digits > 0 || digits > 0 {
            end = frac_end;
            digits += frac_digits;
        }
    }
    if digits == 0 {
        return None;
    }
    s[..end].parse::<f64>().ok()
}
