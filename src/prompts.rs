//! LLM instructions and response schemas for the two LLM-assisted stages.
//!
//! The stage modules never build prompt text themselves; they call the
//! `*_query` helpers here and pair them with the matching schema. Unit tests
//! below pin the parts of each prompt the parsers depend on.
//!
//! Schemas use the Gemini `responseSchema` dialect (upper-case type names).
//! Backends without native schema support embed them in the system message.

use serde_json::{json, Value};

/// Example labels offered to the classifier.
pub const EXAMPLE_LABELS: &str = "'total_bill', 'paid', 'due', 'tax', 'insurance_copay'";

/// System instruction for the normalisation stage.
pub const NORMALIZATION_SYSTEM_PROMPT: &str = "You are an expert financial data normalizer. \
Extract valid financial amounts from raw tokens. Correct OCR errors, treat commas as grouping \
separators, and output precise numerical values.";

/// System instruction for the classification stage.
pub const CLASSIFICATION_SYSTEM_PROMPT: &str = "You are an expert financial document classifier. \
Determine the context for each amount based on surrounding text (e.g., 'total_bill', 'paid', \
'due', 'tax', 'insurance_copay'). Output JSON array with 'type' and 'value' keys.";

/// Suffix appended to the system message when the backend cannot enforce a
/// response schema itself.
pub const SCHEMA_INSTRUCTION: &str = "Respond with JSON only, no prose and no code fences. \
The JSON must conform to this schema:";

/// User message for normalisation: the document text and its raw tokens.
pub fn normalization_query(raw_text: &str, raw_tokens: &[String]) -> String {
    format!(
        "Original Text: \"{}\". Raw Tokens: {}. Please normalize the tokens, correcting errors \
         and treating commas as grouping separators. Remove all commas to form the intended \
         numerical values (e.g., '175,00' -> 17500). Filter out percentages, quantities, and \
         non-financial values.",
        raw_text,
        json!(raw_tokens)
    )
}

/// User message for classification: the document text and the normalised values.
pub fn classification_query(raw_text: &str, normalized: &[f64]) -> String {
    format!(
        "Original Text: \"{}\". Normalized Amounts: {}. Classify each amount based on \
         surrounding context (e.g., {}).",
        raw_text,
        json!(normalized),
        EXAMPLE_LABELS
    )
}

/// Array of numbers.
pub fn normalization_schema() -> Value {
    json!({
        "type": "ARRAY",
        "items": { "type": "NUMBER" },
        "description": "A list of normalized financial amounts as numbers."
    })
}

/// Array of `{type, value}` objects, `type` first.
pub fn classification_schema() -> Value {
    json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": {
                "type": { "type": "STRING", "description": "The context/label of the amount." },
                "value": { "type": "NUMBER", "description": "The numerical value." }
            },
            "propertyOrdering": ["type", "value"]
        }
    })
}

/// System message for schema-less backends: instruction plus schema.
pub fn with_schema(system_instruction: &str, schema: &Value) -> String {
    format!("{system_instruction}\n\n{SCHEMA_INSTRUCTION}\n{schema}")
}
