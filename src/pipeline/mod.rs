//! Pipeline stages for amount extraction.
//!
//! Each submodule implements exactly one transformation step or one external
//! capability. Keeping them separate makes each independently testable and
//! lets us swap providers (another OCR engine, another LLM) without touching
//! the stage logic.
//!
//! ## Data Flow
//!
//! ```text
//! text ─────────────┐
//!                   ├─▶ ingest ──▶ normalize ──▶ classify ──▶ reconcile
//! image ──▶ ocr ────┘   (tokens)   (LLM/clean)   (LLM/label)  (sources)
//! ```
//!
//! 1. [`ingest`]    — trim or OCR the input, [`tokenize`] it, score it with
//!    [`confidence`]; may end the request early
//! 2. [`normalize`] — tokens to numbers through [`llm`], with a deterministic
//!    cleaner as fallback
//! 3. [`classify`]  — label each number through [`llm`], `unclassified` as
//!    fallback
//! 4. [`reconcile`] — locate each amount in the text and pick the currency
//!
//! [`rpc`] carries the retry/backoff policy shared by every remote call.

pub mod classify;
pub mod confidence;
pub mod ingest;
pub mod llm;
pub mod normalize;
pub mod ocr;
pub mod reconcile;
pub mod rpc;
pub mod tokenize;
