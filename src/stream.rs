//! Batch extraction API: process many documents concurrently.
//!
//! ## Why stream?
//!
//! Each document spends most of its time waiting on OCR and two LLM calls.
//! Running several documents at once hides that latency; a `Stream` lets the
//! caller print or store each report as soon as it is ready instead of
//! waiting for the slowest document.
//!
//! Documents are independent: each run owns its own used-span set and shares
//! only the (immutable) configuration and capabilities. Reports arrive in
//! completion order, tagged with the index of their input. Use
//! [`extract_batch`] when input order matters.

use crate::config::ExtractionConfig;
use crate::error::AmountError;
use crate::extract::Extractor;
use crate::output::ExtractionReport;
use crate::pipeline::ingest::RawInput;
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use tokio_stream::Stream;
use tracing::info;

/// Outcome for the input at a given index.
pub type IndexedReport = (usize, Result<ExtractionReport, AmountError>);

/// A boxed stream of indexed reports.
pub type ReportStream = Pin<Box<dyn Stream<Item = IndexedReport> + Send>>;

/// Extract amounts from every input, at most `config.concurrency` at a time.
///
/// # Errors
/// Returns `Err` only when the capabilities cannot be resolved; per-document
/// failures are yielded as `(index, Err(_))` items.
///
/// # Example
/// ```rust,no_run
/// use amount_scan::{extract_stream, ExtractionConfig, RawInput};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let inputs = vec![
///     RawInput::Text("Paid: 500".into()),
///     RawInput::Text("Due: 120".into()),
/// ];
/// let mut stream = extract_stream(inputs, &ExtractionConfig::default())?;
/// while let Some((idx, report)) = stream.next().await {
///     match report {
///         Ok(r) => println!("#{idx}: {}", r.status()),
///         Err(e) => eprintln!("#{idx}: {e}"),
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub fn extract_stream(
    inputs: Vec<RawInput>,
    config: &ExtractionConfig,
) -> Result<ReportStream, AmountError> {
    let extractor = Extractor::new(config.clone())?;
    let concurrency = config.concurrency.max(1);
    info!(
        "Starting batch extraction: {} documents, concurrency {}",
        inputs.len(),
        concurrency
    );

    let s = stream::iter(inputs.into_iter().enumerate().map(move |(idx, input)| {
        let extractor = extractor.clone();
        async move { (idx, extractor.run(input).await) }
    }))
    .buffer_unordered(concurrency);

    Ok(Box::pin(s))
}

/// Like [`extract_stream`] but collects every report in input order.
pub async fn extract_batch(
    inputs: Vec<RawInput>,
    config: &ExtractionConfig,
) -> Result<Vec<Result<ExtractionReport, AmountError>>, AmountError> {
    let mut results: Vec<IndexedReport> = extract_stream(inputs, config)?.collect().await;
    results.sort_by_key(|(idx, _)| *idx);
    Ok(results.into_iter().map(|(_, r)| r).collect())
}
