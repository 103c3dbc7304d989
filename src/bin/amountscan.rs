//! CLI binary for amount-scan.
//!
//! Maps command-line flags onto `ExtractionConfig`, runs one or many inputs
//! and prints the reports as a summary or as JSON.

use amount_scan::output::SOURCE_NOT_FOUND;
use amount_scan::{
    extract, extract_batch, AmountError, ExtractionConfig, ExtractionProgressCallback,
    ExtractionReport, ProgressCallback, RawInput, ReportStatus, Stage,
};
use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Read};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── Terminal colours ─────────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal spinner that shows the running stage and logs fallbacks.
struct CliProgressCallback {
    bar: ProgressBar,
    total: usize,
    finished: AtomicUsize,
}

impl CliProgressCallback {
    fn new(total: usize) -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix(format!("0/{total}"));
        bar.set_message("Starting…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            total,
            finished: AtomicUsize::new(0),
        })
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_stage_start(&self, stage: Stage) {
        self.bar
            .set_message(format!("step {}/4: {}", stage.number(), stage));
    }

    fn on_fallback(&self, stage: Stage, reason: &str) {
        // Keep long provider errors on one line.
        let msg = match reason.char_indices().nth(80) {
            Some((cut, _)) => format!("{}\u{2026}", &reason[..cut]),
            None => reason.to_string(),
        };
        self.bar.println(format!(
            "  {} {} fallback  {}",
            cyan("⚠"),
            stage,
            dim(&msg)
        ));
    }

    fn on_extraction_complete(&self, _status: &str) {
        let done = self.finished.fetch_add(1, Ordering::SeqCst) + 1;
        self.bar.set_prefix(format!("{done}/{}", self.total));
        if done >= self.total {
            self.bar.finish_and_clear();
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Text from an argument
  amountscan --text "Total: Rs. 1,250.00, Tax: Rs. 125.00"

  # Text from stdin
  echo "Consultation: 500 | Tax: 50 | Total: 550" | amountscan -

  # A scanned receipt (needs a Vision key)
  amountscan receipt.jpg

  # Several documents at once, JSON output
  amountscan --json --concurrency 8 bill1.png bill2.txt bill3.jpg > reports.json

  # Use an edgequake-llm provider instead of Gemini
  amountscan --provider openai --model gpt-4.1-nano bill.txt

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key (normalisation + classification)
  GOOGLE_VISION_API_KEY   Google Cloud Vision API key (image input)
  AMOUNTSCAN_PROVIDER     edgequake-llm provider name (openai, anthropic, ollama, …)
  AMOUNTSCAN_MODEL        Model ID for the chosen provider
  RUST_LOG                Log filter, e.g. amount_scan=debug

Variables are also read from a `.env` file in the working directory.

Without any LLM key every document is still processed: amounts are parsed
deterministically and labelled `unclassified`.
"#;

/// Extract monetary amounts from bills and receipts.
#[derive(Parser, Debug)]
#[command(
    name = "amountscan",
    version,
    about = "Extract monetary amounts from bills and receipts (text or images)",
    long_about = "Extract monetary amounts from bills, invoices and receipts. Text and images \
(via Google Cloud Vision OCR) are tokenised, normalised and classified with an LLM under a strict \
JSON schema, and every amount is traced back to the text it came from.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Files to process (images or UTF-8 text). `-` reads text from stdin.
    inputs: Vec<String>,

    /// Inline document text.
    #[arg(short, long)]
    text: Option<String>,

    /// Google Gemini API key.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    gemini_api_key: Option<String>,

    /// Google Cloud Vision API key.
    #[arg(long, env = "GOOGLE_VISION_API_KEY", hide_env_values = true)]
    vision_api_key: Option<String>,

    /// edgequake-llm provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "AMOUNTSCAN_PROVIDER")]
    provider: Option<String>,

    /// LLM model ID.
    #[arg(long, env = "AMOUNTSCAN_MODEL")]
    model: Option<String>,

    /// Override the Gemini models base URL.
    #[arg(long, env = "AMOUNTSCAN_GEMINI_BASE_URL")]
    gemini_base_url: Option<String>,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "AMOUNTSCAN_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Attempts per LLM call.
    #[arg(long, env = "AMOUNTSCAN_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Base retry delay in milliseconds (doubles per attempt).
    #[arg(long, env = "AMOUNTSCAN_RETRY_BACKOFF_MS", default_value_t = 1000)]
    retry_backoff_ms: u64,

    /// Per-request timeout in seconds.
    #[arg(long, env = "AMOUNTSCAN_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Largest accepted image in MiB.
    #[arg(long, env = "AMOUNTSCAN_MAX_IMAGE_MB", default_value_t = 10)]
    max_image_mb: usize,

    /// Documents processed at once.
    #[arg(short, long, env = "AMOUNTSCAN_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Output the raw JSON report(s).
    #[arg(long, env = "AMOUNTSCAN_JSON")]
    json: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "AMOUNTSCAN_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "AMOUNTSCAN_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and reports.
    #[arg(short, long, env = "AMOUNTSCAN_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner replaces INFO logs; verbose always wins.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Collect inputs ───────────────────────────────────────────────────
    let mut labels = Vec::new();
    let mut inputs = Vec::new();
    if let Some(ref text) = cli.text {
        labels.push("--text".to_string());
        inputs.push(RawInput::Text(text.clone()));
    }
    for arg in &cli.inputs {
        labels.push(arg.clone());
        inputs.push(read_input(arg).await?);
    }
    if inputs.is_empty() {
        anyhow::bail!("No input given: pass a file, `-` for stdin, or --text");
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new(inputs.len());
        Some(cb as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    // ── Run extraction ───────────────────────────────────────────────────
    let results: Vec<Result<ExtractionReport, AmountError>> = if inputs.len() == 1 {
        let input = inputs.remove(0);
        vec![extract(input, &config).await]
    } else {
        extract_batch(inputs, &config)
            .await
            .context("Extraction failed")?
    };

    let mut failures = 0;
    if cli.json {
        let values: Vec<serde_json::Value> = results
            .iter()
            .map(|r| match r {
                Ok(report) => serde_json::to_value(report),
                Err(e) => serde_json::to_value(ExtractionReport::processing_failure(e)),
            })
            .collect::<Result<_, _>>()
            .context("Failed to serialise report")?;
        failures = results.iter().filter(|r| r.is_err()).count();
        let out = if values.len() == 1 {
            serde_json::to_string_pretty(&values[0])
        } else {
            serde_json::to_string_pretty(&values)
        }
        .context("Failed to serialise report")?;
        println!("{out}");
    } else {
        for (label, result) in labels.iter().zip(&results) {
            match result {
                Ok(report) => print_report(label, report),
                Err(e) => {
                    failures += 1;
                    eprintln!("{} {}  {}", red("✘"), bold(label), red(&e.to_string()));
                }
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{failures} of {} inputs failed", results.len());
    }
    Ok(())
}

/// Map CLI args to `ExtractionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let max_image_bytes = cli
        .max_image_mb
        .checked_mul(1024 * 1024)
        .with_context(|| format!("--max-image-mb {} is too large", cli.max_image_mb))?;
    let mut builder = ExtractionConfig::builder()
        .temperature(cli.temperature)
        .max_retries(cli.max_retries)
        .retry_backoff_ms(cli.retry_backoff_ms)
        .api_timeout_secs(cli.api_timeout)
        .max_image_bytes(max_image_bytes)
        .concurrency(cli.concurrency);

    if let Some(ref key) = cli.gemini_api_key {
        builder = builder.gemini_api_key(key);
    }
    if let Some(ref key) = cli.vision_api_key {
        builder = builder.vision_api_key(key);
    }
    if let Some(ref name) = cli.provider {
        builder = builder.provider_name(name);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref url) = cli.gemini_base_url {
        builder = builder.gemini_base_url(url);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// `-` is stdin text; files are images by extension, otherwise sniffed.
async fn read_input(arg: &str) -> Result<RawInput> {
    if arg == "-" {
        let mut text = String::new();
        io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read stdin")?;
        return Ok(RawInput::Text(text));
    }

    let path = Path::new(arg);
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let by_extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match by_extension.as_deref() {
        Some("png" | "jpg" | "jpeg" | "gif" | "webp" | "bmp" | "tif" | "tiff") => {
            Ok(RawInput::Image(bytes))
        }
        _ => RawInput::sniff(bytes).with_context(|| format!("Unsupported input {}", path.display())),
    }
}

fn print_report(label: &str, report: &ExtractionReport) {
    match report {
        ExtractionReport::Halted { status, reason } => {
            let mark = if *status == ReportStatus::Error {
                red("✘")
            } else {
                cyan("⚠")
            };
            println!("{} {}  {}  {}", mark, bold(label), status, dim(reason));
        }
        ExtractionReport::Completed(done) => {
            println!(
                "{} {}  currency {}  {}",
                green("✔"),
                bold(label),
                bold(&done.step4.currency),
                dim(&format!(
                    "confidence {:.2} / {:.2} / {:.2}",
                    done.step1.confidence,
                    done.step2.normalization_confidence,
                    done.step3.confidence
                )),
            );
            for amount in &done.step4.amounts {
                let source = amount
                    .source
                    .as_deref()
                    .map(|s| format!("'{s}'"))
                    .unwrap_or_else(|| SOURCE_NOT_FOUND.to_string());
                println!(
                    "    {:<18} {:>14.2}  {}",
                    amount.label,
                    amount.value,
                    dim(&source)
                );
            }
        }
    }
}
