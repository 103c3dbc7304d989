//! LLM interaction: structured-output requests for normalisation and
//! classification.
//!
//! This module turns a [`StructuredRequest`] into a JSON string from a model.
//! Prompt text lives in [`crate::prompts`] and parsing of the returned JSON
//! lives in the stage modules; a backend only moves text.
//!
//! ## Backends
//!
//! * [`GeminiBackend`] — Gemini `generateContent` with native
//!   `responseSchema` support, sent through the backoff-aware
//!   [`RpcClient`](crate::pipeline::rpc::RpcClient).
//! * [`ProviderBackend`] — any `edgequake_llm` provider (OpenAI, Anthropic,
//!   Ollama, …). The schema travels in the system message and code fences are
//!   stripped from the reply.
//! * [`DisabledBackend`] — always fails, so every stage takes its fallback.

use crate::config::{ExtractionConfig, DEFAULT_GEMINI_MODEL};
use crate::error::{AmountError, StageError};
use crate::pipeline::rpc::{RetryPolicy, RpcClient};
use crate::progress::Stage;
use crate::prompts::with_schema;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Default model when a named edgequake-llm provider is used.
pub const DEFAULT_PROVIDER_MODEL: &str = "gpt-4.1-nano";

/// Output budget for schema-less providers. Amount lists are short.
const MAX_OUTPUT_TOKENS: usize = 2048;

/// One structured-output request.
#[derive(Debug, Clone)]
pub struct StructuredRequest {
    pub stage: Stage,
    pub system_instruction: String,
    pub user_prompt: String,
    /// Response schema in the Gemini dialect.
    pub schema: Value,
}

/// A model that answers a [`StructuredRequest`] with JSON text.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Return the raw JSON text of the reply. Parsing is the caller's job.
    async fn generate(&self, request: &StructuredRequest) -> Result<String, StageError>;
}

// ── Gemini ───────────────────────────────────────────────────────────────────

/// Gemini `generateContent` backend.
pub struct GeminiBackend {
    rpc: RpcClient,
    endpoint: String,
    temperature: f32,
}

impl GeminiBackend {
    pub fn new(config: &ExtractionConfig, api_key: impl Into<String>) -> Result<Self, AmountError> {
        let policy = RetryPolicy::new(config.max_retries, config.retry_backoff_ms);
        let rpc = RpcClient::new(policy, Duration::from_secs(config.api_timeout_secs))
            .map_err(|e| AmountError::Internal(format!("HTTP client: {e}")))?
            .with_api_key(api_key);
        let model = config.model.as_deref().unwrap_or(DEFAULT_GEMINI_MODEL);
        Ok(Self {
            rpc,
            endpoint: format!("{}/{}:generateContent", config.gemini_base_url, model),
            temperature: config.temperature,
        })
    }

    fn payload(&self, request: &StructuredRequest) -> Value {
        json!({
            "contents": [{ "parts": [{ "text": request.user_prompt }] }],
            "systemInstruction": { "parts": [{ "text": request.system_instruction }] },
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": request.schema,
                "temperature": self.temperature
            }
        })
    }
}

#[async_trait]
impl LlmBackend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, request: &StructuredRequest) -> Result<String, StageError> {
        let response = self
            .rpc
            .call_with_backoff(&self.endpoint, &self.payload(request))
            .await
            .map_err(|e| StageError::CallFailed {
                detail: e.to_string(),
            })?;
        candidate_text(&response, request.stage)
    }
}

/// Pull `candidates[0].content.parts[0].text` out of a Gemini response.
pub fn candidate_text(response: &Value, stage: Stage) -> Result<String, StageError> {
    response
        .pointer("/candidates/0/content/parts/0/text")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| StageError::MissingPayload {
            stage: stage.to_string(),
        })
}

// ── edgequake-llm providers ──────────────────────────────────────────────────

/// Backend over any [`LLMProvider`].
pub struct ProviderBackend {
    name: String,
    provider: Arc<dyn LLMProvider>,
    policy: RetryPolicy,
    temperature: f32,
}

impl ProviderBackend {
    pub fn new(
        name: impl Into<String>,
        provider: Arc<dyn LLMProvider>,
        config: &ExtractionConfig,
    ) -> Self {
        Self {
            name: name.into(),
            provider,
            policy: RetryPolicy::new(config.max_retries, config.retry_backoff_ms),
            temperature: config.temperature,
        }
    }
}

#[async_trait]
impl LlmBackend for ProviderBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, request: &StructuredRequest) -> Result<String, StageError> {
        let start = Instant::now();
        let messages = vec![
            ChatMessage::system(with_schema(&request.system_instruction, &request.schema)),
            ChatMessage::user(request.user_prompt.as_str()),
        ];
        let options = build_options(self.temperature);

        let provider = &self.provider;
        let messages = &messages;
        let options = &options;
        let label = request.stage.to_string();
        let response = self
            .policy
            .retry(&label, move || provider.chat(messages, Some(options)))
            .await
            .map_err(|e| StageError::CallFailed {
                detail: e.to_string(),
            })?;

        debug!(
            "{}: {} input tokens, {} output tokens, {:?}",
            label,
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );

        let text = strip_code_fences(&response.content);
        if text.is_empty() {
            return Err(StageError::MissingPayload { stage: label });
        }
        Ok(text)
    }
}

/// Build `CompletionOptions` for a structured request.
fn build_options(temperature: f32) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(temperature),
        max_tokens: Some(MAX_OUTPUT_TOKENS),
        ..Default::default()
    }
}

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*\s*\n(.*?)\n?```\s*$").unwrap());

/// Remove a single pair of Markdown code fences wrapping the whole reply.
pub fn strip_code_fences(input: &str) -> String {
    let trimmed = input.trim();
    match RE_OUTER_FENCES.captures(trimmed) {
        Some(caps) => caps[1].trim().to_string(),
        None => trimmed.to_string(),
    }
}

// ── Disabled ─────────────────────────────────────────────────────────────────

/// Backend used when nothing is configured; every request fails.
pub struct DisabledBackend;

#[async_trait]
impl LlmBackend for DisabledBackend {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn generate(&self, _request: &StructuredRequest) -> Result<String, StageError> {
        Err(StageError::Disabled)
    }
}

// ── Resolution ───────────────────────────────────────────────────────────────

/// Pick the backend for a run.
///
/// Order: injected backend, named edgequake-llm provider, Gemini API key,
/// then [`DisabledBackend`].
pub fn resolve_backend(config: &ExtractionConfig) -> Result<Arc<dyn LlmBackend>, AmountError> {
    if let Some(ref backend) = config.llm {
        return Ok(Arc::clone(backend));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_PROVIDER_MODEL);
        let provider = ProviderFactory::create_llm_provider(name, model).map_err(|e| {
            AmountError::ProviderNotConfigured {
                provider: name.clone(),
                hint: format!("{e}"),
            }
        })?;
        info!("LLM backend: {} ({})", name, model);
        return Ok(Arc::new(ProviderBackend::new(name.as_str(), provider, config)));
    }

    if let Some(ref key) = config.gemini_api_key {
        if !key.is_empty() {
            let backend = GeminiBackend::new(config, key.clone())?;
            info!(
                "LLM backend: gemini ({})",
                config.model.as_deref().unwrap_or(DEFAULT_GEMINI_MODEL)
            );
            return Ok(Arc::new(backend));
        }
    }

    info!("No LLM backend configured; stages will use deterministic fallbacks");
    Ok(Arc::new(DisabledBackend))
}
