//! Completion service client
//!
//! Talks to any server exposing the OpenAI text-completion endpoint
//! (`POST /v1/completions`), Ollama by default.

use crate::config::CompletionConfig;
use crate::errors::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

/// Instruction prepended to every prompt ("answer as concisely as possible")
pub const SYSTEM_INSTRUCTION: &str = "Дай максимально лаконичный ответ на данный вопрос.\n\n";

/// Text generation backend used by the retrieval core
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Generate raw text for `prompt`. The result may still contain a
    /// reasoning segment.
    async fn complete(&self, prompt: &str, max_tokens: u32, temperature: f32) -> Result<String>;

    /// Model identifier, for logs
    fn model_name(&self) -> &str;
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: String,
    max_tokens: u32,
    temperature: f32,
}

/// Outcome of reading a completion response body
#[derive(Debug, PartialEq)]
enum ParsedCompletion {
    Text(String),
    /// `choices` absent or empty
    NoChoices,
    /// First choice present but without a `text` string
    Malformed,
}

fn parse_completion(data: &Value) -> ParsedCompletion {
    let first = match data.get("choices").and_then(Value::as_array) {
        Some(choices) if !choices.is_empty() => &choices[0],
        _ => return ParsedCompletion::NoChoices,
    };
    match first.get("text").and_then(Value::as_str) {
        Some(text) => ParsedCompletion::Text(text.to_string()),
        None => ParsedCompletion::Malformed,
    }
}

/// HTTP client for the completion endpoint
pub struct CompletionClient {
    client: reqwest::Client,
    url: String,
    model: String,
    timeout: Duration,
    strict_responses: bool,
}

impl CompletionClient {
    /// Create a new client from configuration
    pub fn new(config: &CompletionConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            url: format!("{}/v1/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            timeout,
            strict_responses: config.strict_responses,
        })
    }

    fn upstream(&self, message: String) -> AppError {
        AppError::Upstream {
            service: "completion".to_string(),
            message,
        }
    }
}

#[async_trait]
impl CompletionService for CompletionClient {
    async fn complete(&self, prompt: &str, max_tokens: u32, temperature: f32) -> Result<String> {
        let request = CompletionRequest {
            model: &self.model,
            prompt: format!("{}{}", SYSTEM_INSTRUCTION, prompt),
            max_tokens,
            temperature,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::from_transport("completion", e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(self.upstream(format!("HTTP {}: {}", status, body)));
        }

        let data: Value = response.json().await.map_err(|e| {
            if e.is_timeout() {
                AppError::from_transport("completion", e, self.timeout)
            } else {
                self.upstream(format!("Invalid response body: {}", e))
            }
        })?;

        match parse_completion(&data) {
            ParsedCompletion::Text(text) => {
                debug!(model = %self.model, chars = text.len(), "Completion received");
                Ok(text)
            }
            ParsedCompletion::NoChoices if !self.strict_responses => {
                // Legacy behaviour: hand back the body itself as the answer
                warn!(
                    model = %self.model,
                    response = %data,
                    "Completion response has no choices, returning raw body"
                );
                metrics::record_completion_fallback(&self.model);
                Ok(data.to_string())
            }
            ParsedCompletion::NoChoices => {
                Err(self.upstream(format!("Response has no choices: {}", data)))
            }
            ParsedCompletion::Malformed => {
                Err(self.upstream(format!("First choice has no text: {}", data)))
            }
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Completion service for tests: returns a fixed reply and remembers every
/// prompt it was given
pub struct MockCompletionService {
    reply: String,
    prompts: Mutex<Vec<String>>,
}

impl MockCompletionService {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Prompts received so far, oldest first
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CompletionService for MockCompletionService {
    async fn complete(&self, prompt: &str, _max_tokens: u32, _temperature: f32) -> Result<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        Ok(self.reply.clone())
    }

    fn model_name(&self) -> &str {
        "mock-completion"
    }
}
