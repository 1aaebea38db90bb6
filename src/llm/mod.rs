//! Language-model collaborator with best-effort structured output.
//!
//! [`LlmClient`] wraps three interchangeable backends behind one call:
//! `complete_json(prompt)`. The stub backend (the default) echoes a canned
//! response embedded in the prompt; the Ollama and LM Studio backends call
//! their local HTTP APIs. Model output is coerced into JSON by preferring
//! fenced code blocks over raw text, and every failure mode - transport,
//! status, empty output, unparseable output - collapses to `None` with a
//! warning, never an error the pipeline has to handle.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::config::Settings;

/// Completions are slow on local hardware; allow a full minute.
const COMPLETION_TIMEOUT_SECS: u64 = 60;

/// Matches a fenced code block, optionally tagged `json`, capturing the body.
#[allow(clippy::expect_used)]
static FENCED_BLOCK_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json)?\s*(.*?)```").expect("fenced block regex is valid") // Static pattern, safe to panic
});

/// Client for JSON-producing language-model completions.
#[derive(Debug, Clone)]
pub struct LlmClient {
    settings: Settings,
    client: reqwest::Client,
}

impl LlmClient {
    /// Creates a client for the backend selected by `settings.llm_provider`.
    #[must_use]
    pub fn new(settings: Settings) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(COMPLETION_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self { settings, client }
    }

    /// Completes `prompt` and coerces the model output into a JSON value.
    ///
    /// Returns `None` on any failure; callers treat a missing completion as
    /// "no structured answer" and fall back to their own defaults.
    pub async fn complete_json(&self, prompt: &str) -> Option<Value> {
        match self.settings.llm_provider.to_lowercase().as_str() {
            "ollama" => {
                let text = self.call_ollama(prompt).await?;
                extract_structured_json(&text)
            }
            "lmstudio" => {
                let text = self.call_lmstudio(prompt).await?;
                extract_structured_json(&text)
            }
            _ => parse_stub(prompt),
        }
    }

    /// Calls the Ollama generate API, returning the raw completion text.
    async fn call_ollama(&self, prompt: &str) -> Option<String> {
        let url = format!(
            "{}/api/generate",
            self.settings.ollama_base_url.trim_end_matches('/')
        );
        let payload = json!({
            "model": self.settings.ollama_model,
            "prompt": prompt,
            "stream": false,
        });

        let body = self.post_json(&url, &payload).await?;
        body.get("response")
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    /// Calls the LM Studio chat-completions API (OpenAI-compatible),
    /// returning the first choice's message content.
    async fn call_lmstudio(&self, prompt: &str) -> Option<String> {
        let url = format!(
            "{}/chat/completions",
            self.settings.lmstudio_base_url.trim_end_matches('/')
        );
        let payload = json!({
            "model": self.settings.lmstudio_model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": 0,
        });

        let body = self.post_json(&url, &payload).await?;
        body.get("choices")
            .and_then(|choices| choices.get(0))
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    async fn post_json(&self, url: &str, payload: &Value) -> Option<Value> {
        let response = match self.client.post(url).json(payload).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(url = %url, error = %e, "LLM request failed");
                return None;
            }
        };
        if !response.status().is_success() {
            warn!(url = %url, status = %response.status(), "LLM returned error status");
            return None;
        }
        match response.json::<Value>().await {
            Ok(body) => Some(body),
            Err(e) => {
                warn!(url = %url, error = %e, "LLM response was not JSON");
                None
            }
        }
    }
}

/// Extracts a JSON value from model output text.
///
/// Fenced code blocks (```` ```json ```` or bare ```` ``` ````) are tried
/// first, in order; when none parse, the whole trimmed text is tried. Returns
/// `None` when nothing parses.
#[must_use]
pub fn extract_structured_json(text: &str) -> Option<Value> {
    let cleaned = text.trim();
    if cleaned.is_empty() {
        return None;
    }

    let fenced: Vec<&str> = FENCED_BLOCK_PATTERN
        .captures_iter(cleaned)
        .filter_map(|captures| captures.get(1))
        .map(|body| body.as_str())
        .collect();
    let candidates = if fenced.is_empty() {
        vec![cleaned]
    } else {
        fenced
    };

    for candidate in candidates {
        if let Ok(value) = serde_json::from_str::<Value>(candidate.trim()) {
            return Some(value);
        }
    }
    debug!("no JSON candidate parsed from LLM output");
    None
}

/// Stub backend: a JSON prompt with a `mock_response` field echoes that
/// field; anything else yields `None`.
fn parse_stub(prompt: &str) -> Option<Value> {
    let parsed: Value = serde_json::from_str(prompt).ok()?;
    parsed.get("mock_response").cloned()
}
