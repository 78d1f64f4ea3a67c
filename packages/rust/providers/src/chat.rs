//! OpenAI-compatible chat-completions provider.
//!
//! One implementation covers every configured engine: the engines differ
//! only in base URL, model, and key. Rate-limit responses are classified
//! specially, extracting the suggested wait from the `Retry-After` header
//! or a "try again in Ns" message in the body when present.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;

use pressgang_shared::{EngineConfig, PressgangError, Result};

use crate::{GenerationProvider, GenerationRequest, ProviderError};

/// User-Agent string for provider requests.
const USER_AGENT: &str = concat!("pressgang/", env!("CARGO_PKG_VERSION"));

/// Sampling temperature for factual generation work.
const TEMPERATURE: f32 = 0.3;

/// A single OpenAI-compatible chat-completions backend.
pub struct ChatCompletionsProvider {
    name: String,
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
}

impl ChatCompletionsProvider {
    /// Build a provider from an engine config entry and its resolved key.
    pub fn from_engine(engine: &EngineConfig, api_key: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| PressgangError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            name: engine.name.clone(),
            client,
            url: format!("{}/chat/completions", engine.base_url.trim_end_matches('/')),
            api_key,
            model: engine.model.clone(),
        })
    }
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    content: Option<String>,
}

#[async_trait]
impl GenerationProvider for ChatCompletionsProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> std::result::Result<String, ProviderError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.user },
            ],
            "temperature": TEMPERATURE,
        });

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout
                } else {
                    ProviderError::Transport(e.to_string())
                }
            })?;

        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after = retry_after_header(&response);
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::RateLimited {
                retry_after: retry_after.or_else(|| retry_after_from_body(&body)),
            });
        }

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Http {
                status: status.as_u16(),
                message: message.chars().take(200).collect(),
            });
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Api(format!("malformed completion response: {e}")))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        if content.trim().is_empty() {
            return Err(ProviderError::EmptyResponse);
        }
        Ok(content)
    }
}

/// Suggested wait from a `Retry-After` header, if present and numeric.
fn retry_after_header(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Suggested wait parsed from a "try again in 13.5s" style error body.
fn retry_after_from_body(body: &str) -> Option<Duration> {
    static TRY_AGAIN_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"try again in ([0-9]+(?:\.[0-9]+)?)s").expect("valid regex"));

    let caps = TRY_AGAIN_RE.captures(body)?;
    let secs: f64 = caps[1].parse().ok()?;
    // Round up so we never retry early.
    Some(Duration::from_secs(secs.ceil() as u64 + 1))
}
