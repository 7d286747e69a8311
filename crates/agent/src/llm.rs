use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use estoque_core::config::{LlmConfig, LlmProvider};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const RETRY_BASE_DELAY: Duration = Duration::from_millis(250);

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("llm transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("llm provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("llm response could not be decoded: {0}")]
    Malformed(String),
    #[error("llm client misconfigured: {0}")]
    Configuration(String),
    #[error("llm unavailable: {0}")]
    Unavailable(String),
}

impl LlmError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(error) => {
                error.is_timeout() || error.is_connect() || error.is_request()
            }
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    fn model(&self) -> &str;

    /// Single-turn completion. Output is cut at the first stop sequence.
    async fn complete(&self, prompt: &str, stop: &[&str]) -> Result<String, LlmError>;
}

/// Chat-completions client for Groq, OpenAI and Ollama plus the Anthropic Messages API.
pub struct HttpLlmClient {
    client: Client,
    provider: LlmProvider,
    base_url: String,
    api_key: Option<SecretString>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    max_retries: u32,
}

impl HttpLlmClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        if config.provider.requires_api_key() && config.api_key.is_none() {
            return Err(LlmError::Configuration(format!(
                "provider `{}` requires an api key",
                config.provider.as_str()
            )));
        }

        let client = Client::builder().timeout(config.timeout()).build()?;

        Ok(Self {
            client,
            provider: config.provider,
            base_url: config.effective_base_url().trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
        })
    }

    pub fn provider(&self) -> LlmProvider {
        self.provider
    }

    async fn send_once(&self, prompt: &str, stop: &[&str]) -> Result<String, LlmError> {
        let request = match self.provider {
            LlmProvider::Anthropic => {
                let mut request = self
                    .client
                    .post(format!("{}/messages", self.base_url))
                    .header("anthropic-version", ANTHROPIC_VERSION)
                    .json(&anthropic_body(
                        &self.model,
                        prompt,
                        stop,
                        self.temperature,
                        self.max_tokens,
                    ));
                if let Some(key) = &self.api_key {
                    request = request.header("x-api-key", key.expose_secret());
                }
                request
            }
            LlmProvider::Groq | LlmProvider::OpenAi | LlmProvider::Ollama => {
                let body = chat_completions_body(
                    &self.model,
                    prompt,
                    stop,
                    self.temperature,
                    self.max_tokens,
                );
                let mut request =
                    self.client.post(format!("{}/chat/completions", self.base_url)).json(&body);
                if let Some(key) = &self.api_key {
                    request = request.bearer_auth(key.expose_secret());
                }
                request
            }
        };

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, body));
        }

        let body: Value = response.json().await?;
        let text = match self.provider {
            LlmProvider::Anthropic => parse_anthropic_response(body)?,
            _ => parse_chat_completions_response(body)?,
        };
        Ok(truncate_at_stop(&text, stop).to_string())
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str, stop: &[&str]) -> Result<String, LlmError> {
        let mut attempt = 0;
        loop {
            match self.send_once(prompt, stop).await {
                Ok(text) => {
                    debug!(
                        event_name = "llm.completion.received",
                        provider = self.provider.as_str(),
                        model = %self.model,
                        attempt,
                        chars = text.len(),
                        "llm completion received"
                    );
                    return Ok(text);
                }
                Err(error) if error.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        event_name = "llm.completion.retry",
                        provider = self.provider.as_str(),
                        attempt,
                        error = %error,
                        "retrying llm completion"
                    );
                    tokio::time::sleep(RETRY_BASE_DELAY * 2u32.saturating_pow(attempt - 1)).await;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

fn status_error(status: StatusCode, body: String) -> LlmError {
    LlmError::Status { status: status.as_u16(), body }
}

fn chat_completions_body(
    model: &str,
    prompt: &str,
    stop: &[&str],
    temperature: f32,
    max_tokens: u32,
) -> Value {
    let mut body = json!({
        "model": model,
        "messages": [{ "role": "user", "content": prompt }],
        "temperature": temperature,
        "max_tokens": max_tokens,
    });
    if !stop.is_empty() {
        body["stop"] = json!(stop);
    }
    body
}

fn anthropic_body(
    model: &str,
    prompt: &str,
    stop: &[&str],
    temperature: f32,
    max_tokens: u32,
) -> Value {
    let mut body = json!({
        "model": model,
        "max_tokens": max_tokens,
        "temperature": temperature,
        "messages": [{ "role": "user", "content": prompt }],
    });
    // The Messages API rejects stop sequences made only of whitespace.
    let stop = stop.iter().filter(|sequence| !sequence.trim().is_empty()).collect::<Vec<_>>();
    if !stop.is_empty() {
        body["stop_sequences"] = json!(stop);
    }
    body
}

fn parse_chat_completions_response(body: Value) -> Result<String, LlmError> {
    #[derive(Deserialize)]
    struct ChatResponse {
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

    let response: ChatResponse =
        serde_json::from_value(body).map_err(|error| LlmError::Malformed(error.to_string()))?;
    response
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content.unwrap_or_default())
        .ok_or_else(|| LlmError::Malformed("response carried no choices".to_string()))
}

fn parse_anthropic_response(body: Value) -> Result<String, LlmError> {
    #[derive(Deserialize)]
    struct MessagesResponse {
        content: Vec<ContentBlock>,
    }

    #[derive(Deserialize)]
    struct ContentBlock {
        #[serde(default)]
        text: Option<String>,
    }

    let response: MessagesResponse =
        serde_json::from_value(body).map_err(|error| LlmError::Malformed(error.to_string()))?;
    Ok(response.content.into_iter().filter_map(|block| block.text).collect())
}

/// Providers may ignore or cap stop sequences, so they are enforced again here.
pub fn truncate_at_stop<'a>(text: &'a str, stop: &[&str]) -> &'a str {
    let cut = stop
        .iter()
        .filter(|sequence| !sequence.is_empty())
        .filter_map(|sequence| text.find(sequence))
        .min()
        .unwrap_or(text.len());
    &text[..cut]
}

/// Replays canned completions in order and records every prompt it receives.
pub struct ScriptedLlmClient {
    replies: Mutex<VecDeque<Result<String, String>>>,
    prompts: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl Default for ScriptedLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedLlmClient {
    pub fn new() -> Self {
        Self { replies: Mutex::new(VecDeque::new()), prompts: Mutex::new(Vec::new()), delay: None }
    }

    pub fn with_reply(mut self, text: impl Into<String>) -> Self {
        self.replies.get_mut().push_back(Ok(text.into()));
        self
    }

    pub fn with_failure(mut self, message: impl Into<String>) -> Self {
        self.replies.get_mut().push_back(Err(message.into()));
        self
    }

    /// Sleeps before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub async fn prompts(&self) -> Vec<String> {
        self.prompts.lock().await.clone()
    }

    pub async fn calls(&self) -> usize {
        self.prompts.lock().await.len()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    fn model(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, prompt: &str, stop: &[&str]) -> Result<String, LlmError> {
        self.prompts.lock().await.push(prompt.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match self.replies.lock().await.pop_front() {
            Some(Ok(text)) => Ok(truncate_at_stop(&text, stop).to_string()),
            Some(Err(message)) => Err(LlmError::Unavailable(message)),
            None => Err(LlmError::Unavailable("script exhausted".to_string())),
        }
    }
}
