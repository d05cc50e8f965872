//! Reasoning service client
//!
//! The external reasoning service is any OpenAI-compatible chat completions
//! endpoint. Throttling responses are surfaced as [`Error::Throttled`] so the
//! [rate-limited caller](crate::rate_limit::RateLimitedCaller) can back off.

use crate::config::ReasoningConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

/// One-shot prompt → text interface to the reasoning service
#[async_trait]
pub trait ReasoningClient: Send + Sync {
    /// Generate a completion for a single prompt
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Get the client type for debugging/logging
    fn client_type(&self) -> &str;
}

/// HTTP client for an OpenAI-compatible chat completions endpoint
pub struct HttpReasoningClient {
    /// HTTP client
    client: Client,
    /// Configuration
    config: ReasoningConfig,
}

impl HttpReasoningClient {
    /// Create a new client from environment variables
    pub fn from_env() -> Result<Self> {
        let config = ReasoningConfig::from_env()?;
        Self::new(config)
    }

    /// Create a new client with the given configuration
    pub fn new(config: ReasoningConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    /// Send a completion request
    pub async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.as_str().trim_end_matches('/')
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key()))
            .header("X-Title", &self.config.app_name)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            let message = format!("Request failed with status {}: {}", status, error_text);
            if status == StatusCode::TOO_MANY_REQUESTS || error_text.contains("RESOURCE_EXHAUSTED") {
                return Err(Error::Throttled(message));
            }
            return Err(Error::reasoning(message));
        }

        let completion: CompletionResponse = response.json().await?;
        Ok(completion)
    }

    /// Get the configuration
    pub fn config(&self) -> &ReasoningConfig {
        &self.config
    }
}

#[async_trait]
impl ReasoningClient for HttpReasoningClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let request = CompletionRequest::new(&self.config.model, vec![ChatMessage::user(prompt)]);
        let response = self.complete(request).await?;
        response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| Error::reasoning("response contained no choices"))
    }

    fn client_type(&self) -> &str {
        "http"
    }
}

/// Completion request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Model identifier
    pub model: String,
    /// Messages in the conversation
    pub messages: Vec<ChatMessage>,
    /// Temperature for sampling
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Maximum tokens for completion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    /// Create a new completion request
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
            max_tokens: None,
        }
    }

    /// Set the temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the maximum tokens
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Message in a chat completion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message sender
    pub role: Role,
    /// Content of the message
    #[serde(default)]
    pub content: String,
}

impl ChatMessage {
    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Role of a message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System message
    System,
    /// User message
    User,
    /// Assistant message
    Assistant,
}

/// Completion response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Choices
    pub choices: Vec<Choice>,
    /// Model used
    #[serde(default)]
    pub model: Option<String>,
}

/// Choice in completion response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    /// Message content
    pub message: ChatMessage,
    /// Finish reason
    #[serde(default)]
    pub finish_reason: Option<String>,
}
