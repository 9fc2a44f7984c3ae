//! Freeform text generation through a remote chat-completion provider.
//!
//! The client speaks the AI21 Studio chat-completions contract: one user message, no tools or
//! documents, a single candidate, and plain-text responses. Calls are independent and never
//! retried.

use crate::config::Config;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors surfaced while requesting a completion.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// Provider could not be reached.
    #[error("Generation provider unavailable: {0}")]
    Unavailable(String),
    /// Provider answered with a non-success status.
    #[error("Generation provider returned {status}: {detail}")]
    Provider {
        /// HTTP status returned by the provider.
        status: u16,
        /// Response body supplied by the provider.
        detail: String,
    },
    /// Provider response could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
    /// No credential was configured for the provider.
    #[error("Generation provider credential is not configured")]
    MissingCredential,
}

/// Parameters for a single completion.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// User prompt sent as the only message.
    pub prompt: String,
    /// Provider model identifier.
    pub model_id: String,
    /// Upper bound on generated tokens.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
    /// Nucleus sampling mass.
    pub top_p: f32,
}

impl GenerationRequest {
    /// Default provider model.
    pub const DEFAULT_MODEL_ID: &'static str = "jamba-1.5-large";
    /// Default token budget.
    pub const DEFAULT_MAX_TOKENS: u32 = 2048;
    /// Default sampling temperature.
    pub const DEFAULT_TEMPERATURE: f32 = 0.4;
    /// Default nucleus sampling mass.
    pub const DEFAULT_TOP_P: f32 = 1.0;

    /// Request with default sampling parameters.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model_id: Self::DEFAULT_MODEL_ID.to_string(),
            max_tokens: Self::DEFAULT_MAX_TOKENS,
            temperature: Self::DEFAULT_TEMPERATURE,
            top_p: Self::DEFAULT_TOP_P,
        }
    }
}

/// Interface implemented by generation backends.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Return the generated text for the request.
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError>;
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionPayload<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    documents: Vec<Value>,
    tools: Vec<Value>,
    n: u32,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    stop: Vec<String>,
    response_format: ResponseFormat,
}

impl<'a> ChatCompletionPayload<'a> {
    fn single_turn(request: &'a GenerationRequest) -> Self {
        Self {
            model: &request.model_id,
            messages: [ChatMessage {
                role: "user",
                content: &request.prompt,
            }],
            documents: Vec::new(),
            tools: Vec::new(),
            n: 1,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            top_p: request.top_p,
            stop: Vec::new(),
            response_format: ResponseFormat { kind: "text" },
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Chat-completion client for AI21 Studio.
pub struct Ai21ChatClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl Ai21ChatClient {
    /// Build a client for `base_url` authenticated with `api_key`.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, GenerationError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(GenerationError::MissingCredential);
        }
        let http = Client::builder()
            .user_agent(concat!("docsummarizer/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|error| GenerationError::Unavailable(error.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            api_key,
        })
    }

    /// Build a client from the loaded configuration.
    pub fn from_config(config: &Config) -> Result<Self, GenerationError> {
        Self::new(config.ai21_base_url.clone(), config.ai21_api_key.clone())
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl GenerationClient for Ai21ChatClient {
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError> {
        let payload = ChatCompletionPayload::single_turn(&request);

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                GenerationError::Unavailable(format!(
                    "failed to reach {}: {error}",
                    self.base_url
                ))
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(GenerationError::Provider {
                status: status.as_u16(),
                detail,
            });
        }

        let body: ChatCompletionResponse = response.json().await.map_err(|error| {
            GenerationError::InvalidResponse(format!("failed to decode completion: {error}"))
        })?;

        let Some(choice) = body.choices.into_iter().next() else {
            tracing::warn!(model = %request.model_id, "Provider returned no completion candidates");
            return Ok(String::new());
        };
        Ok(choice.message.content.unwrap_or_default())
    }
}
