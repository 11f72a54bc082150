//! Remote OpenAI-compatible chat-completions backend.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    classification_prompt, keyword_prompt, parse_keywords, parse_verdict, status_error,
    BackendError, BackendVerdict, ClassificationBackend, ClassifyRequest,
};

/// Sampling temperature for both request kinds.
const TEMPERATURE: f32 = 0.2;

/// Token budget for keyword generation.
const KEYWORD_MAX_TOKENS: u32 = 500;

/// Token budget for a classification.
const CLASSIFY_MAX_TOKENS: u32 = 200;

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Chat-completions client asking for scored verdicts.
pub struct ChatCompletionsBackend {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl ChatCompletionsBackend {
    /// Creates a backend for `{base_url}/chat/completions`.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Http` if the HTTP client cannot be built.
    pub fn new(
        base_url: &str,
        api_key: &str,
        model: &str,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(2)
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }

    /// Sends one system+user exchange and returns the first choice's text.
    async fn complete(
        &self,
        system: &str,
        user: &str,
        max_tokens: u32,
    ) -> Result<String, BackendError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .map_err(|e| BackendError::Malformed(format!("invalid API key header: {e}")))?;
        headers.insert(AUTHORIZATION, bearer);

        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: TEMPERATURE,
            max_tokens,
        };

        debug!(endpoint = %self.endpoint, model = %self.model, "Sending chat completion");

        let response = self
            .client
            .post(&self.endpoint)
            .headers(headers)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Malformed(format!("chat response: {e}")))?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| BackendError::Malformed("chat response has no content".to_string()))
    }
}

#[async_trait]
impl ClassificationBackend for ChatCompletionsBackend {
    fn name(&self) -> &'static str {
        "chat-completions"
    }

    /// A remote backend counts as available whenever it is configured; an
    /// outage surfaces as a failed call and a rule-based fallback.
    async fn is_available(&self) -> bool {
        true
    }

    async fn generate_keywords(
        &self,
        goal: &str,
        description: &str,
    ) -> Result<Vec<String>, BackendError> {
        let content = self
            .complete(
                "You are a helpful assistant that generates relevant keywords.",
                &keyword_prompt(goal, description),
                KEYWORD_MAX_TOKENS,
            )
            .await?;
        parse_keywords(&content)
    }

    async fn classify(&self, request: &ClassifyRequest<'_>) -> Result<BackendVerdict, BackendError> {
        let content = self
            .complete(
                "You are a helpful assistant that classifies content relevance.",
                &classification_prompt(request, true),
                CLASSIFY_MAX_TOKENS,
            )
            .await?;
        parse_verdict(&content)
    }
}
