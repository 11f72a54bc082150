//! Local Ollama-style inference backend.
//!
//! Uses the non-streaming `/api/generate` endpoint and asks for bare labels,
//! which small local models produce far more reliably than JSON objects.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    classification_prompt, keyword_prompt, parse_keywords, parse_verdict, status_error,
    BackendError, BackendVerdict, ClassificationBackend, ClassifyRequest,
};

/// Bound on the liveness probe, independent of the call timeout.
const PROBE_TIMEOUT_SECS: u64 = 3;

const TEMPERATURE: f32 = 0.2;
const KEYWORD_NUM_PREDICT: u32 = 500;
const CLASSIFY_NUM_PREDICT: u32 = 200;

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Client for a locally hosted inference server.
pub struct OllamaBackend {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaBackend {
    /// Creates a backend for the server at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Http` if the HTTP client cannot be built.
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self, BackendError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    async fn generate(&self, prompt: &str, num_predict: u32) -> Result<String, BackendError> {
        let url = format!("{}/api/generate", self.base_url);
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: TEMPERATURE,
                num_predict,
            },
        };

        debug!(url = %url, model = %self.model, "Sending generate request");

        let response = self.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Malformed(format!("generate response: {e}")))?;
        Ok(body.response)
    }
}

#[async_trait]
impl ClassificationBackend for OllamaBackend {
    fn name(&self) -> &'static str {
        "ollama"
    }

    async fn is_available(&self) -> bool {
        match self
            .client
            .get(&self.base_url)
            .timeout(Duration::from_secs(PROBE_TIMEOUT_SECS))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(error = %e, "Inference server probe failed");
                false
            }
        }
    }

    async fn generate_keywords(
        &self,
        goal: &str,
        description: &str,
    ) -> Result<Vec<String>, BackendError> {
        let content = self
            .generate(&keyword_prompt(goal, description), KEYWORD_NUM_PREDICT)
            .await?;
        parse_keywords(&content)
    }

    async fn classify(&self, request: &ClassifyRequest<'_>) -> Result<BackendVerdict, BackendError> {
        let content = self
            .generate(&classification_prompt(request, false), CLASSIFY_NUM_PREDICT)
            .await?;
        parse_verdict(&content)
    }
}
