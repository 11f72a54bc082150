//! AI-assisted classification backends.
//!
//! A backend answers two questions: which keywords are relevant to a goal, and
//! how relevant a window title is to it. Two interchangeable implementations
//! are provided:
//!
//! - [`ChatCompletionsBackend`]: a remote OpenAI-compatible chat-completions API
//! - [`OllamaBackend`]: a locally hosted inference server
//!
//! Backends report failures as [`BackendError`]; the classifier treats every
//! failure the same way (rule-based fallback), so implementations never need
//! to retry on their own.
//!
//! # Response shapes
//!
//! A classification response is either a JSON object
//! `{"relevance_score": 0.8, "classification": "DIRECT", "reason": "..."}`
//! or a bare label such as `PERIPHERAL`. Both are accepted by
//! [`parse_verdict`]; anything else is [`BackendError::Malformed`].

mod chat;
mod ollama;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{BackendConfig, BackendKind};
use crate::types::Classification;

pub use chat::ChatCompletionsBackend;
pub use ollama::OllamaBackend;

/// Minimum number of keywords asked for.
pub const MIN_KEYWORDS: usize = 20;

/// Maximum number of keywords kept.
pub const MAX_KEYWORDS: usize = 50;

/// Errors that can occur while talking to a classification backend.
#[derive(Error, Debug)]
pub enum BackendError {
    /// HTTP request failed (connection refused, DNS, client timeout).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend returned a non-success status.
    #[error("backend returned {status}: {message}")]
    Status { status: u16, message: String },

    /// The call did not finish within the configured bound.
    #[error("backend call timed out after {secs} seconds")]
    Timeout { secs: u64 },

    /// Response arrived but did not have the expected shape.
    #[error("malformed backend response: {0}")]
    Malformed(String),
}

/// What is sent to a backend for one classification.
#[derive(Debug, Clone, Serialize)]
pub struct ClassifyRequest<'a> {
    pub title: &'a str,
    pub goal: &'a str,
    pub description: &'a str,
    pub domain: &'a str,
    pub keywords: &'a [String],
}

/// A backend's judgment of one title.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendVerdict {
    /// Relevance in `[0, 1]`; the nominal score for label-only answers.
    pub relevance_score: f64,

    /// Label as returned by the backend.
    pub classification: Classification,

    /// Short explanation, when the backend gave one.
    pub reason: Option<String>,
}

/// An AI-assisted classification capability.
#[async_trait]
pub trait ClassificationBackend: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Whether the backend can be used right now.
    async fn is_available(&self) -> bool;

    /// Asks for keywords relevant to the goal and description.
    async fn generate_keywords(
        &self,
        goal: &str,
        description: &str,
    ) -> Result<Vec<String>, BackendError>;

    /// Asks how relevant a title is to the goal.
    async fn classify(&self, request: &ClassifyRequest<'_>) -> Result<BackendVerdict, BackendError>;
}

/// Builds the backend selected by configuration, if any.
///
/// # Errors
///
/// Returns `BackendError::Http` if the HTTP client cannot be constructed.
pub fn build_backend(
    config: &BackendConfig,
) -> Result<Option<Arc<dyn ClassificationBackend>>, BackendError> {
    let backend = match config.kind {
        BackendKind::None => return Ok(None),
        BackendKind::Remote => match &config.api_key {
            Some(key) => Arc::new(ChatCompletionsBackend::new(
                &config.api_url,
                key,
                &config.model,
                config.timeout,
            )?) as Arc<dyn ClassificationBackend>,
            None => return Ok(None),
        },
        BackendKind::Local => Arc::new(OllamaBackend::new(
            &config.ollama_url,
            &config.model,
            config.timeout,
        )?) as Arc<dyn ClassificationBackend>,
    };
    Ok(Some(backend))
}

/// Prompt asking for a JSON array of keywords.
#[must_use]
pub fn keyword_prompt(goal: &str, description: &str) -> String {
    format!(
        "Generate a comprehensive list of relevant keywords for the following study goal and description.\n\
         Goal: {goal}\n\
         Description: {description}\n\n\
         Include keywords for the core topic, its applications, related fields, interdisciplinary \
         connections, and project-specific terms. Return only a JSON array of keywords \
         (at least {MIN_KEYWORDS}, max {MAX_KEYWORDS})."
    )
}

/// Prompt asking for a relevance judgment.
///
/// With `scored` the backend is asked for the JSON object form, otherwise for
/// a bare label.
#[must_use]
pub fn classification_prompt(request: &ClassifyRequest<'_>, scored: bool) -> String {
    let answer = if scored {
        "Output only JSON:\n\
         {\"relevance_score\": float between 0.0 and 1.0,\n\
         \"classification\": \"DIRECT\" | \"PERIPHERAL\" | \"INDIRECT\" | \"DISTRACTION\",\n\
         \"reason\": short explanation}"
    } else {
        "Classify the activity as one of DIRECT, PERIPHERAL, INDIRECT, DISTRACTION.\n\
         Return only the category name, with no extra text or characters."
    };

    format!(
        "Analyze the relevance of the following window title to the study goal and description.\n\
         Window Title: {}\n\
         Study Goal: {}\n\
         Description: {}\n\
         Domain/URL: {}\n\
         Relevant Keywords: {}\n\n\
         Consider core concepts, applications, related fields, and project-specific activities. \
         Treat lectures, tutorials and courses on the topic as highly relevant.\n\
         {answer}",
        request.title,
        request.goal,
        request.description,
        request.domain,
        request.keywords.join(", "),
    )
}

/// Extracts the first JSON array of strings from a model response.
///
/// # Errors
///
/// Returns `BackendError::Malformed` when no array is present or it does not
/// contain only strings.
pub fn parse_keywords(content: &str) -> Result<Vec<String>, BackendError> {
    let start = content
        .find('[')
        .ok_or_else(|| BackendError::Malformed("no JSON array in response".to_string()))?;
    let end = content
        .rfind(']')
        .filter(|&end| end > start)
        .ok_or_else(|| BackendError::Malformed("unterminated JSON array".to_string()))?;

    serde_json::from_str::<Vec<String>>(&content[start..=end])
        .map_err(|e| BackendError::Malformed(format!("keyword array: {e}")))
}

#[derive(Debug, Deserialize)]
struct RawVerdict {
    relevance_score: f64,
    classification: String,
    #[serde(default)]
    reason: Option<String>,
}

/// Parses a classification response in either accepted shape.
///
/// # Errors
///
/// Returns `BackendError::Malformed` for invalid JSON, a score outside
/// `[0, 1]`, or a label outside the taxonomy.
///
/// # Examples
///
/// ```
/// use focusflow_monitor::backend::parse_verdict;
/// use focusflow_monitor::types::Classification;
///
/// let verdict = parse_verdict("PERIPHERAL").unwrap();
/// assert_eq!(verdict.classification, Classification::Peripheral);
/// assert_eq!(verdict.relevance_score, 0.7);
///
/// let verdict = parse_verdict(r#"{"relevance_score": 0.85, "classification": "DIRECT", "reason": "on topic"}"#).unwrap();
/// assert_eq!(verdict.relevance_score, 0.85);
///
/// assert!(parse_verdict("I think it is direct").is_err());
/// ```
pub fn parse_verdict(content: &str) -> Result<BackendVerdict, BackendError> {
    if let (Some(start), Some(end)) = (content.find('{'), content.rfind('}')) {
        if end > start {
            let raw: RawVerdict = serde_json::from_str(&content[start..=end])
                .map_err(|e| BackendError::Malformed(format!("verdict object: {e}")))?;

            if !raw.relevance_score.is_finite() || !(0.0..=1.0).contains(&raw.relevance_score) {
                return Err(BackendError::Malformed(format!(
                    "relevance score {} outside [0, 1]",
                    raw.relevance_score
                )));
            }

            let classification = raw
                .classification
                .parse::<Classification>()
                .map_err(|e| BackendError::Malformed(e.to_string()))?;

            return Ok(BackendVerdict {
                relevance_score: raw.relevance_score,
                classification,
                reason: raw.reason.filter(|r| !r.trim().is_empty()),
            });
        }
    }

    let label = content.trim().trim_matches(|c| c == '"' || c == '\'' || c == '`');
    let classification = label
        .parse::<Classification>()
        .map_err(|e| BackendError::Malformed(e.to_string()))?;
    let relevance_score = classification
        .nominal_score()
        .ok_or_else(|| BackendError::Malformed(format!("label without score: {label}")))?;

    Ok(BackendVerdict {
        relevance_score,
        classification,
        reason: None,
    })
}

/// Reads a non-success response into a `BackendError::Status`.
async fn status_error(response: reqwest::Response) -> BackendError {
    let status = response.status().as_u16();
    let message = response.text().await.unwrap_or_default();
    BackendError::Status { status, message }
}
