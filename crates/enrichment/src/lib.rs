//! Mandatory rewrite of rule explanations through an OpenAI-compatible
//! chat-completions endpoint.
//!
//! There is no fallback: every failure mode surfaces as an
//! [`EnrichmentError`] and the caller must not substitute the original text.

mod config;

use std::future::Future;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};
use visitgate_core::EnrichedResult;

pub use config::{
    EnrichmentConfig, DEFAULT_BASE_URL, DEFAULT_CONNECT_TIMEOUT_SECONDS, DEFAULT_MAX_TOKENS,
    DEFAULT_MODEL, DEFAULT_TEMPERATURE, DEFAULT_TIMEOUT_SECONDS,
};

const REWRITE_INSTRUCTION: &str = "Rewrite this explanation in one clear sentence for a user:";
const UNREADABLE_BODY: &str = "unknown error";

#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("enrichment endpoint timed out: {0}")]
    Timeout(#[source] reqwest::Error),
    #[error("enrichment endpoint unreachable: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("enrichment endpoint error ({status}): {detail}")]
    Status { status: u16, detail: String },
    #[error("enrichment endpoint returned an unreadable body: {0}")]
    MalformedBody(String),
    #[error("enrichment endpoint returned an empty completion")]
    EmptyCompletion,
}

impl EnrichmentError {
    fn from_transport(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout(error)
        } else {
            Self::Transport(error)
        }
    }

    /// Short machine label, used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::Transport(_) => "transport",
            Self::Status { .. } => "status",
            Self::MalformedBody(_) => "malformed_body",
            Self::EmptyCompletion => "empty_completion",
        }
    }
}

pub trait Enricher: Send + Sync {
    fn model(&self) -> &str;

    fn enhance(
        &self,
        explanation: &str,
    ) -> impl Future<Output = Result<EnrichedResult, EnrichmentError>> + Send;
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: [ChatMessage; 1],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EnrichmentClient {
    http: Client,
    config: EnrichmentConfig,
}

impl EnrichmentClient {
    pub fn new(config: EnrichmentConfig) -> Result<Self, EnrichmentError> {
        let http = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(EnrichmentError::Transport)?;
        Ok(Self { http, config })
    }

    pub fn with_client(http: Client, config: EnrichmentConfig) -> Self {
        Self { http, config }
    }

    pub fn config(&self) -> &EnrichmentConfig {
        &self.config
    }

    #[instrument(skip(self, explanation), fields(model = %self.config.model))]
    async fn request_rewrite(&self, explanation: &str) -> Result<EnrichedResult, EnrichmentError> {
        let payload = ChatCompletionRequest {
            model: self.config.model.as_str(),
            messages: [ChatMessage {
                role: "user",
                content: rewrite_prompt(explanation),
            }],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let response = self
            .http
            .post(self.config.completions_url())
            .json(&payload)
            .send()
            .await
            .map_err(EnrichmentError::from_transport)?;

        let status = response.status();
        if !status.is_success() {
            let detail = response
                .text()
                .await
                .ok()
                .filter(|body| !body.trim().is_empty())
                .unwrap_or_else(|| UNREADABLE_BODY.to_string());
            return Err(EnrichmentError::Status {
                status: status.as_u16(),
                detail,
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(EnrichmentError::from_transport)?;
        let explanation = extract_completion(&body)?;
        debug!(chars = explanation.len(), "explanation rewritten");

        Ok(EnrichedResult {
            explanation,
            model_used: self.config.model.clone(),
        })
    }
}

impl Enricher for EnrichmentClient {
    fn model(&self) -> &str {
        self.config.model.as_str()
    }

    fn enhance(
        &self,
        explanation: &str,
    ) -> impl Future<Output = Result<EnrichedResult, EnrichmentError>> + Send {
        self.request_rewrite(explanation)
    }
}

pub fn rewrite_prompt(explanation: &str) -> String {
    format!("{} {}", REWRITE_INSTRUCTION, explanation)
}

fn extract_completion(body: &[u8]) -> Result<String, EnrichmentError> {
    let parsed: ChatCompletionResponse = serde_json::from_slice(body)
        .map_err(|error| EnrichmentError::MalformedBody(error.to_string()))?;

    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message)
        .and_then(|message| message.content)
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
        .ok_or(EnrichmentError::EmptyCompletion)
}
