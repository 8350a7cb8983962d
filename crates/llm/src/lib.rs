//! # MedSim LLM
//!
//! Chat-completions client for any OpenAI-compatible endpoint, used to play the virtual
//! patient. It implements [`medsim_core::ReplyGenerator`], so the core never sees HTTP.
//!
//! Use [`reply_generator`] at startup: it returns a working client when the settings are
//! complete and an always-failing stand-in otherwise, so the process can still serve requests
//! in degraded mode.

use async_trait::async_trait;
use medsim_core::{ChatMessage, LlmSettings, ReplyError, ReplyGenerator, UnconfiguredReplyGenerator};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Upper bound on generated tokens per reply.
pub const MAX_TOKENS: u32 = 2000;

/// Sampling temperature for patient replies.
pub const TEMPERATURE: f32 = 0.7;

const COMPLETIONS_PATH: &str = "chat/completions";

#[derive(Clone)]
pub struct OpenAiCompatibleClient {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl OpenAiCompatibleClient {
    pub fn new(base_url: &str, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: completions_url(base_url),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    /// Build a client from resolved settings.
    ///
    /// # Errors
    ///
    /// `ReplyError::NotConfigured` naming every missing setting.
    pub fn from_settings(settings: &LlmSettings) -> Result<Self, ReplyError> {
        match (&settings.base_url, &settings.api_key, &settings.model) {
            (Some(base_url), Some(api_key), Some(model)) if settings.is_complete() => {
                Ok(Self::new(base_url, api_key.clone(), model.clone()))
            }
            _ => Err(ReplyError::NotConfigured {
                missing: settings.missing().into_iter().map(str::to_owned).collect(),
            }),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body<'a>(&'a self, messages: &'a [ChatMessage]) -> ChatCompletionRequest<'a> {
        ChatCompletionRequest {
            model: &self.model,
            messages,
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
        }
    }

    async fn send_request(&self, body: &ChatCompletionRequest<'_>) -> Result<String, ReplyError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|err| ReplyError::Request(format!("chat completion request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read error body".to_string());
            return Err(ReplyError::Request(error_message(status, &body_text)));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|err| ReplyError::Request(format!("failed to parse chat completion: {err}")))?;

        extract_text_response(parsed)
    }
}

impl std::fmt::Debug for OpenAiCompatibleClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatibleClient")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ReplyGenerator for OpenAiCompatibleClient {
    async fn generate_reply(&self, messages: &[ChatMessage]) -> Result<String, ReplyError> {
        tracing::debug!(
            "requesting completion from {} ({} messages, model {})",
            self.endpoint,
            messages.len(),
            self.model
        );
        let body = self.request_body(messages);
        self.send_request(&body).await
    }
}

/// The reply generator to run with: a real client, or a stand-in when settings are missing.
pub fn reply_generator(settings: &LlmSettings) -> Arc<dyn ReplyGenerator> {
    match OpenAiCompatibleClient::from_settings(settings) {
        Ok(client) => {
            tracing::info!("chat completions via {} (model {})", client.endpoint(), client.model());
            Arc::new(client)
        }
        Err(e) => {
            tracing::error!("{e}; chat replies will be placeholders until this is fixed");
            Arc::new(UnconfiguredReplyGenerator::new(settings.missing()))
        }
    }
}

fn completions_url(base_url: &str) -> String {
    format!("{}/{COMPLETIONS_PATH}", base_url.trim().trim_end_matches('/'))
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

fn extract_text_response(response: ChatCompletionResponse) -> Result<String, ReplyError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or(ReplyError::EmptyResponse)
}

fn error_message(status: reqwest::StatusCode, body: &str) -> String {
    let message = serde_json::from_str::<ErrorResponse>(body)
        .map(|wrapper| wrapper.error.message)
        .unwrap_or_else(|_| body.to_owned());
    format!("chat completion returned {status}: {message}")
}
