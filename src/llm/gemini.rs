//! Gemini (generative-language API) provider over reqwest.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::RETRY_AFTER;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info, warn};

use super::extract::{Extraction, extract_response, extract_stream_text, strip_role_prefix};
use super::provider::{
    ChatMessage, CompletionRequest, CompletionResponse, FinishReason, LlmProvider, Role,
    TextStream,
};
use super::stream::into_text_stream;
use super::types::{Content, GenerateContentRequest, GenerateContentResponse, GenerationConfig};
use crate::config::DEFAULT_API_BASE;
use crate::error::LlmError;

const PROVIDER: &str = "gemini";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Client for `generateContent` / `streamGenerateContent`.
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: SecretString,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: SecretString, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            model: model.into(),
            base_url: DEFAULT_API_BASE.to_string(),
        }
    }

    /// Point the client at a different endpoint base (local stubs, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/v1beta/models/{}:{}", self.base_url, self.model, method)
    }

    async fn post(
        &self,
        url: &str,
        body: &GenerateContentRequest,
    ) -> Result<reqwest::Response, LlmError> {
        let response = self
            .http
            .post(url)
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(body)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed {
                provider: PROVIDER.to_string(),
                reason: e.to_string(),
            })?;

        check_status(response).await
    }
}

#[async_trait]
impl LlmProvider for GeminiClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = build_request(&request);
        info!(model = %self.model, messages = body.contents.len(), "Sending completion request");

        let response = self.post(&self.endpoint("generateContent"), &body).await?;
        let text = response.text().await.map_err(|e| LlmError::RequestFailed {
            provider: PROVIDER.to_string(),
            reason: e.to_string(),
        })?;
        let parsed: GenerateContentResponse = serde_json::from_str(&text)?;

        let usage = parsed.usage_metadata.clone().unwrap_or_default();
        let finish_reason = FinishReason::from_api(
            parsed
                .candidates
                .first()
                .and_then(|c| c.finish_reason.as_deref()),
        );

        match extract_response(&parsed) {
            Extraction::Text(content) => {
                debug!(
                    input_tokens = usage.prompt_token_count,
                    output_tokens = usage.candidates_token_count,
                    "Completion received"
                );
                Ok(CompletionResponse {
                    content: strip_role_prefix(&content).to_string(),
                    input_tokens: usage.prompt_token_count,
                    output_tokens: usage.candidates_token_count,
                    finish_reason,
                })
            }
            Extraction::Error(reason) => Err(LlmError::RequestFailed {
                provider: PROVIDER.to_string(),
                reason,
            }),
            Extraction::Pending => Err(LlmError::InvalidResponse {
                provider: PROVIDER.to_string(),
                reason: "response contained no text".to_string(),
            }),
        }
    }

    async fn complete_stream(&self, request: CompletionRequest) -> Result<TextStream, LlmError> {
        let body = build_request(&request);
        info!(model = %self.model, messages = body.contents.len(), "Sending streaming request");

        let url = format!("{}?alt=sse", self.endpoint("streamGenerateContent"));
        let response = self.post(&url, &body).await?;
        Ok(into_text_stream(Box::pin(response.bytes_stream()), PROVIDER))
    }
}

/// Map a chat transcript onto the API's request shape.
///
/// System messages become the system instruction. Consecutive messages with
/// the same role are merged since the API expects alternating turns.
pub fn build_request(request: &CompletionRequest) -> GenerateContentRequest {
    let mut system = Vec::new();
    let mut contents: Vec<Content> = Vec::new();

    for ChatMessage { role, content } in &request.messages {
        let api_role = match role {
            Role::System => {
                system.push(content.as_str());
                continue;
            }
            Role::User => "user",
            Role::Assistant => "model",
        };

        match contents.last_mut() {
            Some(last) if last.role.as_deref() == Some(api_role) => {
                if let Some(text) = last.parts.last_mut().and_then(|p| p.text.as_mut()) {
                    text.push_str("\n\n");
                    text.push_str(content);
                }
            }
            _ => contents.push(Content::text(Some(api_role), content.clone())),
        }
    }

    let generation_config = (request.temperature.is_some() || request.max_tokens.is_some())
        .then(|| GenerationConfig {
            temperature: request.temperature,
            max_output_tokens: request.max_tokens,
        });

    GenerateContentRequest {
        contents,
        system_instruction: (!system.is_empty()).then(|| Content::text(None, system.join("\n\n"))),
        generation_config,
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, LlmError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs);
    let body = response.text().await.unwrap_or_default();
    warn!(status = status.as_u16(), body_len = body.len(), "Request rejected");

    Err(match status {
        StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimited {
            provider: PROVIDER.to_string(),
            retry_after,
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LlmError::AuthFailed {
            provider: PROVIDER.to_string(),
        },
        _ => LlmError::Api {
            provider: PROVIDER.to_string(),
            status: status.as_u16(),
            message: error_message(&body, status),
        },
    })
}

fn error_message(body: &str, status: StatusCode) -> String {
    let extracted = extract_stream_text(body);
    if let Some(message) = extracted.strip_prefix("Error: ") {
        return message.to_string();
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string();
    }
    trimmed.chars().take(200).collect()
}
