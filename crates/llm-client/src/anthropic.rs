use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{LlmError, LlmResult};
use crate::{CompletionRequest, LlmBackend};

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_MODEL: &str = "claude-haiku-4-5";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<Message<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

/// Anthropic Messages API client
#[derive(Clone)]
pub struct AnthropicClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl AnthropicClient {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

#[async_trait]
impl LlmBackend for AnthropicClient {
    async fn complete(&self, request: &CompletionRequest) -> LlmResult<String> {
        // The Messages API has no JSON mode; callers extract the object from text.
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            system: &request.system,
            messages: vec![Message {
                role: "user",
                content: &request.user,
            }],
            temperature: request.temperature,
        };

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(LlmError::from_send)?;

        let status = response.status();
        if !status.is_success() {
            return Err(LlmError::Api {
                backend: self.backend_name(),
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let parsed: MessagesResponse = response.json().await?;
        let block = parsed
            .content
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("empty content".to_string()))?;

        if block.kind != "text" {
            return Err(LlmError::InvalidResponse(format!(
                "unexpected content block type '{}'",
                block.kind
            )));
        }

        block
            .text
            .ok_or_else(|| LlmError::InvalidResponse("text block without text".to_string()))
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    fn backend_name(&self) -> &'static str {
        "anthropic"
    }
}
